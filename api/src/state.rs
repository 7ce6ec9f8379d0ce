use std::sync::Arc;

use chrono::NaiveDate;

use mirador_core::audit::AuditSink;

/// Dataset watermark window: the span the catalog is known complete for.
/// Tool date ranges are resolved against it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateWindow {
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
}

impl DateWindow {
    /// Fixed v0 anchor.
    /// TODO: derive from dataset catalog metadata once the catalog
    /// endpoint exists.
    pub fn v0_anchor() -> Self {
        Self {
            min_date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid anchor date"),
            max_date: NaiveDate::from_ymd_opt(2025, 8, 13).expect("valid anchor date"),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub audit: Arc<AuditSink>,
    pub watermark: DateWindow,
}
