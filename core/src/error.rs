//! Closed failure taxonomy and the canonical error envelope.
//!
//! Every controlled failure inside a guarded tool is one of the
//! [`GuardError`] variants; [`classify`] maps each to a stable
//! (code, http status) pair. Anything outside the taxonomy is the guard's
//! problem and resolves to `COMPUTE_ERROR`/500 without touching the table.

use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use utoipa::ToSchema;

/// Machine-readable envelope codes.
pub mod codes {
    pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
    pub const DATA_QUALITY_ISSUE: &str = "DATA_QUALITY_ISSUE";
    pub const COMPUTE_ERROR: &str = "COMPUTE_ERROR";
    pub const INVALID_DATE_RANGE: &str = "INVALID_DATE_RANGE";
}

/// Controlled failures a guarded tool can raise.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Caller input is malformed or breaks a validation rule.
    #[error("{0}")]
    InvalidPayload(String),
    /// The dataset required to execute is missing or unusable.
    #[error("{0}")]
    MissingData(String),
    /// A computational step inside the tool failed in a controlled way.
    #[error("{0}")]
    ToolFailure(String),
    /// Requested time range is inconsistent with the dataset watermark
    /// under strict mode. A specialization of `InvalidPayload` with its
    /// own envelope code.
    #[error("{0}")]
    RangeOutsideWatermark(String),
}

impl GuardError {
    /// Stable tag identifying the failure kind in audit payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            GuardError::InvalidPayload(_) => "InvalidPayload",
            GuardError::MissingData(_) => "MissingData",
            GuardError::ToolFailure(_) => "ToolFailure",
            GuardError::RangeOutsideWatermark(_) => "RangeOutsideWatermark",
        }
    }
}

/// Map a failure to its (code, http status) pair.
///
/// Total over the taxonomy. The watermark specialization is matched before
/// the generic invalid-payload arm so the more specific code wins.
pub fn classify(err: &GuardError) -> (&'static str, u16) {
    match err {
        GuardError::RangeOutsideWatermark(_) => (codes::INVALID_DATE_RANGE, 422),
        GuardError::InvalidPayload(_) => (codes::INVALID_PAYLOAD, 422),
        GuardError::MissingData(_) => (codes::DATA_QUALITY_ISSUE, 409),
        GuardError::ToolFailure(_) => (codes::COMPUTE_ERROR, 500),
    }
}

/// `error` block of the error envelope.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub details: String,
    pub hints: Vec<String>,
}

/// Canonical error result shape. Both constructors populate every field;
/// no partial envelope is observable.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    /// Always "error".
    pub status: String,
    /// Canonical producer token, `id@version` for tools.
    pub tool: String,
    pub error: ErrorBody,
    #[schema(value_type = Object)]
    pub meta: Map<String, Value>,
}

impl ErrorEnvelope {
    /// Envelope for a taxonomy failure: code from [`classify`], details
    /// from the failure's display text.
    pub fn from_error(
        err: &GuardError,
        tool: &str,
        schema_version: &str,
        tool_version: &str,
        hints: Vec<String>,
    ) -> Self {
        let (code, _http) = classify(err);
        Self {
            status: "error".to_string(),
            tool: tool.to_string(),
            error: ErrorBody {
                code: code.to_string(),
                details: err.to_string(),
                hints,
            },
            meta: base_meta(schema_version, tool_version),
        }
    }

    /// Envelope for a failure outside the taxonomy. Always
    /// `COMPUTE_ERROR`; the caller supplies a non-leaking details text.
    pub fn internal(
        tool: &str,
        schema_version: &str,
        tool_version: &str,
        details: &str,
        extra_meta: Option<Map<String, Value>>,
    ) -> Self {
        let mut meta = base_meta(schema_version, tool_version);
        if let Some(extra) = extra_meta {
            meta.extend(extra);
        }
        Self {
            status: "error".to_string(),
            tool: tool.to_string(),
            error: ErrorBody {
                code: codes::COMPUTE_ERROR.to_string(),
                details: details.to_string(),
                hints: Vec::new(),
            },
            meta,
        }
    }

    /// Wire form. Infallible: every field is already JSON-shaped.
    pub fn into_value(self) -> Value {
        json!({
            "status": self.status,
            "tool": self.tool,
            "error": {
                "code": self.error.code,
                "details": self.error.details,
                "hints": self.error.hints,
            },
            "meta": self.meta,
        })
    }
}

fn base_meta(schema_version: &str, tool_version: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("schema_version".to_string(), json!(schema_version));
    meta.insert("tool_version".to_string(), json!(tool_version));
    meta
}
