//! Request-scoped job correlation.
//!
//! One logical request gets exactly one job id, threaded through every
//! audit event and error envelope that request produces. The transport
//! layer creates a [`JobContext`] per request and passes it by reference
//! down the call chain; there is no process-wide cell to leak ids across
//! requests.

use std::fmt;
use std::sync::{LazyLock, OnceLock};

use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

static JOB_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]{32,64}$").expect("valid job id regex"));

/// Correlation token for one logical request: 32–64 lowercase hex chars.
/// Generated ids are uuid4 rendered as 32 hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept a caller-supplied token only when it matches the job id
    /// format. No normalization: an uppercase or short token is rejected.
    pub fn parse(candidate: &str) -> Option<Self> {
        JOB_ID_PATTERN
            .is_match(candidate)
            .then(|| Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-request correlation cell.
///
/// The id is established at most once; every later read observes the same
/// value for the lifetime of the request. Built on `OnceLock` so nothing
/// can swap the id after the first audit event has used it.
#[derive(Debug, Default)]
pub struct JobContext {
    id: OnceLock<JobId>,
}

impl JobContext {
    /// Empty context. The id is established lazily on first use.
    pub fn new() -> Self {
        Self { id: OnceLock::new() }
    }

    /// Context pre-seeded from a caller-supplied candidate: a valid token
    /// is adopted as-is, anything else is replaced with a fresh id.
    pub fn adopt(candidate: Option<&str>) -> Self {
        let ctx = Self::new();
        let id = candidate
            .and_then(|raw| JobId::parse(raw.trim()))
            .unwrap_or_default();
        let _ = ctx.id.set(id);
        ctx
    }

    /// The active id, created on first use. Never fails, never empty.
    pub fn current_id(&self) -> &JobId {
        self.id.get_or_init(JobId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_match_their_own_format() {
        let id = JobId::new();
        assert_eq!(id.as_str().len(), 32);
        assert!(JobId::parse(id.as_str()).is_some());
    }

    #[test]
    fn parse_rejects_malformed_tokens() {
        assert!(JobId::parse("").is_none());
        assert!(JobId::parse("abc123").is_none()); // too short
        assert!(JobId::parse(&"A".repeat(32)).is_none()); // uppercase
        assert!(JobId::parse(&"g".repeat(32)).is_none()); // not hex
        assert!(JobId::parse(&"a".repeat(65)).is_none()); // too long
        assert!(JobId::parse(&"a".repeat(64)).is_some());
    }

    #[test]
    fn adopt_keeps_a_valid_candidate() {
        let token = "deadbeef".repeat(4);
        let ctx = JobContext::adopt(Some(&token));
        assert_eq!(ctx.current_id().as_str(), token);
    }

    #[test]
    fn adopt_replaces_an_invalid_candidate() {
        let ctx = JobContext::adopt(Some("not-a-job-id"));
        assert_ne!(ctx.current_id().as_str(), "not-a-job-id");
        assert!(JobId::parse(ctx.current_id().as_str()).is_some());
    }

    #[test]
    fn current_id_is_stable_across_reads() {
        let ctx = JobContext::new();
        let first = ctx.current_id().clone();
        assert_eq!(ctx.current_id(), &first);
    }

    #[test]
    fn adopt_trims_surrounding_whitespace() {
        let token = "0123456789abcdef".repeat(2);
        let padded = format!("  {token} ");
        let ctx = JobContext::adopt(Some(&padded));
        assert_eq!(ctx.current_id().as_str(), token);
    }
}
