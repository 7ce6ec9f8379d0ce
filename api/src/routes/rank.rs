use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing::get};
use serde::Deserialize;
use serde_json::{Value, json};

use mirador_core::guard::{Guard, ToolFault, tool_name};
use mirador_core::job::JobContext;
use mirador_core::validate::{parse_entity_id, require_fields, resolve_range};

use crate::extract::GuardedQuery;
use crate::state::{AppState, DateWindow};

pub const RANK_TOOL_ID: &str = "rank_entities";
pub const RANK_TOOL_VERSION: &str = "1.0.0";
pub const RANK_SCHEMA_VERSION: &str = "1.0.0";

const RANK_MAX_ROWS: u64 = 50;

pub fn router() -> Router<AppState> {
    Router::new().route("/demo/rank", get(rank_entities))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct RankParams {
    /// Entity selector, e.g. GTO.MUN.LEON
    pub entity_id: Option<String>,
    /// Window start (YYYY-MM-DD)
    pub from: Option<String>,
    /// Window end (YYYY-MM-DD)
    pub to: Option<String>,
    /// Reject out-of-watermark ranges instead of clipping them
    #[serde(default)]
    pub strict_time: bool,
}

/// Demo ranking tool. Validates the selector and window against the
/// dataset watermark and returns the canonical ok envelope; all failure
/// shapes come from the guard.
#[utoipa::path(
    get,
    path = "/demo/rank",
    params(RankParams),
    responses(
        (status = 200, description = "Ok envelope with the effective date window"),
        (status = 422, description = "Invalid selector or window", body = mirador_core::error::ErrorEnvelope),
        (status = 500, description = "Tool execution failed", body = mirador_core::error::ErrorEnvelope)
    ),
    tag = "tools"
)]
pub async fn rank_entities(
    State(state): State<AppState>,
    ctx: Option<Extension<Arc<JobContext>>>,
    GuardedQuery(params): GuardedQuery<RankParams>,
) -> impl IntoResponse {
    let ctx = ctx.map(|Extension(ctx)| ctx).unwrap_or_default();

    let args = json!({
        "entity_id": params.entity_id,
        "from": params.from,
        "to": params.to,
        "strict_time": params.strict_time,
    });

    let watermark = state.watermark;
    let guarded = Guard::new(
        tool_name(RANK_TOOL_ID, RANK_TOOL_VERSION),
        RANK_SCHEMA_VERSION,
        RANK_TOOL_VERSION,
        state.audit.clone(),
    )
    .wrap(move |_ctx: &JobContext, args: &Value| run_rank(args, watermark));

    let (envelope, http) = guarded.call(&ctx, args);
    let status = StatusCode::from_u16(http).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(envelope))
}

/// Tool body: validate, resolve the window, emit the minimal ok envelope.
/// Ranking data itself is stubbed until the dataset catalog lands.
fn run_rank(args: &Value, watermark: DateWindow) -> Result<Value, ToolFault> {
    let payload = args.as_object().cloned().unwrap_or_default();

    require_fields(&payload, &["entity_id", "from", "to"])?;
    parse_entity_id(&payload["entity_id"])?;

    let strict = payload
        .get("strict_time")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let range = resolve_range(
        &payload["from"],
        &payload["to"],
        watermark.min_date,
        watermark.max_date,
        strict,
    )?;

    Ok(json!({
        "status": "ok",
        "tool": tool_name(RANK_TOOL_ID, RANK_TOOL_VERSION),
        "summary": {
            "headline": format!("Effective window {}..{}", range.from, range.to),
            "highlights": [],
        },
        "data": {
            "inline": {
                "columns": [],
                "rows": [],
                "limit_notice": {"applied": false, "max_rows": RANK_MAX_ROWS},
            }
        },
        "evidence": [],
        "meta": {
            "schema_version": RANK_SCHEMA_VERSION,
            "tool_version": RANK_TOOL_VERSION,
            "date_range_effective": {
                "from": range.from.to_string(),
                "to": range.to.to_string(),
            },
            "range_adjusted": range.adjusted,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::job_id::JobIdLayer;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use mirador_core::audit::AuditSink;
    use mirador_core::error::codes;
    use tower::ServiceExt;

    async fn send(uri: &str, job_id: Option<&str>) -> (StatusCode, Option<String>, Value) {
        let dir = tempfile::tempdir().expect("tempdir");
        let audit = Arc::new(AuditSink::new(dir.path()));
        let state = AppState {
            audit: audit.clone(),
            watermark: DateWindow::v0_anchor(),
        };
        let app = router().layer(JobIdLayer::new(audit)).with_state(state);

        let mut builder = Request::builder().uri(uri);
        if let Some(jid) = job_id {
            builder = builder.header("x-job-id", jid);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).expect("valid test request"))
            .await
            .expect("infallible service");

        let status = response.status();
        let echoed = response
            .headers()
            .get("x-job-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("readable body")
            .to_bytes();
        let body: Value = serde_json::from_slice(&bytes).expect("json body");
        (status, echoed, body)
    }

    #[test]
    fn run_rank_reports_all_missing_fields_at_once() {
        let err = run_rank(&json!({}), DateWindow::v0_anchor()).expect_err("must fail");
        match err {
            ToolFault::Guard(err) => assert_eq!(
                err.to_string(),
                "missing required fields: entity_id, from, to"
            ),
            other => panic!("unexpected fault: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ok_envelope_round_trip() {
        let (status, _jid, body) = send(
            "/demo/rank?entity_id=GTO.MUN.LEON&from=2024-01-01&to=2024-02-01",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["tool"], json!("rank_entities@1.0.0"));
        assert_eq!(body["meta"]["schema_version"], json!("1.0.0"));
        assert_eq!(body["meta"]["tool_version"], json!("1.0.0"));
        assert!(body["meta"]["timing_ms"].as_u64().is_some());
        assert_eq!(body["meta"]["range_adjusted"], json!(false));
    }

    #[tokio::test]
    async fn out_of_window_range_is_clipped_when_not_strict() {
        let (status, _jid, body) = send(
            "/demo/rank?entity_id=GTO.MUN.LEON&from=2023-01-01&to=2026-01-01",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["range_adjusted"], json!(true));
        assert_eq!(
            body["meta"]["date_range_effective"],
            json!({"from": "2024-01-01", "to": "2025-08-13"})
        );
    }

    #[tokio::test]
    async fn strict_out_of_window_range_is_rejected() {
        let (status, _jid, body) = send(
            "/demo/rank?entity_id=GTO.MUN.LEON&from=2023-01-01&to=2024-06-01&strict_time=true",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["status"], json!("error"));
        assert_eq!(body["error"]["code"], json!(codes::INVALID_DATE_RANGE));
    }

    #[tokio::test]
    async fn missing_parameters_yield_an_invalid_payload_envelope() {
        let (status, _jid, body) = send("/demo/rank", None).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], json!(codes::INVALID_PAYLOAD));
        assert_eq!(
            body["error"]["details"],
            json!("missing required fields: entity_id, from, to")
        );
    }

    #[tokio::test]
    async fn lowercase_entity_id_is_rejected() {
        let (status, _jid, body) = send(
            "/demo/rank?entity_id=gto.mun.leon&from=2024-01-01&to=2024-02-01",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], json!(codes::INVALID_PAYLOAD));
    }

    #[tokio::test]
    async fn valid_inbound_job_id_is_mirrored_on_the_response() {
        let token = "deadbeef".repeat(4);
        let (_status, echoed, _body) = send(
            "/demo/rank?entity_id=GTO.MUN.LEON&from=2024-01-01&to=2024-02-01",
            Some(&token),
        )
        .await;
        assert_eq!(echoed.as_deref(), Some(token.as_str()));
    }

    #[tokio::test]
    async fn invalid_inbound_job_id_is_replaced_with_a_fresh_one() {
        let (_status, echoed, _body) = send(
            "/demo/rank?entity_id=GTO.MUN.LEON&from=2024-01-01&to=2024-02-01",
            Some("NOT-A-JOB-ID"),
        )
        .await;
        let echoed = echoed.expect("response always carries x-job-id");
        assert_ne!(echoed, "NOT-A-JOB-ID");
        assert_eq!(echoed.len(), 32);
    }
}
