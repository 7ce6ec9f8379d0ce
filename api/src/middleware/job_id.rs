use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tower::{Layer, Service, ServiceExt};

use mirador_core::audit::{AuditSink, stage};
use mirador_core::job::JobContext;

pub const JOB_ID_HEADER: HeaderName = HeaderName::from_static("x-job-id");

/// Tower Layer that pins a job id to every request.
///
/// A valid inbound `x-job-id` header is adopted; anything else is replaced
/// with a fresh id. The resulting [`JobContext`] rides in request
/// extensions for handlers to pass into guarded tools, the id is mirrored
/// on the response header, and `request_in`/`response_out` events land in
/// the audit trail.
#[derive(Clone)]
pub struct JobIdLayer {
    audit: Arc<AuditSink>,
}

impl JobIdLayer {
    pub fn new(audit: Arc<AuditSink>) -> Self {
        Self { audit }
    }
}

impl<S> Layer<S> for JobIdLayer {
    type Service = JobIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JobIdService {
            inner,
            audit: self.audit.clone(),
        }
    }
}

#[derive(Clone)]
pub struct JobIdService<S> {
    inner: S,
    audit: Arc<AuditSink>,
}

impl<S> Service<Request> for JobIdService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let not_ready = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, not_ready);
        let audit = self.audit.clone();

        Box::pin(async move {
            let ctx = Arc::new(JobContext::adopt(extract_job_id(&req).as_deref()));
            req.extensions_mut().insert(ctx.clone());

            audit.record(
                &ctx,
                stage::REQUEST_IN,
                json!({
                    "job_id": ctx.current_id().as_str(),
                    "path": req.uri().path(),
                    "method": req.method().as_str(),
                }),
            );

            let mut response = ready.oneshot(req).await.into_response();

            // Mirror the id so callers can correlate their own logs.
            if let Ok(value) = HeaderValue::from_str(ctx.current_id().as_str()) {
                response.headers_mut().insert(JOB_ID_HEADER, value);
            }

            audit.record(
                &ctx,
                stage::RESPONSE_OUT,
                json!({
                    "job_id": ctx.current_id().as_str(),
                    "status_code": response.status().as_u16(),
                }),
            );

            Ok(response)
        })
    }
}

fn extract_job_id(req: &Request) -> Option<String> {
    let raw = req.headers().get(&JOB_ID_HEADER)?.to_str().ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
