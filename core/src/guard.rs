//! The guard combinator.
//!
//! [`Guard::wrap`] turns a tool body into the only thing callers invoke: a
//! [`GuardedTool`] whose `call` audits start and terminal events, measures
//! elapsed time, and reduces every outcome (ok envelope, taxonomy failure,
//! uncategorized failure, panic) to a well-formed `(envelope, http status)`
//! pair. Nothing raised inside the body escapes.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value, json};

use crate::audit::{AuditSink, stage};
use crate::error::{ErrorEnvelope, GuardError, classify};
use crate::job::JobContext;

/// Shown to callers for any failure outside the taxonomy. The real details
/// stay in the audit trail.
const INTERNAL_DETAILS: &str = "Internal error while executing the tool.";

/// Canonical tool token: `id@version`.
pub fn tool_name(id: &str, version: &str) -> String {
    format!("{id}@{version}")
}

/// What a tool body can produce besides an Ok envelope: a taxonomy member,
/// or anything else. The guard maps the latter straight to
/// `COMPUTE_ERROR`/500.
#[derive(Debug)]
pub enum ToolFault {
    Guard(GuardError),
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl ToolFault {
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ToolFault::Other(err.into())
    }
}

impl From<GuardError> for ToolFault {
    fn from(err: GuardError) -> Self {
        ToolFault::Guard(err)
    }
}

/// A tool implementation. Produces the Ok envelope (a JSON object owned by
/// the tool) or a fault; the guard owns everything around this seam.
pub trait ToolHandler {
    fn run(&self, ctx: &JobContext, args: &Value) -> Result<Value, ToolFault>;
}

impl<F> ToolHandler for F
where
    F: Fn(&JobContext, &Value) -> Result<Value, ToolFault>,
{
    fn run(&self, ctx: &JobContext, args: &Value) -> Result<Value, ToolFault> {
        self(ctx, args)
    }
}

/// Identity and audit wiring for one guarded tool.
pub struct Guard {
    tool: String,
    schema_version: String,
    tool_version: String,
    audit: Arc<AuditSink>,
}

impl Guard {
    pub fn new(
        tool: impl Into<String>,
        schema_version: impl Into<String>,
        tool_version: impl Into<String>,
        audit: Arc<AuditSink>,
    ) -> Self {
        Self {
            tool: tool.into(),
            schema_version: schema_version.into(),
            tool_version: tool_version.into(),
            audit,
        }
    }

    /// Wrap a tool body. The guarded form is the only callable surface.
    pub fn wrap<H: ToolHandler>(self, handler: H) -> GuardedTool<H> {
        GuardedTool { guard: self, handler }
    }
}

pub struct GuardedTool<H> {
    guard: Guard,
    handler: H,
}

impl<H: ToolHandler> GuardedTool<H> {
    /// Run the tool under the guard contract. Per invocation:
    /// start event → body → exactly one terminal event
    /// (`tool.ok` | `tool.error` | `tool.exception`), then the envelope and
    /// status. No retries; time is measured, deadlines are not enforced.
    pub fn call(&self, ctx: &JobContext, args: Value) -> (Value, u16) {
        let guard = &self.guard;

        // Establish correlation before the first audit write.
        let _ = ctx.current_id();

        if !guard.tool.contains('@') {
            guard.audit.record(
                ctx,
                stage::TOOL_NAME_WARNING,
                json!({"tool": guard.tool, "reason": "missing @version"}),
            );
        }

        let started = Instant::now();
        guard.audit.record(
            ctx,
            stage::TOOL_START,
            json!({"tool": guard.tool, "args": args.clone()}),
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.handler.run(ctx, &args)));
        let timing_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(envelope)) => match guard.finish_ok(envelope, timing_ms) {
                Ok(value) => {
                    guard.audit.record(
                        ctx,
                        stage::TOOL_OK,
                        json!({"tool": guard.tool, "timing_ms": timing_ms}),
                    );
                    (value, 200)
                }
                Err(details) => self.uncategorized(ctx, "invalid_envelope", &details, timing_ms),
            },
            Ok(Err(ToolFault::Guard(err))) => {
                let (code, http) = classify(&err);
                guard.audit.record(
                    ctx,
                    stage::TOOL_ERROR,
                    json!({
                        "tool": guard.tool,
                        "code": code,
                        "error": err.kind(),
                        "details": err.to_string(),
                        "timing_ms": timing_ms,
                    }),
                );
                let mut envelope = ErrorEnvelope::from_error(
                    &err,
                    &guard.tool,
                    &guard.schema_version,
                    &guard.tool_version,
                    Vec::new(),
                );
                envelope
                    .meta
                    .entry("timing_ms".to_string())
                    .or_insert(json!(timing_ms));
                (envelope.into_value(), http)
            }
            Ok(Err(ToolFault::Other(err))) => {
                self.uncategorized(ctx, "unhandled_error", &err.to_string(), timing_ms)
            }
            Err(payload) => {
                self.uncategorized(ctx, "panic", &panic_message(payload), timing_ms)
            }
        }
    }

    fn uncategorized(
        &self,
        ctx: &JobContext,
        kind: &str,
        details: &str,
        timing_ms: u64,
    ) -> (Value, u16) {
        let guard = &self.guard;
        guard.audit.record(
            ctx,
            stage::TOOL_EXCEPTION,
            json!({
                "tool": guard.tool,
                "error": kind,
                "details": details,
                "timing_ms": timing_ms,
            }),
        );

        let mut extra = Map::new();
        extra.insert("timing_ms".to_string(), json!(timing_ms));
        let envelope = ErrorEnvelope::internal(
            &guard.tool,
            &guard.schema_version,
            &guard.tool_version,
            INTERNAL_DETAILS,
            Some(extra),
        );
        (envelope.into_value(), 500)
    }
}

impl Guard {
    /// Enrich an Ok envelope without overwriting anything the tool set.
    /// A non-object envelope (or non-object `meta`) is a producer bug and
    /// is reported as an uncategorized failure.
    fn finish_ok(&self, mut envelope: Value, timing_ms: u64) -> Result<Value, String> {
        let Some(body) = envelope.as_object_mut() else {
            return Err("tool returned a non-object envelope".to_string());
        };

        let meta = body
            .entry("meta".to_string())
            .or_insert_with(|| json!({}));
        let Some(meta) = meta.as_object_mut() else {
            return Err("tool returned a non-object 'meta'".to_string());
        };

        meta.entry("schema_version".to_string())
            .or_insert_with(|| json!(self.schema_version));
        meta.entry("tool_version".to_string())
            .or_insert_with(|| json!(self.tool_version));
        meta.entry("timing_ms".to_string()).or_insert(json!(timing_ms));

        body.entry("tool".to_string()).or_insert_with(|| json!(self.tool));

        Ok(envelope)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
