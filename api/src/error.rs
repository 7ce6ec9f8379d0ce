use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use mirador_core::error::{ErrorEnvelope, GuardError, classify};

/// Producer names for envelopes the HTTP layer builds itself, outside any
/// guarded tool body.
pub mod component {
    pub const GATEWAY: &str = "gateway";
    pub const SYSTEM: &str = "system";
}

/// Envelope versions stamped on gateway-produced errors.
pub const SCHEMA_VERSION: &str = "1.0.0";
pub const GATEWAY_VERSION: &str = "1.0.0";

/// A taxonomy failure raised outside a guarded tool body (extractor
/// rejections, route-level validation). Rendered as the canonical error
/// envelope with the gateway as producer, so callers see one error shape
/// no matter where the failure happened.
#[derive(Debug)]
pub struct ApiFailure(pub GuardError);

impl From<GuardError> for ApiFailure {
    fn from(err: GuardError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let (_code, http) = classify(&self.0);
        let envelope = ErrorEnvelope::from_error(
            &self.0,
            component::GATEWAY,
            SCHEMA_VERSION,
            GATEWAY_VERSION,
            Vec::new(),
        );
        let status = StatusCode::from_u16(http).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirador_core::error::codes;

    #[test]
    fn api_failure_maps_to_the_taxonomy_status() {
        let response =
            ApiFailure(GuardError::InvalidPayload("bad query".into())).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn api_failure_keeps_the_taxonomy_code() {
        let err = GuardError::MissingData("no dataset".into());
        let (code, http) = classify(&err);
        assert_eq!(code, codes::DATA_QUALITY_ISSUE);
        assert_eq!(http, 409);
        let response = ApiFailure(err).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
