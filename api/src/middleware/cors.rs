use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

/// Build a CORS layer from the `MIRADOR_CORS_ORIGINS` env var.
///
/// - Origins: comma-separated list (default: `http://localhost:3000`)
/// - Methods: GET, OPTIONS
/// - Headers: Content-Type, X-Job-Id (exposed back so browser callers can
///   read the correlation id)
pub fn build_cors_layer() -> CorsLayer {
    let origins_str = std::env::var("MIRADOR_CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());

    let origins: Vec<HeaderValue> = origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<HeaderValue>().ok()
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("x-job-id"),
        ])
        .expose_headers([HeaderName::from_static("x-job-id")])
        .max_age(std::time::Duration::from_secs(3600))
}
