//! Custom extractors that convert axum rejections to canonical envelope
//! errors.
//!
//! Use `GuardedQuery<T>` as a drop-in replacement for `axum::extract::Query<T>`
//! in handler signatures. Unlike the standard extractor, a malformed query
//! string produces the canonical error envelope instead of axum's
//! plain-text rejection.

use axum::extract::{FromRequestParts, Query, rejection::QueryRejection};
use axum::http::request::Parts;

use mirador_core::error::GuardError;

use crate::error::ApiFailure;

pub struct GuardedQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for GuardedQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiFailure;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(GuardedQuery(value)),
            Err(rejection) => Err(ApiFailure(GuardError::InvalidPayload(format!(
                "invalid query string: {}",
                rejection.body_text()
            )))),
        }
    }
}
