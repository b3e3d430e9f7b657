//! Idempotency-key extractor for the `X-Request-ID` header.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

/// Extracts the optional `X-Request-ID` header.
///
/// Mutating endpoints accept the idempotency key either in this header or as
/// a `requestId` field in the body; handlers combine the two, preferring the
/// header.
///
/// # Example
/// ```ignore
/// use axum_helpers::extractors::RequestIdHeader;
///
/// async fn enqueue(RequestIdHeader(request_id): RequestIdHeader) {
///     let request_id = request_id.or(body.request_id);
/// }
/// ```
pub struct RequestIdHeader(pub Option<String>);

impl<S> FromRequestParts<S> for RequestIdHeader
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(RequestIdHeader(value))
    }
}
