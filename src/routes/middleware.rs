// ============================================================================
// Axum Middleware
// ============================================================================
//
// Middleware for request processing:
// - request_logging: Log all incoming requests
// - force_https: Redirect requests that did not arrive over TLS
// - authenticate: Verify signed bodies and record the outcome
//
// ============================================================================

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;

use crate::auth;
use crate::config::MAX_REQUEST_BODY_SIZE;
use crate::context::PodContext;
use crate::error::PodError;

/// Request logging middleware
pub async fn request_logging(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    tracing::debug!(
        method = %method,
        path = %path,
        "Incoming request"
    );

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}

/// Redirect plain-HTTP requests to the https origin
///
/// TLS terminates in front of the pod, so the scheme is read from
/// `X-Forwarded-Proto`.
pub async fn force_https(
    State(ctx): State<Arc<PodContext>>,
    req: Request,
    next: Next,
) -> Response {
    if !ctx.config.force_https {
        return next.run(req).await;
    }

    let is_https = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("https"))
        .unwrap_or(false);
    if is_https {
        return next.run(req).await;
    }

    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(ctx.config.public_address.as_str());
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let location = format!("https://{host}{path_and_query}");

    tracing::debug!(location = %location, "Redirecting to https");
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Authentication stage
///
/// Buffers the body of every request that is not GET, HEAD or DELETE and
/// stores an [`auth::Authentication`] in the request extensions. Never
/// rejects on authentication grounds; route extractors decide.
pub async fn authenticate(
    State(ctx): State<Arc<PodContext>>,
    req: Request,
    next: Next,
) -> Result<Response, PodError> {
    if matches!(
        *req.method(),
        Method::GET | Method::HEAD | Method::DELETE | Method::OPTIONS
    ) {
        return Ok(next.run(req).await);
    }

    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_REQUEST_BODY_SIZE)
        .await
        .map_err(|_| PodError::bad_request("Request body is too large"))?;

    let authentication = auth::authenticate(&ctx.registry, &ctx.federation, &bytes).await;
    tracing::debug!(
        path = %parts.uri.path(),
        verified = authentication.is_verified(),
        "Authentication stage complete"
    );

    let mut req = Request::from_parts(parts, Body::from(bytes));
    req.extensions_mut().insert(authentication);
    Ok(next.run(req).await)
}
