// ============================================================================
// Axum Routes Module
// ============================================================================
//
// Structure:
// - mod.rs: Main router assembly and middleware
// - identities.rs: Identity registration
// - aliases.rs: Alias lookup, creation and removal
// - tokens.rs: Capability token minting
// - inboxes.rs: Message dispatch and inbox listing
// - messages.rs: Content storage by key
// - health.rs: Health check and metrics endpoints
// - extractors.rs: Signed-request and token extractors
// - middleware.rs: Request logging, https redirect, authentication stage
//
// ============================================================================

mod aliases;
mod extractors;
mod health;
mod identities;
mod inboxes;
mod messages;
mod middleware;
mod tokens;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::context::PodContext;
use crate::error::PodError;

async fn not_found() -> PodError {
    PodError::NotFound(None)
}

async fn not_implemented() -> PodError {
    PodError::NotImplemented(None)
}

/// Create the main application router with all routes
pub fn create_router(ctx: Arc<PodContext>) -> Router {
    Router::new()
        // Health and monitoring
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        // Public
        .route("/", post(identities::register).fallback(not_implemented))
        .route(
            "/messages",
            post(messages::store_content).fallback(not_implemented),
        )
        .route(
            "/messages/:hash",
            get(messages::fetch_content).fallback(not_implemented),
        )
        // Signature + nonce
        .route(
            "/aliases",
            post(aliases::create_alias).fallback(not_implemented),
        )
        .route(
            "/tokens",
            post(tokens::create_token).fallback(not_implemented),
        )
        .route(
            "/inboxes/:to",
            post(inboxes::send_message).fallback(not_implemented),
        )
        // Public lookup, token-gated removal
        .route(
            "/aliases/:alias",
            get(aliases::lookup_alias)
                .delete(aliases::remove_alias)
                .fallback(not_implemented),
        )
        // Token
        .route(
            "/inboxes",
            get(inboxes::list_inbox)
                .delete(inboxes::purge_inbox)
                .fallback(not_implemented),
        )
        .fallback(not_found)
        // Authentication stage (needs state, innermost)
        .layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            middleware::authenticate,
        ))
        .layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            middleware::force_https,
        ))
        // Apply middleware (order matters - last added runs first)
        .layer(
            ServiceBuilder::new()
                // Tracing layer (outermost - runs first)
                .layer(TraceLayer::new_for_http())
                // Request logging
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .into_inner(),
        )
        .with_state(ctx)
}
