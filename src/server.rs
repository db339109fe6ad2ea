/// HTTP server setup and routing
use crate::{
    auth::{ADMIN_KEY_HEADER, ADMIN_PASSWORD_HEADER},
    context::AppContext,
    error::{AppError, AppResult},
    rate_limit::global_throttle_middleware,
};
use axum::{
    http::{header, HeaderName, Method, StatusCode},
    middleware,
    response::Json,
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
/// Returns Router<()> because state is already provided
pub fn build_router(ctx: AppContext) -> Router {
    // Front end is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(ADMIN_KEY_HEADER),
            HeaderName::from_static(ADMIN_PASSWORD_HEADER),
        ]);

    Router::new()
        .merge(crate::api::routes(&ctx))
        // Provide state - converts Router<AppContext> to Router<()>
        .with_state(ctx.clone())
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(ctx, global_throttle_middleware))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "ok": false,
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> AppResult<()> {
    let addr = ctx.config.bind_address();

    info!("Civic Desk listening on {}", addr);
    info!("   Environment: {:?}", ctx.config.service.environment);
    info!(
        "   Origin allow-list: {}",
        if ctx.origin_guard.is_enabled() {
            ctx.config.service.origin_allowlist.join(", ")
        } else {
            "disabled".to_string()
        }
    );

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    // Peer address is the last fallback for the client identity
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
