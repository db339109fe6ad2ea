/// Health and metrics endpoints
///
/// The health report checks the proofs bucket: it must exist and should be
/// private. A storage failure degrades the report but never turns it into a
/// server error, so the endpoint stays usable as a liveness check. Failure
/// detail goes to the log, not the public report. Metrics need an admin
/// credential.
use crate::{auth::AdminCredential, context::AppContext, error::AppResult, metrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::warn;

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status: "healthy" or "degraded"
    pub status: String,

    pub version: String,

    pub checks: Vec<ComponentHealth>,
}

/// Health status of individual component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,

    /// Status: "healthy", "degraded", or "unhealthy"
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
}

/// Service version plus the storage bucket check
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthStatus> {
    let storage = check_storage(&ctx).await;
    let status = if storage.status == "healthy" {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: vec![storage],
    })
}

async fn check_storage(ctx: &AppContext) -> ComponentHealth {
    let started = Instant::now();
    let bucket = ctx.storage.bucket().to_string();
    let result = ctx.storage.bucket_info().await;
    let elapsed = Some(started.elapsed().as_millis() as u64);

    match result {
        Ok(Some(info)) => ComponentHealth {
            name: "storage".to_string(),
            // A public proofs bucket exposes every attachment
            status: if info.public { "degraded" } else { "healthy" }.to_string(),
            response_time_ms: elapsed,
            error: info
                .public
                .then(|| format!("bucket '{}' is public", info.name)),
            details: Some(serde_json::json!({
                "bucket": info.name,
                "found": true,
                "public": info.public,
            })),
        },
        Ok(None) => ComponentHealth {
            name: "storage".to_string(),
            status: "unhealthy".to_string(),
            response_time_ms: elapsed,
            error: Some(format!("bucket '{}' not found", bucket)),
            details: Some(serde_json::json!({ "bucket": bucket, "found": false })),
        },
        Err(e) => {
            warn!(error = %e, "health_check_failed: storage");
            ComponentHealth {
                name: "storage".to_string(),
                status: "unhealthy".to_string(),
                response_time_ms: elapsed,
                error: Some("storage check failed".to_string()),
                details: None,
            }
        }
    }
}

/// Prometheus text exposition, admin only
pub async fn metrics_text(
    State(ctx): State<AppContext>,
    credential: AdminCredential,
) -> AppResult<impl IntoResponse> {
    ctx.admin.authenticate(&credential).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    ))
}
