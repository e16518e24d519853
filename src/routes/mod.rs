use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::AppState;
use crate::auth;

pub mod backfill;
pub mod error;
pub mod queue;
pub mod sellers;
pub mod settlement;
pub mod webhooks;

async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    // Test database connection
    let db_connected = sqlx::query("SELECT 1")
        .fetch_one(&state.db_pool)
        .await
        .is_ok();

    let pool_size = state.db_pool.size();
    let idle_connections = state.db_pool.num_idle();

    if !db_connected {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "database": {
                    "connected": false,
                    "error": "Database connection failed"
                }
            })),
        ));
    }

    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "database": {
            "connected": true,
            "pool_size": pool_size,
            "idle_connections": idle_connections
        }
    })))
}

pub fn create_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        // Auth endpoints
        .route("/api/auth/login", post(auth::handlers::login))
        .route("/api/auth/me", get(auth::handlers::get_me))
        .route("/api/auth/logout", post(auth::handlers::logout))
        // Marketplace webhook intake
        .route("/webhooks/ml", post(webhooks::receive_marketplace_webhook))
        // Onboarding backfill
        .route("/backfill/{seller}", get(backfill::trigger_backfill))
        // Settlement (baixas)
        .route("/baixas/processar/{seller}", get(settlement::trigger_settlement))
        // Job queue visibility and intervention
        .route("/queue/status", get(queue::queue_status))
        .route("/queue/dead", get(queue::queue_dead))
        .route("/queue/retry/{job_id}", post(queue::retry_job))
        .route("/queue/retry-all-dead", post(queue::retry_all_dead))
        // Admin CRUD over sellers
        .route(
            "/api/admin/sellers",
            get(sellers::list_sellers).post(sellers::create_seller),
        )
        .route(
            "/api/admin/sellers/{slug}",
            get(sellers::get_seller).patch(sellers::update_seller),
        )
        .with_state(state)
}
