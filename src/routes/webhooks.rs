//! Marketplace webhook intake (SPEC_FULL.md §B). The marketplace calls this
//! on every payment/shipment event; we don't trust the push to be reliable
//! or ordered, so it only persists the raw body for later reconciliation by
//! the nightly sync step rather than acting on it inline.

use axum::{Json, extract::State, http::StatusCode};
use serde_json::Value;
use std::sync::Arc;

use crate::AppState;

pub async fn receive_marketplace_webhook(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<StatusCode, (StatusCode, String)> {
    let event_type = body
        .get("topic")
        .or_else(|| body.get("action"))
        .and_then(Value::as_str)
        .map(str::to_string);

    sqlx::query!(
        r#"INSERT INTO webhook_events (source, event_type, raw_body) VALUES ('marketplace', $1, $2)"#,
        event_type,
        body,
    )
    .execute(&state.db_pool)
    .await
    .map_err(|e| {
        log::error!("failed to persist webhook event: {e}");
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to persist webhook".to_string())
    })?;

    Ok(StatusCode::ACCEPTED)
}
