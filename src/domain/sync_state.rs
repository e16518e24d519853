use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-(sync_key, seller) cursor/state blob: resumable runs, last-run outcomes,
/// and the financial-closing attestation (§4.10).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SyncState {
    pub id: i64,
    pub sync_key: String,
    pub seller_slug: String,
    pub state: serde_json::Value,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
