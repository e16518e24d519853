use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Revenue,
    Commission,
    Shipping,
    PartialRefund,
    RefundReversal,
    FeeReversal,
    Settlement,
    FeeAdjustment,
}

impl JobKind {
    /// Canonical priorities (§3, §4.2): revenue=10, expense=20, settlement=30.
    pub fn priority(self) -> i32 {
        use crate::config::priority;
        match self {
            JobKind::Revenue => priority::REVENUE,
            JobKind::Commission
            | JobKind::Shipping
            | JobKind::PartialRefund
            | JobKind::RefundReversal
            | JobKind::FeeReversal
            | JobKind::FeeAdjustment => priority::EXPENSE,
            JobKind::Settlement => priority::SETTLEMENT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

/// One pending or completed ERP post. Key: idempotency_key.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub idempotency_key: String,
    pub seller_slug: String,
    pub kind: JobKind,
    pub target_endpoint: String,
    pub http_method: String,
    pub request_body: serde_json::Value,
    pub group_id: String,
    pub priority: i32,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub scheduled_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub erp_response_status: Option<i32>,
    pub erp_response_body: Option<serde_json::Value>,
    pub erp_receipt: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the Job Store needs to insert a new job (§4.2 `enqueue`).
#[derive(Debug, Clone)]
pub struct NewJob {
    pub idempotency_key: String,
    pub seller_slug: String,
    pub kind: JobKind,
    pub group_id: String,
    pub target_endpoint: String,
    pub http_method: String,
    pub request_body: serde_json::Value,
    pub scheduled_at: DateTime<Utc>,
}

impl NewJob {
    pub fn priority(&self) -> i32 {
        self.kind.priority()
    }
}
