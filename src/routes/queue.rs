//! `/queue/*` (§6, §4.2): operator visibility and manual intervention over
//! the Job Store. Status is grouped by job status; `dead` is the status
//! filter's natural special case, paginated like any other list.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;
use crate::auth::AuthUser;
use crate::domain::{Job, JobStatus};
use crate::routes::error::ApiError;

const DEFAULT_PAGE_SIZE: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct QueueStatusQuery {
    pub status: Option<JobStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub dead: i64,
}

pub async fn queue_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QueueStatusQuery>,
    _user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(status) = query.status {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 500);
        let offset = query.offset.unwrap_or(0).max(0);
        let jobs = state.job_store.list_by_status(status, limit, offset).await?;
        return Ok(Json(json!({ "status": status, "jobs": jobs, "limit": limit, "offset": offset })));
    }

    let counts = counts_from(state.job_store.counts_by_status().await?);
    Ok(Json(json!({ "counts": counts })))
}

pub async fn queue_dead(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QueueStatusQuery>,
    _user: AuthUser,
) -> Result<Json<Vec<Job>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);
    let jobs = state.job_store.list_by_status(JobStatus::Dead, limit, offset).await?;
    Ok(Json(jobs))
}

pub async fn retry_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<i64>,
    _user: AuthUser,
) -> Result<Json<Job>, ApiError> {
    state
        .job_store
        .requeue(job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id} not found")))
}

pub async fn retry_all_dead(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let requeued = state.job_store.requeue_all_dead().await?;
    Ok(Json(json!({ "requeued": requeued })))
}

fn counts_from(rows: Vec<(JobStatus, i64)>) -> QueueCounts {
    let mut counts = QueueCounts { pending: 0, processing: 0, completed: 0, failed: 0, dead: 0 };
    for (status, count) in rows {
        match status {
            JobStatus::Pending => counts.pending = count,
            JobStatus::Processing => counts.processing = count,
            JobStatus::Completed => counts.completed = count,
            JobStatus::Failed => counts.failed = count,
            JobStatus::Dead => counts.dead = count,
        }
    }
    counts
}
