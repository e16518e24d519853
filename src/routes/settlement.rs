//! `GET /baixas/processar/{seller}` (§6, §4.4): triggers or previews a
//! settlement run for one seller. `dry_run` reuses
//! `SettlementScheduler::run_for_seller`'s native dry-run support, so this is
//! a thin parameter-parsing wrapper rather than a second code path.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use crate::AppState;
use crate::auth::AuthUser;
use crate::domain::Seller;
use crate::release_status::ReleaseStatusChecker;
use crate::routes::error::ApiError;
use crate::settlement_scheduler::{SettlementReport, SettlementScheduler};

#[derive(Debug, Deserialize)]
pub struct SettlementQuery {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_verify_release")]
    pub verify_release: bool,
    pub data_ate: Option<NaiveDate>,
    pub lookback_days: Option<i64>,
}

fn default_verify_release() -> bool {
    true
}

pub async fn trigger_settlement(
    State(state): State<Arc<AppState>>,
    Path(seller_slug): Path<String>,
    Query(query): Query<SettlementQuery>,
    _user: AuthUser,
) -> Result<Json<SettlementReport>, ApiError> {
    let seller = Seller::find(&state.db_pool, &seller_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("seller {seller_slug} not found")))?;

    let today = query.data_ate.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let release_status =
        ReleaseStatusChecker::new(state.marketplace_client.clone(), Arc::new(state.cache.clone()));

    let scheduler = SettlementScheduler {
        job_store: &state.job_store,
        erp: &state.erp_client,
        release_status: &release_status,
        lookback_days: query.lookback_days.unwrap_or(state.config.settlement_lookback_days),
        verify_release: query.verify_release,
    };

    let report = scheduler
        .run_for_seller(&seller, today, query.dry_run)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(report))
}
