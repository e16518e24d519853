//! `GET /backfill/{seller}` (§6, §4.11): triggers or previews the onboarding
//! backfill for one seller.

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
use crate::onboarding::{BackfillOptions, BackfillSummary, OnboardingBackfill};
use crate::release_status::ReleaseStatusChecker;
use crate::routes::error::ApiError;
use crate::settlement_scheduler::SettlementScheduler;

#[derive(Debug, Deserialize)]
pub struct BackfillQuery {
    pub begin_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub dry_run: bool,
    pub max_process: Option<u32>,
    // Accepted for wire-compatibility; see BackfillOptions doc comment.
    pub concurrency: Option<u32>,
    pub reprocess_missing_fees: Option<bool>,
}

pub async fn trigger_backfill(
    State(state): State<Arc<AppState>>,
    Path(seller_slug): Path<String>,
    Query(query): Query<BackfillQuery>,
    _user: AuthUser,
) -> Result<Json<BackfillSummary>, ApiError> {
    let seller = Seller::find(&state.db_pool, &seller_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("seller {seller_slug} not found")))?;

    if !seller.erp_enabled() {
        return Err(ApiError::BadRequest(format!("seller {seller_slug} is not in dashboard_erp mode")));
    }

    let release_status =
        ReleaseStatusChecker::new(state.marketplace_client.clone(), Arc::new(state.cache.clone()));
    let scheduler = SettlementScheduler {
        job_store: &state.job_store,
        erp: &state.erp_client,
        release_status: &release_status,
        lookback_days: state.config.settlement_lookback_days,
        verify_release: true,
    };
    let backfill = OnboardingBackfill::new(&state.db_pool, &state.job_store, &state.marketplace_client, &scheduler);

    let options = BackfillOptions {
        begin_date: query.begin_date,
        end_date: query.end_date,
        max_process: query.max_process,
        dry_run: query.dry_run,
    };

    let today = chrono::Utc::now().date_naive();
    let summary = backfill
        .run(&seller, today, options)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(summary))
}
