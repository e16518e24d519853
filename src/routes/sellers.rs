//! Admin CRUD over sellers (§6). Revenue lines and goals are explicitly out
//! of scope (SPEC_FULL.md §C, dashboard aggregate-revenue pipeline).

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use crate::AppState;
use crate::auth::AuthUser;
use crate::domain::{IntegrationMode, Seller};
use crate::routes::error::ApiError;

pub async fn list_sellers(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<Vec<Seller>>, ApiError> {
    Ok(Json(Seller::list_all(&state.db_pool).await?))
}

pub async fn get_seller(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    _user: AuthUser,
) -> Result<Json<Seller>, ApiError> {
    Seller::find(&state.db_pool, &slug)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("seller {slug} not found")))
}

#[derive(Debug, Deserialize)]
pub struct CreateSellerRequest {
    pub slug: String,
    pub marketplace_user_id: String,
    pub integration_mode: IntegrationMode,
    pub erp_retained_funds_account_id: Option<String>,
    pub erp_cost_center_id: Option<String>,
    pub erp_counterparty_contact_id: Option<String>,
    pub erp_start_date: Option<NaiveDate>,
    pub dashboard_company: Option<String>,
    pub dashboard_group: Option<String>,
    pub dashboard_segment: Option<String>,
}

pub async fn create_seller(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(req): Json<CreateSellerRequest>,
) -> Result<Json<Seller>, ApiError> {
    let seller = sqlx::query_as!(
        Seller,
        r#"
        INSERT INTO sellers (
            slug, marketplace_user_id, integration_mode, erp_retained_funds_account_id,
            erp_cost_center_id, erp_counterparty_contact_id, erp_start_date,
            dashboard_company, dashboard_group, dashboard_segment
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING slug, marketplace_user_id, marketplace_access_token, marketplace_refresh_token,
                  marketplace_token_expires_at, marketplace_app_id, marketplace_app_secret,
                  erp_retained_funds_account_id, erp_cost_center_id, erp_counterparty_contact_id,
                  dashboard_company, dashboard_group, dashboard_segment,
                  integration_mode as "integration_mode: _", erp_start_date,
                  onboarding_status as "onboarding_status: _", backfill_status as "backfill_status: _",
                  backfill_total, backfill_processed, backfill_skipped, backfill_errors,
                  backfill_last_payment_id, created_at, updated_at
        "#,
        req.slug,
        req.marketplace_user_id,
        req.integration_mode as _,
        req.erp_retained_funds_account_id,
        req.erp_cost_center_id,
        req.erp_counterparty_contact_id,
        req.erp_start_date,
        req.dashboard_company,
        req.dashboard_group,
        req.dashboard_segment,
    )
    .fetch_one(&state.db_pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.constraint().is_some() => {
            ApiError::BadRequest(db_err.message().to_string())
        }
        _ => ApiError::Internal(e.to_string()),
    })?;

    Ok(Json(seller))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSellerRequest {
    pub onboarding_status: Option<crate::domain::OnboardingStatus>,
    pub erp_retained_funds_account_id: Option<String>,
    pub erp_cost_center_id: Option<String>,
    pub erp_counterparty_contact_id: Option<String>,
    pub erp_start_date: Option<NaiveDate>,
}

pub async fn update_seller(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    _user: AuthUser,
    Json(req): Json<UpdateSellerRequest>,
) -> Result<Json<Seller>, ApiError> {
    let seller = sqlx::query_as!(
        Seller,
        r#"
        UPDATE sellers SET
            onboarding_status = COALESCE($2, onboarding_status),
            erp_retained_funds_account_id = COALESCE($3, erp_retained_funds_account_id),
            erp_cost_center_id = COALESCE($4, erp_cost_center_id),
            erp_counterparty_contact_id = COALESCE($5, erp_counterparty_contact_id),
            erp_start_date = COALESCE($6, erp_start_date),
            updated_at = NOW()
        WHERE slug = $1
        RETURNING slug, marketplace_user_id, marketplace_access_token, marketplace_refresh_token,
                  marketplace_token_expires_at, marketplace_app_id, marketplace_app_secret,
                  erp_retained_funds_account_id, erp_cost_center_id, erp_counterparty_contact_id,
                  dashboard_company, dashboard_group, dashboard_segment,
                  integration_mode as "integration_mode: _", erp_start_date,
                  onboarding_status as "onboarding_status: _", backfill_status as "backfill_status: _",
                  backfill_total, backfill_processed, backfill_skipped, backfill_errors,
                  backfill_last_payment_id, created_at, updated_at
        "#,
        slug,
        req.onboarding_status,
        req.erp_retained_funds_account_id,
        req.erp_cost_center_id,
        req.erp_counterparty_contact_id,
        req.erp_start_date,
    )
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("seller {slug} not found")))?;

    Ok(Json(seller))
}
