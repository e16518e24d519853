use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "integration_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMode {
    DashboardOnly,
    DashboardErp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "onboarding_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    PendingApproval,
    Approved,
    Active,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "backfill_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackfillStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Identity of a marketplace account and its ERP posting configuration.
///
/// `slug` is the stable key used throughout the system (job idempotency keys,
/// sync-state rows, route paths); `marketplace_user_id` is the upstream ID.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Seller {
    pub slug: String,
    pub marketplace_user_id: String,
    pub marketplace_access_token: Option<String>,
    pub marketplace_refresh_token: Option<String>,
    pub marketplace_token_expires_at: Option<DateTime<Utc>>,
    pub marketplace_app_id: Option<String>,
    pub marketplace_app_secret: Option<String>,
    pub erp_retained_funds_account_id: Option<String>,
    pub erp_cost_center_id: Option<String>,
    pub erp_counterparty_contact_id: Option<String>,
    pub dashboard_company: Option<String>,
    pub dashboard_group: Option<String>,
    pub dashboard_segment: Option<String>,
    pub integration_mode: IntegrationMode,
    pub erp_start_date: Option<NaiveDate>,
    pub onboarding_status: OnboardingStatus,
    pub backfill_status: Option<BackfillStatus>,
    pub backfill_total: i32,
    pub backfill_processed: i32,
    pub backfill_skipped: i32,
    pub backfill_errors: i32,
    pub backfill_last_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Seller {
    /// Fetches one seller by its slug, used by the admin routes and every
    /// per-seller trigger endpoint (backfill, settlement).
    pub async fn find(pool: &sqlx::PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Seller,
            r#"
            SELECT slug, marketplace_user_id, marketplace_access_token, marketplace_refresh_token,
                   marketplace_token_expires_at, marketplace_app_id, marketplace_app_secret,
                   erp_retained_funds_account_id, erp_cost_center_id, erp_counterparty_contact_id,
                   dashboard_company, dashboard_group, dashboard_segment,
                   integration_mode as "integration_mode: _", erp_start_date,
                   onboarding_status as "onboarding_status: _", backfill_status as "backfill_status: _",
                   backfill_total, backfill_processed, backfill_skipped, backfill_errors,
                   backfill_last_payment_id, created_at, updated_at
            FROM sellers WHERE slug = $1
            "#,
            slug,
        )
        .fetch_optional(pool)
        .await
    }

    /// Lists every seller, newest first, for the admin sellers index.
    pub async fn list_all(pool: &sqlx::PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Seller,
            r#"
            SELECT slug, marketplace_user_id, marketplace_access_token, marketplace_refresh_token,
                   marketplace_token_expires_at, marketplace_app_id, marketplace_app_secret,
                   erp_retained_funds_account_id, erp_cost_center_id, erp_counterparty_contact_id,
                   dashboard_company, dashboard_group, dashboard_segment,
                   integration_mode as "integration_mode: _", erp_start_date,
                   onboarding_status as "onboarding_status: _", backfill_status as "backfill_status: _",
                   backfill_total, backfill_processed, backfill_skipped, backfill_errors,
                   backfill_last_payment_id, created_at, updated_at
            FROM sellers ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await
    }

    pub fn is_active(&self) -> bool {
        self.onboarding_status == OnboardingStatus::Active
    }

    pub fn erp_enabled(&self) -> bool {
        self.integration_mode == IntegrationMode::DashboardErp
    }

    /// §3 invariant: dashboard+erp sellers must carry complete ERP targets
    /// and an erp-start-date on the first of a month. The DB also enforces
    /// this via a CHECK constraint; this mirrors it for pre-insert validation.
    pub fn validate_erp_targets(&self) -> Result<(), String> {
        if !self.erp_enabled() {
            return Ok(());
        }
        if self.erp_retained_funds_account_id.is_none()
            || self.erp_cost_center_id.is_none()
            || self.erp_counterparty_contact_id.is_none()
        {
            return Err("dashboard_erp mode requires retained-funds, cost-center and counterparty targets".into());
        }
        match self.erp_start_date {
            Some(d) if d.format("%d").to_string() == "01" => Ok(()),
            Some(_) => Err("erp_start_date must fall on the first day of a month".into()),
            None => Err("dashboard_erp mode requires an erp_start_date".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_seller() -> Seller {
        Seller {
            slug: "acme".into(),
            marketplace_user_id: "123".into(),
            marketplace_access_token: None,
            marketplace_refresh_token: None,
            marketplace_token_expires_at: None,
            marketplace_app_id: None,
            marketplace_app_secret: None,
            erp_retained_funds_account_id: None,
            erp_cost_center_id: None,
            erp_counterparty_contact_id: None,
            dashboard_company: None,
            dashboard_group: None,
            dashboard_segment: None,
            integration_mode: IntegrationMode::DashboardOnly,
            erp_start_date: None,
            onboarding_status: OnboardingStatus::Active,
            backfill_status: None,
            backfill_total: 0,
            backfill_processed: 0,
            backfill_skipped: 0,
            backfill_errors: 0,
            backfill_last_payment_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn dashboard_only_needs_nothing() {
        let seller = base_seller();
        assert!(seller.validate_erp_targets().is_ok());
    }

    #[test]
    fn dashboard_erp_without_targets_is_rejected() {
        let mut seller = base_seller();
        seller.integration_mode = IntegrationMode::DashboardErp;
        assert!(seller.validate_erp_targets().is_err());
    }

    #[test]
    fn dashboard_erp_start_date_must_be_first_of_month() {
        let mut seller = base_seller();
        seller.integration_mode = IntegrationMode::DashboardErp;
        seller.erp_retained_funds_account_id = Some("acc".into());
        seller.erp_cost_center_id = Some("cc".into());
        seller.erp_counterparty_contact_id = Some("ct".into());
        seller.erp_start_date = Some(NaiveDate::from_ymd_opt(2026, 2, 15).unwrap());
        assert!(seller.validate_erp_targets().is_err());

        seller.erp_start_date = Some(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert!(seller.validate_erp_targets().is_ok());
    }
}
