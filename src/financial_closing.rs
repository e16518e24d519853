//! Financial Closing (§4.10): per-seller, per-day attestation that both
//! posting lanes — API-posted jobs and manually-imported XLSX expenses —
//! are complete, persisted so later pipeline runs can skip a day that's
//! already closed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;

use crate::domain::{ExpenseStatus, PaymentProcessingStatus};
use crate::job_store::{JobStore, JobStoreError};

const SYNC_KEY: &str = "financial-closing";

#[derive(Debug, Error)]
pub enum FinancialClosingError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    JobStore(#[from] JobStoreError),
}

/// One condition of the four that must all hold for a day to be `closed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClosingConditions {
    pub payments_synced: bool,
    pub expenses_settled: bool,
    pub no_dead_jobs: bool,
    pub coverage_complete: bool,
}

impl ClosingConditions {
    pub fn closed(&self) -> bool {
        self.payments_synced && self.expenses_settled && self.no_dead_jobs && self.coverage_complete
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosingAttestation {
    pub seller_slug: String,
    pub day: NaiveDate,
    pub conditions: ClosingConditions,
    pub closed: bool,
}

pub struct FinancialClosing<'a> {
    pool: &'a PgPool,
    job_store: &'a JobStore,
}

impl<'a> FinancialClosing<'a> {
    pub fn new(pool: &'a PgPool, job_store: &'a JobStore) -> Self {
        Self { pool, job_store }
    }

    /// `coverage_complete` is supplied by the caller — the orchestrator runs
    /// the Coverage Checker as its own pipeline step (§4.5) and passes the
    /// result on rather than this module re-parsing the statement.
    pub async fn evaluate(
        &self,
        seller_slug: &str,
        day: NaiveDate,
        coverage_complete: bool,
    ) -> Result<ClosingAttestation, FinancialClosingError> {
        let conditions = ClosingConditions {
            payments_synced: self.all_payments_synced(seller_slug, day).await?,
            expenses_settled: self.all_expenses_settled(seller_slug, day).await?,
            no_dead_jobs: self.no_dead_jobs_for_day(seller_slug, day).await?,
            coverage_complete,
        };

        let attestation = ClosingAttestation {
            seller_slug: seller_slug.to_string(),
            day,
            conditions,
            closed: conditions.closed(),
        };

        self.persist(&attestation).await?;
        Ok(attestation)
    }

    async fn all_payments_synced(&self, seller_slug: &str, day: NaiveDate) -> Result<bool, FinancialClosingError> {
        let unsynced = sqlx::query_scalar!(
            r#"
            SELECT COUNT(*) FROM payments
            WHERE seller_slug = $1 AND approval_date = $2
              AND processing_status NOT IN ($3, $4, $5)
            "#,
            seller_slug,
            day,
            PaymentProcessingStatus::Synced as _,
            PaymentProcessingStatus::Skipped as _,
            PaymentProcessingStatus::SkippedNonSale as _,
        )
        .fetch_one(self.pool)
        .await?
        .unwrap_or(0);
        Ok(unsynced == 0)
    }

    async fn all_expenses_settled(&self, seller_slug: &str, day: NaiveDate) -> Result<bool, FinancialClosingError> {
        let unsettled = sqlx::query_scalar!(
            r#"
            SELECT COUNT(*) FROM expenses
            WHERE seller_slug = $1 AND occurred_on = $2 AND status <> $3
            "#,
            seller_slug,
            day,
            ExpenseStatus::Imported as _,
        )
        .fetch_one(self.pool)
        .await?
        .unwrap_or(0);
        Ok(unsettled == 0)
    }

    async fn no_dead_jobs_for_day(&self, seller_slug: &str, day: NaiveDate) -> Result<bool, FinancialClosingError> {
        let group_ids: Vec<String> = sqlx::query_scalar!(
            r#"
            SELECT DISTINCT seller_slug || ':' || marketplace_payment_id
            FROM payments WHERE seller_slug = $1 AND approval_date = $2
            "#,
            seller_slug,
            day,
        )
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .flatten()
        .collect();

        if group_ids.is_empty() {
            return Ok(true);
        }

        Ok(!self.job_store.any_dead_in_groups(&group_ids).await?)
    }

    async fn persist(&self, attestation: &ClosingAttestation) -> Result<(), FinancialClosingError> {
        let state = serde_json::to_value(attestation).unwrap_or_default();
        sqlx::query!(
            r#"
            INSERT INTO sync_state (sync_key, seller_slug, state, last_run_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (sync_key, seller_slug) DO UPDATE SET
                state = EXCLUDED.state,
                last_run_at = NOW(),
                updated_at = NOW()
            "#,
            SYNC_KEY,
            attestation.seller_slug,
            state,
        )
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// True if an earlier run already closed this day — lets the orchestrator
    /// skip the heavier steps entirely.
    pub async fn already_closed(
        &self,
        seller_slug: &str,
        day: NaiveDate,
    ) -> Result<bool, FinancialClosingError> {
        let row = sqlx::query!(
            r#"SELECT state FROM sync_state WHERE sync_key = $1 AND seller_slug = $2"#,
            SYNC_KEY,
            seller_slug,
        )
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };
        let Ok(attestation) = serde_json::from_value::<ClosingAttestation>(row.state) else {
            return Ok(false);
        };
        Ok(attestation.day == day && attestation.closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_requires_all_four_conditions() {
        let mut conditions = ClosingConditions {
            payments_synced: true,
            expenses_settled: true,
            no_dead_jobs: true,
            coverage_complete: true,
        };
        assert!(conditions.closed());

        conditions.coverage_complete = false;
        assert!(!conditions.closed());
    }
}
