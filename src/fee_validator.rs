//! Fee Validator (§4.8): diffs the Processor's stored commission against the
//! marketplace's authoritative release report and enqueues a compensating
//! ERP entry for any discrepancy beyond tolerance.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use sqlx::PgPool;
use thiserror::Error;

use crate::domain::{JobKind, NewJob, Seller};
use crate::job_store::{JobStore, JobStoreError};
use crate::marketplace_client::{MarketplaceClient, MarketplaceClientError};

const PAYABLE_ENDPOINT: &str = "/v1/financeiro/eventos-financeiros/contas-a-pagar";
const RECEIVABLE_ENDPOINT: &str = "/v1/financeiro/eventos-financeiros/contas-a-receber";

#[derive(Debug, Error)]
pub enum FeeValidatorError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    JobStore(#[from] JobStoreError),
    #[error(transparent)]
    Marketplace(#[from] MarketplaceClientError),
}

#[derive(Debug, Clone)]
pub struct FeeDiscrepancy {
    pub marketplace_payment_id: String,
    pub stored_commission: BigDecimal,
    pub report_commission: BigDecimal,
    pub delta: BigDecimal,
}

#[derive(Debug, Default)]
pub struct FeeValidationReport {
    pub checked: u32,
    pub discrepancies: Vec<FeeDiscrepancy>,
}

struct StoredPayment {
    marketplace_payment_id: String,
    commission_amount: Option<BigDecimal>,
}

pub struct FeeValidator<'a> {
    pool: &'a PgPool,
    job_store: &'a JobStore,
    marketplace: &'a MarketplaceClient,
    tolerance: BigDecimal,
}

impl<'a> FeeValidator<'a> {
    pub fn new(
        pool: &'a PgPool,
        job_store: &'a JobStore,
        marketplace: &'a MarketplaceClient,
        tolerance: BigDecimal,
    ) -> Self {
        Self { pool, job_store, marketplace, tolerance }
    }

    /// Runs the diff for `seller` over `[begin_date, end_date]` and enqueues
    /// one compensating job per discrepancy beyond tolerance (§4.8).
    pub async fn validate(
        &self,
        seller: &Seller,
        begin_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<FeeValidationReport, FeeValidatorError> {
        let stored = self.stored_payments(&seller.slug, begin_date, end_date).await?;
        if stored.is_empty() {
            return Ok(FeeValidationReport::default());
        }

        let report_rows = self.marketplace.fetch_release_report(&seller.slug, begin_date, end_date).await?;
        let mut report = FeeValidationReport::default();

        for payment in &stored {
            let Some(stored_commission) = payment.commission_amount.clone() else {
                continue;
            };
            let Some(row) = report_rows.iter().find(|r| r.reference_id == payment.marketplace_payment_id) else {
                continue;
            };
            report.checked += 1;

            let delta = &row.fee_amount - &stored_commission;
            if delta.abs() <= self.tolerance {
                continue;
            }

            self.enqueue_adjustment(seller, &payment.marketplace_payment_id, &delta, end_date).await?;

            report.discrepancies.push(FeeDiscrepancy {
                marketplace_payment_id: payment.marketplace_payment_id.clone(),
                stored_commission,
                report_commission: row.fee_amount.clone(),
                delta,
            });
        }

        Ok(report)
    }

    async fn stored_payments(
        &self,
        seller_slug: &str,
        begin_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<StoredPayment>, FeeValidatorError> {
        let rows = sqlx::query_as!(
            StoredPayment,
            r#"
            SELECT marketplace_payment_id, commission_amount
            FROM payments
            WHERE seller_slug = $1 AND approval_date BETWEEN $2 AND $3
              AND commission_amount IS NOT NULL
            "#,
            seller_slug,
            begin_date,
            end_date,
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Positive delta: we under-charged, ERP owes more fee (payable).
    /// Negative delta: we over-charged, ERP should credit us (receivable).
    async fn enqueue_adjustment(
        &self,
        seller: &Seller,
        marketplace_payment_id: &str,
        delta: &BigDecimal,
        report_date: NaiveDate,
    ) -> Result<(), FeeValidatorError> {
        let is_payable = *delta > BigDecimal::from(0);
        let endpoint = if is_payable { PAYABLE_ENDPOINT } else { RECEIVABLE_ENDPOINT };
        let amount = delta.abs();

        let new_job = NewJob {
            idempotency_key: format!(
                "{}:{}:fee-adj:{}",
                seller.slug, marketplace_payment_id, report_date
            ),
            seller_slug: seller.slug.clone(),
            kind: JobKind::FeeAdjustment,
            group_id: format!("{}:{}", seller.slug, marketplace_payment_id),
            target_endpoint: endpoint.to_string(),
            http_method: "POST".to_string(),
            request_body: serde_json::json!({
                "amount": amount.to_string(),
                "competence_date": report_date,
                "due_date": report_date,
                "category": "fee-adjustment",
                "description": format!("fee adjustment for payment {marketplace_payment_id}"),
                "cost_center_id": seller.erp_cost_center_id,
                "counterparty_contact_id": seller.erp_counterparty_contact_id,
            }),
            scheduled_at: chrono::Utc::now(),
        };

        self.job_store.enqueue(new_job).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_delta_is_payable() {
        let delta: BigDecimal = "1.50".parse().unwrap();
        assert!(delta > BigDecimal::from(0));
    }

    #[test]
    fn small_delta_within_tolerance_is_ignored() {
        let tolerance: BigDecimal = "0.01".parse().unwrap();
        let delta: BigDecimal = "0.01".parse().unwrap();
        assert!(delta.abs() <= tolerance);
    }

    #[test]
    fn delta_beyond_tolerance_triggers_adjustment() {
        let tolerance: BigDecimal = "0.01".parse().unwrap();
        let delta: BigDecimal = "0.02".parse().unwrap();
        assert!(delta.abs() > tolerance);
    }
}
