//! Orchestrator / Nightly Pipeline (§4.5): composes every other subsystem
//! into one daily idempotent run, strictly sequential, one seller at a time
//! per step so a single seller's failure never blocks the others.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use sqlx::PgPool;

use crate::coverage_checker::CoverageChecker;
use crate::domain::{IntegrationMode, Seller};
use crate::erp_client::ErpClient;
use crate::expense_export::ExpenseExporter;
use crate::fee_validator::FeeValidator;
use crate::financial_closing::FinancialClosing;
use crate::gap_ingester::GapIngester;
use crate::job_store::JobStore;
use crate::marketplace_client::MarketplaceClient;
use crate::processor::Processor;
use crate::release_status::ReleaseStatusChecker;
use crate::settlement_scheduler::SettlementScheduler;

const SYNC_WINDOW_DAYS_BACK: i64 = 3;
const SYNC_WINDOW_DAYS_FORWARD: i64 = 1; // D-1

#[derive(Debug, Default, Serialize)]
pub struct SellerStepStatus {
    pub seller_slug: String,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct PipelineReport {
    pub sync: Vec<SellerStepStatus>,
    pub fee_validation: Vec<SellerStepStatus>,
    pub gap_ingestion: Vec<SellerStepStatus>,
    pub settlement: Vec<SellerStepStatus>,
    pub expense_export: Vec<SellerStepStatus>,
    pub coverage: Vec<SellerStepStatus>,
    pub closing: Vec<SellerStepStatus>,
}

impl PipelineReport {
    /// Overall status is the AND of every step for every seller (§4.5).
    pub fn all_ok(&self) -> bool {
        [
            &self.sync,
            &self.fee_validation,
            &self.gap_ingestion,
            &self.settlement,
            &self.expense_export,
            &self.coverage,
            &self.closing,
        ]
        .into_iter()
        .flatten()
        .all(|s| s.ok)
    }
}

pub struct Orchestrator<'a> {
    pool: &'a PgPool,
    job_store: &'a JobStore,
    erp: &'a ErpClient,
    marketplace: &'a MarketplaceClient,
    release_status: &'a ReleaseStatusChecker,
    fee_validation_tolerance: bigdecimal::BigDecimal,
    settlement_lookback_days: i64,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        pool: &'a PgPool,
        job_store: &'a JobStore,
        erp: &'a ErpClient,
        marketplace: &'a MarketplaceClient,
        release_status: &'a ReleaseStatusChecker,
        fee_validation_tolerance: bigdecimal::BigDecimal,
        settlement_lookback_days: i64,
    ) -> Self {
        Self {
            pool,
            job_store,
            erp,
            marketplace,
            release_status,
            fee_validation_tolerance,
            settlement_lookback_days,
        }
    }

    pub async fn run(&self, today: NaiveDate) -> Result<PipelineReport, sqlx::Error> {
        let sellers = self.active_erp_sellers().await?;
        let window_start = today - Duration::days(SYNC_WINDOW_DAYS_BACK);
        let window_end = today - Duration::days(SYNC_WINDOW_DAYS_FORWARD);

        let mut report = PipelineReport::default();

        for seller in &sellers {
            report.sync.push(self.step("sync", seller, self.sync_step(seller, window_start, window_end)).await);
        }
        for seller in &sellers {
            report.fee_validation.push(
                self.step("fee-validation", seller, self.fee_validation_step(seller, window_start, window_end))
                    .await,
            );
        }
        for seller in &sellers {
            report.gap_ingestion.push(
                self.step("gap-ingestion", seller, self.gap_ingestion_step(seller, window_start, window_end)).await,
            );
        }
        for seller in &sellers {
            report.settlement.push(self.step("settlement", seller, self.settlement_step(seller, today)).await);
        }
        for seller in &sellers {
            report.expense_export.push(
                self.step("expense-export", seller, self.expense_export_step(seller, window_start, window_end))
                    .await,
            );
        }
        let mut coverage_ok = std::collections::HashMap::new();
        for seller in &sellers {
            let (status, full) = self.coverage_step(seller, window_start, window_end).await;
            coverage_ok.insert(seller.slug.clone(), full);
            report.coverage.push(status);
        }
        for seller in &sellers {
            let full = coverage_ok.get(&seller.slug).copied().unwrap_or(false);
            report.closing.push(self.step("closing", seller, self.closing_step(seller, window_end, full)).await);
        }

        Ok(report)
    }

    async fn step<F, T, E>(&self, name: &str, seller: &Seller, fut: F) -> SellerStepStatus
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match fut.await {
            Ok(_) => SellerStepStatus { seller_slug: seller.slug.clone(), ok: true, error: None },
            Err(e) => {
                log::error!("orchestrator step {name} failed for {}: {e}", seller.slug);
                SellerStepStatus { seller_slug: seller.slug.clone(), ok: false, error: Some(e.to_string()) }
            }
        }
    }

    async fn active_erp_sellers(&self) -> Result<Vec<Seller>, sqlx::Error> {
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
            FROM sellers
            WHERE onboarding_status = 'active' AND integration_mode = $1
            "#,
            IntegrationMode::DashboardErp as _,
        )
        .fetch_all(self.pool)
        .await
    }

    async fn sync_step(
        &self,
        seller: &Seller,
        begin_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<(), crate::processor::ProcessorError> {
        let mut offset = 0u32;
        loop {
            let payments =
                self.marketplace.search_payments(&seller.slug, "date_approved", begin_date, end_date, offset, 50).await?;
            if payments.is_empty() {
                break;
            }
            let processor = Processor::new(self.job_store, self.pool, self.marketplace);
            for payment in &payments {
                if let Err(e) = processor.process(seller, payment).await {
                    log::warn!("sync failed for payment {} ({}): {e}", payment.id, seller.slug);
                }
            }
            if payments.len() < 50 {
                break;
            }
            offset += 50;
        }
        Ok(())
    }

    async fn fee_validation_step(
        &self,
        seller: &Seller,
        begin_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<(), crate::fee_validator::FeeValidatorError> {
        let validator =
            FeeValidator::new(self.pool, self.job_store, self.marketplace, self.fee_validation_tolerance.clone());
        validator.validate(seller, begin_date, end_date).await?;
        Ok(())
    }

    async fn gap_ingestion_step(
        &self,
        seller: &Seller,
        begin_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<(), GapIngestionError> {
        let csv = self.marketplace.fetch_bank_statement(&seller.slug, begin_date, end_date).await?;
        let ingester = GapIngester::new(self.pool);
        ingester.ingest(&seller.slug, &csv).await?;
        Ok(())
    }

    async fn settlement_step(
        &self,
        seller: &Seller,
        today: NaiveDate,
    ) -> Result<(), crate::settlement_scheduler::SettlementError> {
        let scheduler = SettlementScheduler {
            job_store: self.job_store,
            erp: self.erp,
            release_status: self.release_status,
            lookback_days: self.settlement_lookback_days,
            verify_release: true,
        };
        scheduler.run_for_seller(seller, today, false).await?;
        Ok(())
    }

    async fn expense_export_step(
        &self,
        seller: &Seller,
        begin_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<(), crate::expense_export::ExpenseExportError> {
        let exporter = ExpenseExporter::new(self.pool);
        exporter.export(&seller.slug, begin_date, end_date).await?;
        Ok(())
    }

    async fn coverage_step(
        &self,
        seller: &Seller,
        begin_date: NaiveDate,
        end_date: NaiveDate,
    ) -> (SellerStepStatus, bool) {
        match self.marketplace.fetch_bank_statement(&seller.slug, begin_date, end_date).await {
            Ok(csv) => match CoverageChecker::new(self.pool).check(&seller.slug, &csv).await {
                Ok(report) => {
                    let full = report.is_fully_covered();
                    if !full {
                        log::warn!(
                            "coverage for {} is {:.1}% ({} uncovered)",
                            seller.slug,
                            report.percent_covered(),
                            report.uncovered
                        );
                    }
                    (SellerStepStatus { seller_slug: seller.slug.clone(), ok: true, error: None }, full)
                }
                Err(e) => (
                    SellerStepStatus { seller_slug: seller.slug.clone(), ok: false, error: Some(e.to_string()) },
                    false,
                ),
            },
            Err(e) => {
                (SellerStepStatus { seller_slug: seller.slug.clone(), ok: false, error: Some(e.to_string()) }, false)
            }
        }
    }

    async fn closing_step(
        &self,
        seller: &Seller,
        day: NaiveDate,
        coverage_complete: bool,
    ) -> Result<(), crate::financial_closing::FinancialClosingError> {
        let closing = FinancialClosing::new(self.pool, self.job_store);
        closing.evaluate(&seller.slug, day, coverage_complete).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum GapIngestionError {
    #[error(transparent)]
    Marketplace(#[from] crate::marketplace_client::MarketplaceClientError),
    #[error(transparent)]
    Ingest(#[from] crate::gap_ingester::GapIngesterError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_trivially_ok() {
        let report = PipelineReport::default();
        assert!(report.all_ok());
    }

    #[test]
    fn a_single_failed_step_fails_the_whole_report() {
        let mut report = PipelineReport::default();
        report.sync.push(SellerStepStatus { seller_slug: "acme".into(), ok: true, error: None });
        report.coverage.push(SellerStepStatus {
            seller_slug: "acme".into(),
            ok: false,
            error: Some("boom".into()),
        });
        assert!(!report.all_ok());
    }
}
