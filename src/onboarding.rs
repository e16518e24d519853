//! Onboarding Backfill (§4.11): one-shot historical replay triggered when an
//! operator activates a seller in `dashboard+erp` mode. Resumable by
//! construction — progress is persisted every payment and re-invoking picks
//! up via the Processor's own idempotency check rather than a separate
//! cursor.

use chrono::{Duration, NaiveDate};
use sqlx::PgPool;
use thiserror::Error;

use crate::domain::{BackfillStatus, Seller};
use crate::job_store::{JobStore, JobStoreError};
use crate::marketplace_client::{MarketplaceClient, MarketplaceClientError};
use crate::processor::{Processor, ProcessorError, ProcessingOutcome};
use crate::settlement_scheduler::{SettlementError, SettlementScheduler};

const PAGE_SIZE: u32 = 50;
const FUTURE_WINDOW_DAYS: i64 = 90;

/// Overrides accepted by the `/backfill/{seller}` trigger. `concurrency` and
/// `reprocess_missing_fees` are accepted for wire-compatibility but not
/// acted on: the backfill is already idempotent per-payment, and widening it
/// to re-run fee validation or fan out concurrently is future work, not
/// something this one-shot task needs to do safely today.
#[derive(Debug, Clone, Default)]
pub struct BackfillOptions {
    pub begin_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub max_process: Option<u32>,
    pub dry_run: bool,
}

/// Summary returned by a backfill run, dry or real — same shape either way
/// so a caller can't tell the difference except by the counters staying at
/// zero on a dry run.
#[derive(Debug, Default, serde::Serialize)]
pub struct BackfillSummary {
    pub dry_run: bool,
    pub total: u32,
    pub processed: u32,
    pub skipped: u32,
    pub errors: u32,
}

#[derive(Debug, Error)]
pub enum OnboardingError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Marketplace(#[from] MarketplaceClientError),
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    #[error(transparent)]
    JobStore(#[from] JobStoreError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error("seller {0} has no erp_start_date set")]
    MissingStartDate(String),
}

pub struct OnboardingBackfill<'a> {
    pool: &'a PgPool,
    job_store: &'a JobStore,
    marketplace: &'a MarketplaceClient,
    settlement: &'a SettlementScheduler<'a>,
}

impl<'a> OnboardingBackfill<'a> {
    pub fn new(
        pool: &'a PgPool,
        job_store: &'a JobStore,
        marketplace: &'a MarketplaceClient,
        settlement: &'a SettlementScheduler<'a>,
    ) -> Self {
        Self { pool, job_store, marketplace, settlement }
    }

    /// Runs steps 1-3 of §4.11 for `seller`: page through the release-date
    /// window, run every payment through the Processor, and trigger the
    /// Settlement Scheduler inline once any parcel in the window is already
    /// due (step 3 fires per-page rather than per-payment since the
    /// scheduler itself scans all open parcels for the seller).
    ///
    /// `options.dry_run` makes this a read-only preview: payments are paged
    /// and classified the same way, but the Processor is never invoked and
    /// no counters on `sellers` are touched, so a dry run is a strict subset
    /// of a real one rather than a separate code path.
    pub async fn run(
        &self,
        seller: &Seller,
        today: NaiveDate,
        options: BackfillOptions,
    ) -> Result<BackfillSummary, OnboardingError> {
        let begin_date = options
            .begin_date
            .or(seller.erp_start_date)
            .ok_or_else(|| OnboardingError::MissingStartDate(seller.slug.clone()))?;
        let end_date = options.end_date.unwrap_or(today + Duration::days(FUTURE_WINDOW_DAYS));

        if options.dry_run {
            return self.run_dry(seller, begin_date, end_date, options.max_process).await;
        }

        self.set_status(&seller.slug, BackfillStatus::Running).await?;

        let result = self.run_inner(seller, begin_date, end_date, today, options.max_process).await;

        match &result {
            Ok(_) => self.set_status(&seller.slug, BackfillStatus::Completed).await?,
            Err(e) => {
                log::error!("backfill failed for {}: {e}", seller.slug);
                self.set_status(&seller.slug, BackfillStatus::Failed).await?;
            }
        }

        result
    }

    async fn run_inner(
        &self,
        seller: &Seller,
        begin_date: NaiveDate,
        end_date: NaiveDate,
        today: NaiveDate,
        max_process: Option<u32>,
    ) -> Result<BackfillSummary, OnboardingError> {
        let mut offset = 0u32;
        let mut any_due_this_page = false;
        let mut summary = BackfillSummary { dry_run: false, ..Default::default() };

        loop {
            let payments = self
                .marketplace
                .search_payments(&seller.slug, "money_release_date", begin_date, end_date, offset, PAGE_SIZE)
                .await?;

            if payments.is_empty() {
                break;
            }

            for payment in &payments {
                let processor = Processor::new(self.job_store, self.pool, self.marketplace);
                match processor.process(seller, payment).await {
                    Ok(ProcessingOutcome::Skip(_)) => {
                        summary.skipped += 1;
                        self.bump(&seller.slug, "backfill_skipped").await?;
                    }
                    Ok(ProcessingOutcome::Emit(_)) => {
                        summary.processed += 1;
                        self.bump(&seller.slug, "backfill_processed").await?;
                    }
                    Err(e) => {
                        log::warn!("backfill payment {} failed for {}: {e}", payment.id, seller.slug);
                        summary.errors += 1;
                        self.bump(&seller.slug, "backfill_errors").await?;
                    }
                }

                if payment.money_release_date.map(|d| d <= today).unwrap_or(false) {
                    any_due_this_page = true;
                }

                summary.total += 1;
                self.bump_total(&seller.slug).await?;
                self.set_last_payment_id(&seller.slug, &payment.id).await?;

                if max_process.is_some_and(|max| summary.total >= max) {
                    if any_due_this_page {
                        self.settlement.run_for_seller(seller, today, false).await?;
                    }
                    return Ok(summary);
                }
            }

            if any_due_this_page {
                self.settlement.run_for_seller(seller, today, false).await?;
                any_due_this_page = false;
            }

            if payments.len() < PAGE_SIZE as usize {
                break;
            }
            offset += PAGE_SIZE;
        }

        Ok(summary)
    }

    /// Read-only preview: pages and classifies payments exactly like
    /// `run_inner`, but never invokes the Processor or writes to `sellers`.
    async fn run_dry(
        &self,
        seller: &Seller,
        begin_date: NaiveDate,
        end_date: NaiveDate,
        max_process: Option<u32>,
    ) -> Result<BackfillSummary, OnboardingError> {
        let mut offset = 0u32;
        let mut summary = BackfillSummary { dry_run: true, ..Default::default() };

        loop {
            let payments = self
                .marketplace
                .search_payments(&seller.slug, "money_release_date", begin_date, end_date, offset, PAGE_SIZE)
                .await?;

            if payments.is_empty() {
                break;
            }

            for payment in &payments {
                let processor = Processor::new(self.job_store, self.pool, self.marketplace);
                match processor.find_local(seller, payment).await {
                    Ok(Some(local)) if local.processing_status.is_terminal() => summary.skipped += 1,
                    Ok(_) => summary.processed += 1,
                    Err(e) => {
                        log::warn!("backfill preview payment {} failed for {}: {e}", payment.id, seller.slug);
                        summary.errors += 1;
                    }
                }
                summary.total += 1;

                if max_process.is_some_and(|max| summary.total >= max) {
                    return Ok(summary);
                }
            }

            if payments.len() < PAGE_SIZE as usize {
                break;
            }
            offset += PAGE_SIZE;
        }

        Ok(summary)
    }

    async fn set_status(&self, seller_slug: &str, status: BackfillStatus) -> Result<(), OnboardingError> {
        sqlx::query!(
            r#"UPDATE sellers SET backfill_status = $2, updated_at = NOW() WHERE slug = $1"#,
            seller_slug,
            status as _,
        )
        .execute(self.pool)
        .await?;
        Ok(())
    }

    async fn bump_total(&self, seller_slug: &str) -> Result<(), OnboardingError> {
        sqlx::query!(
            r#"UPDATE sellers SET backfill_total = backfill_total + 1, updated_at = NOW() WHERE slug = $1"#,
            seller_slug,
        )
        .execute(self.pool)
        .await?;
        Ok(())
    }

    async fn bump(&self, seller_slug: &str, counter: &str) -> Result<(), OnboardingError> {
        match counter {
            "backfill_skipped" => {
                sqlx::query!(
                    r#"UPDATE sellers SET backfill_skipped = backfill_skipped + 1, updated_at = NOW() WHERE slug = $1"#,
                    seller_slug,
                )
                .execute(self.pool)
                .await?;
            }
            "backfill_processed" => {
                sqlx::query!(
                    r#"UPDATE sellers SET backfill_processed = backfill_processed + 1, updated_at = NOW() WHERE slug = $1"#,
                    seller_slug,
                )
                .execute(self.pool)
                .await?;
            }
            "backfill_errors" => {
                sqlx::query!(
                    r#"UPDATE sellers SET backfill_errors = backfill_errors + 1, updated_at = NOW() WHERE slug = $1"#,
                    seller_slug,
                )
                .execute(self.pool)
                .await?;
            }
            _ => unreachable!("unknown backfill counter"),
        }
        Ok(())
    }

    async fn set_last_payment_id(&self, seller_slug: &str, payment_id: &str) -> Result<(), OnboardingError> {
        sqlx::query!(
            r#"UPDATE sellers SET backfill_last_payment_id = $2, updated_at = NOW() WHERE slug = $1"#,
            seller_slug,
            payment_id,
        )
        .execute(self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn future_window_matches_spec() {
        assert_eq!(super::FUTURE_WINDOW_DAYS, 90);
    }
}
