//! Coverage Checker (§4.9): given a seller's bank statement for a date
//! range, buckets every line by what covers it and reports the uncovered
//! remainder. The target is 100% — any uncovered line is an alert.

use sqlx::PgPool;
use thiserror::Error;

use crate::gap_ingester::{classify, parse_statement_rows, Classification};

#[derive(Debug, Error)]
pub enum CoverageCheckerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageSource {
    PaymentsApi,
    Expenses,
    LegacyNonOrder,
    Uncovered,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct CoverageReport {
    pub total: u32,
    pub covered_by_payments_api: u32,
    pub covered_by_expenses: u32,
    pub covered_by_legacy_non_order: u32,
    pub uncovered: u32,
    pub uncovered_sample: Vec<String>,
}

impl CoverageReport {
    pub fn percent_covered(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        let covered = self.total - self.uncovered;
        (covered as f64 / self.total as f64) * 100.0
    }

    pub fn is_fully_covered(&self) -> bool {
        self.uncovered == 0
    }
}

const UNCOVERED_SAMPLE_SIZE: usize = 20;

pub struct CoverageChecker<'a> {
    pool: &'a PgPool,
}

impl<'a> CoverageChecker<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn check(&self, seller_slug: &str, csv: &str) -> Result<CoverageReport, CoverageCheckerError> {
        let rows = parse_statement_rows(csv);
        let mut report = CoverageReport::default();

        for row in &rows {
            report.total += 1;
            let source = self.classify_line(seller_slug, &row.reference_id, &row.transaction_type).await?;
            match source {
                CoverageSource::PaymentsApi => report.covered_by_payments_api += 1,
                CoverageSource::Expenses => report.covered_by_expenses += 1,
                CoverageSource::LegacyNonOrder => report.covered_by_legacy_non_order += 1,
                CoverageSource::Uncovered => {
                    report.uncovered += 1;
                    if report.uncovered_sample.len() < UNCOVERED_SAMPLE_SIZE {
                        report.uncovered_sample.push(row.reference_id.clone());
                    }
                }
            }
        }

        Ok(report)
    }

    async fn classify_line(
        &self,
        seller_slug: &str,
        reference_id: &str,
        transaction_type: &str,
    ) -> Result<CoverageSource, CoverageCheckerError> {
        let has_payment = sqlx::query_scalar!(
            r#"SELECT EXISTS(SELECT 1 FROM payments WHERE seller_slug = $1 AND marketplace_payment_id = $2)"#,
            seller_slug,
            reference_id,
        )
        .fetch_one(self.pool)
        .await?
        .unwrap_or(false);

        if has_payment {
            return Ok(CoverageSource::PaymentsApi);
        }

        let abbreviation = match classify(transaction_type) {
            // Deliberately covered elsewhere (Payments API, settlement) — not
            // an Expense row, but not a gap either.
            Classification::Skip => return Ok(CoverageSource::LegacyNonOrder),
            // Didn't match any rule table entry: a genuine gap, not a known
            // covered case.
            Classification::Unmatched => return Ok(CoverageSource::Uncovered),
            Classification::Emit { abbreviation, .. } => abbreviation,
        };

        let composite_id = format!("{reference_id}:{abbreviation}");
        let has_expense = sqlx::query_scalar!(
            r#"SELECT EXISTS(SELECT 1 FROM expenses WHERE seller_slug = $1 AND payment_id = $2)"#,
            seller_slug,
            composite_id,
        )
        .fetch_one(self.pool)
        .await?
        .unwrap_or(false);

        if has_expense {
            Ok(CoverageSource::Expenses)
        } else {
            Ok(CoverageSource::Uncovered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_statement_is_fully_covered() {
        let report = CoverageReport::default();
        assert!(report.is_fully_covered());
        assert_eq!(report.percent_covered(), 100.0);
    }

    #[test]
    fn percent_covered_accounts_for_uncovered_lines() {
        let report = CoverageReport { total: 4, uncovered: 1, ..Default::default() };
        assert_eq!(report.percent_covered(), 75.0);
        assert!(!report.is_fully_covered());
    }
}
