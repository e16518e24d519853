//! Settlement (Baixa) Scheduler (§4.4): posts settlements once a receivable's
//! release date has arrived, since the ERP rejects future-dated settlements.

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use crate::domain::{JobKind, NewJob, Seller};
use crate::erp_client::{ErpClient, ErpClientError};
use crate::job_store::{JobStore, JobStoreError};
use crate::release_status::{ReleaseStatus, ReleaseStatusChecker};

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error(transparent)]
    JobStore(#[from] JobStoreError),
    #[error(transparent)]
    Erp(#[from] ErpClientError),
}

#[derive(Debug, Default, Serialize)]
pub struct SettlementReport {
    pub queued: u32,
    pub skipped: Vec<SkippedParcel>,
    pub errors: u32,
}

#[derive(Debug, Serialize)]
pub struct SkippedParcel {
    pub parcel_id: String,
    pub motivo: String,
}

pub struct SettlementScheduler<'a> {
    pub job_store: &'a JobStore,
    pub erp: &'a ErpClient,
    pub release_status: &'a ReleaseStatusChecker,
    pub lookback_days: i64,
    pub verify_release: bool,
}

impl<'a> SettlementScheduler<'a> {
    /// Runs the full algorithm (§4.4) for one seller across both receivables
    /// and payables on its retained-funds account.
    pub async fn run_for_seller(
        &self,
        seller: &Seller,
        today: NaiveDate,
        dry_run: bool,
    ) -> Result<SettlementReport, SettlementError> {
        let mut report = SettlementReport::default();

        let Some(account_id) = seller.erp_retained_funds_account_id.clone() else {
            return Ok(report);
        };

        let due_from = today - Duration::days(self.lookback_days);

        for kind in ["receber", "pagar"] {
            let parcels = self.erp.list_open_parcels(kind, &account_id, due_from, today).await?;

            for parcel in parcels {
                let payment_id = extract_payment_id(&parcel.description);

                if self.verify_release {
                    if let Some(payment_id) = &payment_id {
                        let status = self.release_status.status_for(&seller.slug, payment_id).await;
                        if status == ReleaseStatus::Pending {
                            report.skipped.push(SkippedParcel {
                                parcel_id: parcel.id.clone(),
                                motivo: "money_release_status != released".to_string(),
                            });
                            continue;
                        }
                    }
                }

                if dry_run {
                    report.queued += 1;
                    continue;
                }

                let new_job = NewJob {
                    idempotency_key: format!("{}:{}:settlement", seller.slug, parcel.id),
                    seller_slug: seller.slug.clone(),
                    kind: JobKind::Settlement,
                    group_id: format!("{}:{}", seller.slug, parcel.id),
                    target_endpoint: format!(
                        "/v1/financeiro/eventos-financeiros/parcelas/{}/baixa",
                        parcel.id
                    ),
                    http_method: "POST".to_string(),
                    request_body: serde_json::json!({
                        "payment_date": parcel.due_date,
                        "amount": parcel.unpaid.to_string(),
                        "financial_account_id": account_id,
                    }),
                    scheduled_at: Utc::now(),
                };

                match self.job_store.enqueue(new_job).await {
                    Ok(_) => report.queued += 1,
                    Err(e) => {
                        log::error!("failed to enqueue settlement for parcel {}: {e}", parcel.id);
                        report.errors += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}

/// Parcel descriptions embed the originating marketplace payment id; the
/// exact format is ERP-specific, so this extracts the first run of digits.
fn extract_payment_id(description: &str) -> Option<String> {
    let digits: String = description.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() >= 6 {
        Some(digits)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_payment_id_from_description() {
        let id = extract_payment_id("Settlement for marketplace payment 144359445042").unwrap();
        assert_eq!(id, "144359445042");
    }

    #[test]
    fn short_digit_runs_are_not_treated_as_payment_ids() {
        assert!(extract_payment_id("parcel #4 adjustment").is_none());
    }
}
