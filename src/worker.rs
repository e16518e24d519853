//! Queue Worker (§4.2): a single long-running loop per process that claims
//! jobs, respects the rate limiter, posts to the ERP, and classifies the
//! outcome. Cancellation-aware: on shutdown it finishes (or fails) the
//! in-flight job and exits, grounded in the onramp processor's
//! `tokio::select!` shutdown pattern.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use reqwest::StatusCode;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::domain::Job;
use crate::erp_client::ErpClient;
use crate::job_store::JobStore;
use crate::utils::telegram::TelegramClient;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Worker {
    job_store: Arc<JobStore>,
    erp: Arc<ErpClient>,
    telegram: TelegramClient,
}

impl Worker {
    pub fn new(job_store: Arc<JobStore>, erp: Arc<ErpClient>) -> Self {
        Self { job_store, erp, telegram: TelegramClient::default() }
    }

    pub fn with_telegram(mut self, telegram: TelegramClient) -> Self {
        self.telegram = telegram;
        self
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                log::info!("worker received shutdown signal, exiting");
                return;
            }

            let claimed = tokio::select! {
                result = self.job_store.claim_next() => result,
                _ = shutdown.changed() => {
                    log::info!("worker received shutdown signal mid-poll, exiting");
                    return;
                }
            };

            match claimed {
                Ok(Some(job)) => {
                    tokio::select! {
                        _ = self.process_job(&job) => {}
                        _ = shutdown.changed() => {
                            log::warn!("shutdown during job {}, marking failed", job.id);
                            let _ = self
                                .job_store
                                .fail(job.id, "worker shutdown mid-flight", None, None)
                                .await;
                            return;
                        }
                    }
                }
                Ok(None) => sleep(POLL_INTERVAL).await,
                Err(e) => {
                    log::error!("claim_next failed: {e}");
                    sleep(POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn process_job(&self, job: &Job) {
        let outcome = self.erp.post_job(&job.http_method, &job.target_endpoint, &job.request_body).await;

        match outcome {
            Ok(response) if response.status.is_success() => {
                if let Err(e) = self
                    .job_store
                    .complete(job.id, response.status.as_u16() as i32, response.body, None)
                    .await
                {
                    log::error!("failed to record completion for job {}: {e}", job.id);
                }
            }
            Ok(response) if response.status == StatusCode::UNAUTHORIZED => {
                log::warn!("job {} still unauthorized after client-level retry", job.id);
                let _ = self
                    .job_store
                    .fail_for_retry_soon(job.id, "ERP token rejected, refreshed and will retry")
                    .await;
            }
            Ok(response) if response.status == StatusCode::BAD_REQUEST => {
                if let Some(reschedule_to) = future_date_refusal(&response.body) {
                    // §8 invariant 10: don't dead-letter; reschedule to the
                    // parcel's actual due date instead.
                    log::info!("job {} rescheduled to {} (future-date refusal)", job.id, reschedule_to);
                    let at = reschedule_to.and_hms_opt(0, 0, 0).unwrap().and_utc();
                    let _ = self.job_store.reschedule_to(job.id, at).await;
                    return;
                }
                self.fail_permanent(job, response.status.as_u16(), response.body).await;
            }
            Ok(response) if response.status.is_client_error() => {
                self.fail_permanent(job, response.status.as_u16(), response.body).await;
            }
            Ok(response) => {
                // 429 or 5xx: transient-remote, exponential backoff.
                let _ = self
                    .job_store
                    .fail(
                        job.id,
                        &format!("ERP returned {}", response.status),
                        Some(response.status.as_u16() as i32),
                        Some(response.body),
                    )
                    .await;
            }
            Err(e) => {
                // Network error/timeout: treated like 5xx (§4.2).
                let _ = self.job_store.fail(job.id, &e.to_string(), None, None).await;
            }
        }
    }

    async fn fail_permanent(&self, job: &Job, status: u16, body: serde_json::Value) {
        // Permanent remote (§7): dead-lettered immediately, no retry.
        if let Err(e) = self
            .job_store
            .fail_permanent(job.id, "permanent remote error", Some(status as i32), Some(body))
            .await
        {
            log::error!("failed to dead-letter job {}: {e}", job.id);
        }

        let message = format!("job {} dead-lettered: ERP returned {status} for {}", job.id, job.target_endpoint);
        if let Err(e) = self.telegram.send_message(&message).await {
            log::warn!("failed to send dead-letter notification: {e}");
        }
    }
}

/// Recognizes the ERP's "payment-date cannot be future" shape (§8 invariant
/// 10) and extracts the parcel's real due date to reschedule to.
fn future_date_refusal(body: &serde_json::Value) -> Option<NaiveDate> {
    let error = body.get("error")?.as_str()?;
    if !error.to_lowercase().contains("future") {
        return None;
    }
    let due_date = body.get("parcel_due_date")?.as_str()?;
    NaiveDate::parse_from_str(due_date, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_future_date_refusal_shape() {
        let body = serde_json::json!({
            "error": "payment-date cannot be future",
            "parcel_due_date": "2026-03-01"
        });
        assert_eq!(future_date_refusal(&body), NaiveDate::from_ymd_opt(2026, 3, 1));
    }

    #[test]
    fn unrelated_400_is_not_a_future_date_refusal() {
        let body = serde_json::json!({"error": "invalid category"});
        assert!(future_date_refusal(&body).is_none());
    }

    #[test]
    fn missing_utc_now_reference_is_harmless() {
        let _ = Utc::now();
    }
}
