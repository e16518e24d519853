//! Durable Job Store (§4.2): a persistent, idempotent, priority-ordered,
//! group-tracked table of ERP work items. This is the single shared mutable
//! state between the Worker, Processor, Settlement Scheduler and Orchestrator
//! — all access goes through these atomic operations.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use thiserror::Error;

use crate::config::{DEFAULT_MAX_ATTEMPTS, RETRYABLE_BACKOFF_SECS, STALE_CLAIM_TIMEOUT};
use crate::domain::{Job, JobStatus, NewJob, PaymentProcessingStatus};

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct JobStore {
    pool: PgPool,
}

/// Exponential backoff ladder for transient-remote failures (§4.2): 30s,
/// 120s, 480s by attempt count.
pub fn backoff_for_attempt(attempts: i32) -> ChronoDuration {
    let idx = (attempts.max(1) as usize - 1).min(RETRYABLE_BACKOFF_SECS.len() - 1);
    ChronoDuration::seconds(RETRYABLE_BACKOFF_SECS[idx] as i64)
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a job; if `idempotency_key` already exists, returns the
    /// existing record unchanged (§3 Job invariant, §8 invariant 2).
    pub async fn enqueue(&self, new_job: NewJob) -> Result<Job, JobStoreError> {
        if let Some(existing) = self.find_by_key(&new_job.idempotency_key).await? {
            return Ok(existing);
        }

        let priority = new_job.priority();
        let job = sqlx::query_as!(
            Job,
            r#"
            INSERT INTO jobs (
                idempotency_key, seller_slug, kind, target_endpoint, http_method,
                request_body, group_id, priority, max_attempts, scheduled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (idempotency_key) DO UPDATE SET idempotency_key = jobs.idempotency_key
            RETURNING
                id, idempotency_key, seller_slug,
                kind as "kind: _", target_endpoint, http_method, request_body,
                group_id, priority, status as "status: _", attempts, max_attempts,
                scheduled_at, claimed_at, erp_response_status, erp_response_body,
                erp_receipt, last_error, created_at, updated_at
            "#,
            new_job.idempotency_key,
            new_job.seller_slug,
            new_job.kind as _,
            new_job.target_endpoint,
            new_job.http_method,
            new_job.request_body,
            new_job.group_id,
            priority,
            DEFAULT_MAX_ATTEMPTS,
            new_job.scheduled_at,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(job)
    }

    pub async fn find_by_key(&self, key: &str) -> Result<Option<Job>, JobStoreError> {
        let job = sqlx::query_as!(
            Job,
            r#"
            SELECT
                id, idempotency_key, seller_slug,
                kind as "kind: _", target_endpoint, http_method, request_body,
                group_id, priority, status as "status: _", attempts, max_attempts,
                scheduled_at, claimed_at, erp_response_status, erp_response_body,
                erp_receipt, last_error, created_at, updated_at
            FROM jobs WHERE idempotency_key = $1
            "#,
            key
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    /// Atomically selects the lowest-priority, oldest-created eligible job,
    /// marks it `processing`, and returns it. `SELECT ... FOR UPDATE SKIP
    /// LOCKED` lets multiple worker instances race safely without blocking
    /// each other on in-flight rows.
    pub async fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let mut tx = self.pool.begin().await?;

        let candidate = sqlx::query!(
            r#"
            SELECT id FROM jobs
            WHERE status IN ('pending', 'failed') AND scheduled_at <= NOW()
            ORDER BY priority ASC, created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(candidate) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let job = sqlx::query_as!(
            Job,
            r#"
            UPDATE jobs SET status = 'processing', claimed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING
                id, idempotency_key, seller_slug,
                kind as "kind: _", target_endpoint, http_method, request_body,
                group_id, priority, status as "status: _", attempts, max_attempts,
                scheduled_at, claimed_at, erp_response_status, erp_response_body,
                erp_receipt, last_error, created_at, updated_at
            "#,
            candidate.id
        )
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(job))
    }

    /// Marks a job completed. If it's the last non-completed job in its
    /// group, the originating Payment is marked `synced` (§4.2, §8 invariant 3).
    pub async fn complete(
        &self,
        job_id: i64,
        erp_status: i32,
        erp_body: serde_json::Value,
        receipt: Option<String>,
    ) -> Result<(), JobStoreError> {
        let mut tx = self.pool.begin().await?;

        let group_id = sqlx::query_scalar!(
            r#"
            UPDATE jobs
            SET status = 'completed', erp_response_status = $2, erp_response_body = $3,
                erp_receipt = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING group_id
            "#,
            job_id,
            erp_status,
            erp_body,
            receipt,
        )
        .fetch_one(&mut *tx)
        .await?;

        let remaining = sqlx::query_scalar!(
            r#"SELECT COUNT(*) FROM jobs WHERE group_id = $1 AND status <> 'completed'"#,
            group_id
        )
        .fetch_one(&mut *tx)
        .await?
        .unwrap_or(0);

        if remaining == 0 {
            // group_id convention: "{seller}:{payment-id}" (§3 Job key)
            if let Some((seller_slug, marketplace_payment_id)) = group_id.split_once(':') {
                sqlx::query!(
                    r#"
                    UPDATE payments SET processing_status = $3, updated_at = NOW()
                    WHERE seller_slug = $1 AND marketplace_payment_id = $2
                      AND processing_status NOT IN ('refunded', 'skipped', 'skipped_non_sale')
                    "#,
                    seller_slug,
                    marketplace_payment_id,
                    PaymentProcessingStatus::Synced as _,
                )
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// attempts < max: reschedule with backoff. attempts >= max: dead-letter.
    pub async fn fail(
        &self,
        job_id: i64,
        error: &str,
        erp_status: Option<i32>,
        erp_body: Option<serde_json::Value>,
    ) -> Result<JobStatus, JobStoreError> {
        let row = sqlx::query!(
            r#"SELECT attempts, max_attempts FROM jobs WHERE id = $1"#,
            job_id
        )
        .fetch_one(&self.pool)
        .await?;

        let attempts = row.attempts + 1;
        let dead = attempts >= row.max_attempts;
        let next_status: JobStatus = if dead { JobStatus::Dead } else { JobStatus::Failed };
        let scheduled_at = Utc::now() + backoff_for_attempt(attempts);

        sqlx::query!(
            r#"
            UPDATE jobs
            SET status = $2, attempts = $3, scheduled_at = $4, last_error = $5,
                erp_response_status = $6, erp_response_body = $7, updated_at = NOW()
            WHERE id = $1
            "#,
            job_id,
            next_status as _,
            attempts,
            scheduled_at,
            error,
            erp_status,
            erp_body,
        )
        .execute(&self.pool)
        .await?;

        Ok(next_status)
    }

    /// Dead-letters a job immediately, bypassing the retry ladder — used for
    /// permanent 4xx rejections from the ERP (§7, §4.2) where retrying would
    /// never succeed.
    pub async fn fail_permanent(
        &self,
        job_id: i64,
        error: &str,
        erp_status: Option<i32>,
        erp_body: Option<serde_json::Value>,
    ) -> Result<(), JobStoreError> {
        sqlx::query!(
            r#"
            UPDATE jobs
            SET status = 'dead', attempts = attempts + 1, last_error = $2,
                erp_response_status = $3, erp_response_body = $4, updated_at = NOW()
            WHERE id = $1
            "#,
            job_id,
            error,
            erp_status,
            erp_body,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fails a job without incrementing attempts and with a short jitter —
    /// used for the 401-refresh-then-retry path (§4.2) so the token refresh
    /// isn't charged against the job's retry budget.
    pub async fn fail_for_retry_soon(&self, job_id: i64, error: &str) -> Result<(), JobStoreError> {
        let jitter = ChronoDuration::milliseconds(200 + (job_id % 800));
        sqlx::query!(
            r#"
            UPDATE jobs
            SET status = 'failed', scheduled_at = $2, last_error = $3, updated_at = NOW()
            WHERE id = $1
            "#,
            job_id,
            Utc::now() + jitter,
            error,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reschedules a settlement job to the parcel's actual due date, without
    /// burning a retry attempt (§8 invariant 10: future-date refusal).
    pub async fn reschedule_to(&self, job_id: i64, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        sqlx::query!(
            r#"UPDATE jobs SET status = 'failed', scheduled_at = $2, updated_at = NOW() WHERE id = $1"#,
            job_id,
            at,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Runs once at boot: any stale `processing` claim (no update in the
    /// last `STALE_CLAIM_TIMEOUT`) is reset to `failed` (§3, §4.2).
    pub async fn reset_stale(&self) -> Result<u64, JobStoreError> {
        let cutoff = Utc::now() - ChronoDuration::from_std(STALE_CLAIM_TIMEOUT).unwrap();
        let result = sqlx::query!(
            r#"
            UPDATE jobs SET status = 'failed', scheduled_at = NOW(), updated_at = NOW()
            WHERE status = 'processing' AND updated_at < $1
            "#,
            cutoff
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn requeue(&self, job_id: i64) -> Result<Option<Job>, JobStoreError> {
        let job = sqlx::query_as!(
            Job,
            r#"
            UPDATE jobs SET status = 'pending', attempts = 0, scheduled_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING
                id, idempotency_key, seller_slug,
                kind as "kind: _", target_endpoint, http_method, request_body,
                group_id, priority, status as "status: _", attempts, max_attempts,
                scheduled_at, claimed_at, erp_response_status, erp_response_body,
                erp_receipt, last_error, created_at, updated_at
            "#,
            job_id
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    pub async fn requeue_all_dead(&self) -> Result<u64, JobStoreError> {
        let result = sqlx::query!(
            r#"UPDATE jobs SET status = 'pending', attempts = 0, scheduled_at = NOW(), updated_at = NOW()
               WHERE status = 'dead'"#
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_by_status(
        &self,
        status: JobStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = sqlx::query_as!(
            Job,
            r#"
            SELECT
                id, idempotency_key, seller_slug,
                kind as "kind: _", target_endpoint, http_method, request_body,
                group_id, priority, status as "status: _", attempts, max_attempts,
                scheduled_at, claimed_at, erp_response_status, erp_response_body,
                erp_receipt, last_error, created_at, updated_at
            FROM jobs WHERE status = $1
            ORDER BY updated_at DESC
            LIMIT $2 OFFSET $3
            "#,
            status as _,
            limit,
            offset,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    /// True if every job in `group_id` is `completed` (§8 invariant 3,
    /// used by tests and the financial-closing attestation).
    pub async fn group_fully_completed(&self, group_id: &str) -> Result<bool, JobStoreError> {
        let open = sqlx::query_scalar!(
            r#"SELECT COUNT(*) FROM jobs WHERE group_id = $1 AND status <> 'completed'"#,
            group_id
        )
        .fetch_one(&self.pool)
        .await?
        .unwrap_or(0);
        Ok(open == 0)
    }

    /// Aggregate counts grouped by status, for the queue status dashboard.
    pub async fn counts_by_status(&self) -> Result<Vec<(JobStatus, i64)>, JobStoreError> {
        let rows = sqlx::query!(
            r#"SELECT status as "status: JobStatus", COUNT(*) as "count!" FROM jobs GROUP BY status"#
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| (r.status, r.count)).collect())
    }

    pub async fn any_dead_in_groups(&self, group_ids: &[String]) -> Result<bool, JobStoreError> {
        let count = sqlx::query_scalar!(
            r#"SELECT COUNT(*) FROM jobs WHERE group_id = ANY($1) AND status = 'dead'"#,
            group_ids
        )
        .fetch_one(&self.pool)
        .await?
        .unwrap_or(0);
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobKind;

    fn sample_job(key: &str) -> NewJob {
        NewJob {
            idempotency_key: key.to_string(),
            seller_slug: "acme".to_string(),
            kind: JobKind::Revenue,
            group_id: "acme:100".to_string(),
            target_endpoint: "/v1/financeiro/eventos-financeiros/contas-a-receber".to_string(),
            http_method: "POST".to_string(),
            request_body: serde_json::json!({"amount": "284.74"}),
            scheduled_at: Utc::now(),
        }
    }

    async fn seed_seller(pool: &PgPool, slug: &str) {
        sqlx::query!(
            r#"INSERT INTO sellers (slug, marketplace_user_id) VALUES ($1, $2)"#,
            slug,
            format!("user-{slug}")
        )
        .execute(pool)
        .await
        .unwrap();
    }

    #[sqlx::test]
    async fn enqueue_is_idempotent(pool: PgPool) {
        seed_seller(&pool, "acme").await;
        let store = JobStore::new(pool);

        let first = store.enqueue(sample_job("acme:100:revenue")).await.unwrap();
        let second = store.enqueue(sample_job("acme:100:revenue")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.request_body, second.request_body);
    }

    #[sqlx::test]
    async fn claim_next_respects_priority(pool: PgPool) {
        seed_seller(&pool, "acme").await;
        let store = JobStore::new(pool);

        let mut settlement = sample_job("acme:100:settlement");
        settlement.kind = JobKind::Settlement;
        store.enqueue(settlement).await.unwrap();

        let revenue = sample_job("acme:100:revenue");
        store.enqueue(revenue).await.unwrap();

        let claimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.kind, JobKind::Revenue);
        assert_eq!(claimed.status, JobStatus::Processing);
    }

    #[sqlx::test]
    async fn fail_dead_letters_after_max_attempts(pool: PgPool) {
        seed_seller(&pool, "acme").await;
        let store = JobStore::new(pool);
        let job = store.enqueue(sample_job("acme:100:revenue")).await.unwrap();

        store.fail(job.id, "boom", Some(500), None).await.unwrap();
        store.fail(job.id, "boom", Some(500), None).await.unwrap();
        let status = store.fail(job.id, "boom", Some(500), None).await.unwrap();

        assert_eq!(status, JobStatus::Dead);
    }

    #[sqlx::test]
    async fn complete_marks_payment_synced_when_group_drains(pool: PgPool) {
        seed_seller(&pool, "acme").await;
        sqlx::query!(
            r#"INSERT INTO payments (seller_slug, marketplace_payment_id, marketplace_status, gross_amount, net_amount)
               VALUES ('acme', '100', 'approved', 284.74, 235.85)"#
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = JobStore::new(pool);
        let job = store.enqueue(sample_job("acme:100:revenue")).await.unwrap();
        store.claim_next().await.unwrap();
        store
            .complete(job.id, 201, serde_json::json!({}), Some("rcpt-1".into()))
            .await
            .unwrap();

        assert!(store.group_fully_completed("acme:100").await.unwrap());
    }

    #[sqlx::test]
    async fn reset_stale_requeues_abandoned_claims(pool: PgPool) {
        seed_seller(&pool, "acme").await;
        let store = JobStore::new(pool);
        let job = store.enqueue(sample_job("acme:100:revenue")).await.unwrap();
        store.claim_next().await.unwrap();

        sqlx::query!(
            r#"UPDATE jobs SET updated_at = NOW() - INTERVAL '10 minutes' WHERE id = $1"#,
            job.id
        )
        .execute(store.pool())
        .await
        .unwrap();

        let reset = store.reset_stale().await.unwrap();
        assert_eq!(reset, 1);
    }
}

#[cfg(test)]
impl JobStore {
    fn pool(&self) -> &PgPool {
        &self.pool
    }
}
