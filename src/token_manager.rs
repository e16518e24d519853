//! Credential lifecycle (§4.6, §9 "Global ERP token as module-level state").
//!
//! The ERP token is a single shared cell: init from a persisted row, refresh
//! on 401, persist on refresh, read lock-free via an in-memory cache in front
//! of the DB. Marketplace tokens are per-seller and refreshed under a
//! per-seller mutex so a single-use refresh token is never raced.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::utils::env::EnvVars;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("oauth exchange failed: {0}")]
    Oauth(String),
    #[error("seller {0} has no marketplace refresh token on file")]
    MissingRefreshToken(String),
}

#[derive(Debug, serde::Deserialize)]
struct OauthTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Process-wide ERP OAuth token, persisted to `erp_token_cache` so restarts
/// don't need to re-authenticate against a cold cache.
pub struct ErpTokenManager {
    http: Client,
    pool: PgPool,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl ErpTokenManager {
    pub fn new(http: Client, pool: PgPool, env: &EnvVars) -> Self {
        Self {
            http,
            pool,
            token_url: env.erp_oauth_token_url.clone(),
            client_id: env.erp_client_id.clone(),
            client_secret: env.erp_client_secret.clone(),
            cached: Mutex::new(None),
        }
    }

    /// Returns a valid access token, refreshing if missing, expired, or
    /// explicitly invalidated by the caller (401 handling in the Worker).
    pub async fn get_token(&self) -> Result<String, TokenError> {
        {
            let cached = self.cached.lock().await;
            if let Some((token, expires_at)) = cached.as_ref() {
                if *expires_at > Utc::now() + Duration::seconds(5) {
                    return Ok(token.clone());
                }
            }
        }

        if let Some((token, expires_at)) = self.load_persisted().await? {
            if expires_at > Utc::now() + Duration::seconds(5) {
                *self.cached.lock().await = Some((token.clone(), expires_at));
                return Ok(token);
            }
        }

        self.refresh().await
    }

    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    pub async fn refresh(&self) -> Result<String, TokenError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .send()
            .await
            .map_err(|e| TokenError::Oauth(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TokenError::Oauth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: OauthTokenResponse = response
            .json()
            .await
            .map_err(|e| TokenError::Oauth(e.to_string()))?;
        let expires_at = Utc::now() + Duration::seconds(body.expires_in);

        self.persist(&body.access_token, expires_at).await?;
        *self.cached.lock().await = Some((body.access_token.clone(), expires_at));

        log::info!("ERP token refreshed, expires at {}", expires_at);
        Ok(body.access_token)
    }

    async fn load_persisted(&self) -> Result<Option<(String, DateTime<Utc>)>, TokenError> {
        let row = sqlx::query!(r#"SELECT access_token, expires_at FROM erp_token_cache WHERE id = 1"#)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| (r.access_token, r.expires_at)))
    }

    async fn persist(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), TokenError> {
        sqlx::query!(
            r#"
            INSERT INTO erp_token_cache (id, access_token, expires_at) VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE SET access_token = $1, expires_at = $2
            "#,
            token,
            expires_at,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Per-seller marketplace access/refresh token pair, refreshed when expiry
/// is within 60s. Concurrent refreshers for the same seller are serialized
/// via a per-seller mutex (§4.6, §9 "per-seller credential refresh race").
pub struct MarketplaceTokenManager {
    http: Client,
    pool: PgPool,
    token_url: String,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MarketplaceTokenManager {
    pub fn new(http: Client, pool: PgPool, env: &EnvVars) -> Self {
        Self {
            http,
            pool,
            token_url: env.marketplace_oauth_token_url.clone(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, seller_slug: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(seller_slug.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Returns a valid access token for the seller, refreshing under the
    /// seller's lock if within 60s of expiry or already expired.
    pub async fn get_token(&self, seller_slug: &str) -> Result<String, TokenError> {
        let lock = self.lock_for(seller_slug).await;
        let _guard = lock.lock().await;

        let row = sqlx::query!(
            r#"SELECT marketplace_access_token, marketplace_refresh_token, marketplace_token_expires_at
               FROM sellers WHERE slug = $1"#,
            seller_slug
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(TokenError::MissingRefreshToken(seller_slug.to_string()));
        };

        let needs_refresh = match (&row.marketplace_access_token, row.marketplace_token_expires_at) {
            (Some(_), Some(expires_at)) => expires_at <= Utc::now() + Duration::seconds(60),
            _ => true,
        };

        if !needs_refresh {
            return Ok(row.marketplace_access_token.unwrap());
        }

        let Some(refresh_token) = row.marketplace_refresh_token else {
            return Err(TokenError::MissingRefreshToken(seller_slug.to_string()));
        };

        self.exchange_refresh_token(seller_slug, &refresh_token).await
    }

    async fn exchange_refresh_token(
        &self,
        seller_slug: &str,
        refresh_token: &str,
    ) -> Result<String, TokenError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await
            .map_err(|e| TokenError::Oauth(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TokenError::Oauth(format!(
                "refresh for seller {} returned {}",
                seller_slug,
                response.status()
            )));
        }

        let body: OauthTokenResponse = response
            .json()
            .await
            .map_err(|e| TokenError::Oauth(e.to_string()))?;
        let expires_at = Utc::now() + Duration::seconds(body.expires_in);
        let next_refresh_token = body.refresh_token.unwrap_or_else(|| refresh_token.to_string());

        sqlx::query!(
            r#"
            UPDATE sellers
            SET marketplace_access_token = $2, marketplace_refresh_token = $3,
                marketplace_token_expires_at = $4, updated_at = NOW()
            WHERE slug = $1
            "#,
            seller_slug,
            body.access_token,
            next_refresh_token,
            expires_at,
        )
        .execute(&self.pool)
        .await?;

        Ok(body.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn per_seller_locks_are_distinct() {
        let http = Client::new();
        let pool = sqlx::postgres::PgPoolOptions::new().connect_lazy("postgres://localhost/nonexistent").unwrap();
        let env = EnvVars {
            database_url: "postgres://localhost/nonexistent".into(),
            erp_api_base_url: String::new(),
            erp_client_id: String::new(),
            erp_client_secret: String::new(),
            erp_oauth_token_url: String::new(),
            marketplace_api_base_url: String::new(),
            marketplace_oauth_token_url: String::new(),
            erp_rate_limiter_capacity: 9,
            erp_rate_limiter_refill_per_sec: 9,
            http_timeout_secs: 30,
            marketplace_concurrency: 10,
            fee_validation_tolerance_cents: 1,
            settlement_lookback_days: 90,
            settlement_daily_hour_local: 10,
            worker_shutdown_grace_secs: 10,
            jwt_secret: "secret".into(),
            jwt_expiry_hours: 24,
            cors_allowed_origins: vec![],
            admin_account_id: "ops".into(),
            admin_password: "test".into(),
            telegram_bot_token: None,
            telegram_chat_id: None,
        };
        let manager = MarketplaceTokenManager::new(http, pool, &env);

        let a = manager.lock_for("seller-a").await;
        let b = manager.lock_for("seller-b").await;
        let a2 = manager.lock_for("seller-a").await;

        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &a2));
    }
}
