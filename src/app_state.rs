use reqwest::Client;
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};

use crate::config::ReconciliationConfig;
use crate::erp_client::ErpClient;
use crate::job_store::JobStore;
use crate::marketplace_client::MarketplaceClient;
use crate::rate_limiter::RateLimiter;
use crate::token_manager::{ErpTokenManager, MarketplaceTokenManager};
use crate::utils::{cache::Cache, env::EnvVars, telegram::TelegramClient};

pub struct AppState {
    pub http_client: Client,
    pub cache: Cache,
    pub env_vars: EnvVars,
    pub config: ReconciliationConfig,
    pub db_pool: PgPool,
    pub telegram_client: TelegramClient,
    pub rate_limiter: Arc<RateLimiter>,
    pub job_store: Arc<JobStore>,
    pub erp_tokens: Arc<ErpTokenManager>,
    pub marketplace_tokens: Arc<MarketplaceTokenManager>,
    pub erp_client: Arc<ErpClient>,
    pub marketplace_client: Arc<MarketplaceClient>,
}

/// Builder for constructing AppState instances.
///
/// This builder makes it easy to construct AppState for tests by allowing
/// you to specify only the fields you need, with sensible defaults for the rest.
pub struct AppStateBuilder {
    http_client: Option<Client>,
    cache: Option<Cache>,
    env_vars: Option<EnvVars>,
    config: Option<ReconciliationConfig>,
    db_pool: Option<PgPool>,
    telegram_client: Option<TelegramClient>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self {
            http_client: None,
            cache: None,
            env_vars: None,
            config: None,
            db_pool: None,
            telegram_client: None,
        }
    }

    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn env_vars(mut self, env_vars: EnvVars) -> Self {
        self.env_vars = Some(env_vars);
        self
    }

    pub fn config(mut self, config: ReconciliationConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn db_pool(mut self, db_pool: PgPool) -> Self {
        self.db_pool = Some(db_pool);
        self
    }

    pub fn telegram_client(mut self, telegram_client: TelegramClient) -> Self {
        self.telegram_client = Some(telegram_client);
        self
    }

    /// Build the AppState with the configured values or defaults.
    ///
    /// `db_pool` is the only field without a workable default.
    pub fn build(self) -> Result<AppState, Box<dyn std::error::Error>> {
        let env_vars = self.env_vars.unwrap_or_default();
        let config = self.config.unwrap_or_else(|| ReconciliationConfig::from_env(&env_vars));
        let db_pool = self.db_pool.ok_or("db_pool is required")?;
        let http_client = self.http_client.unwrap_or_else(|| {
            Client::builder()
                .timeout(config.http_timeout)
                .build()
                .expect("failed to build reqwest client")
        });

        let rate_limiter = Arc::new(RateLimiter::new(
            config.erp_rate_limiter_capacity,
            config.erp_rate_limiter_refill_per_sec,
        ));
        let job_store = Arc::new(JobStore::new(db_pool.clone()));

        let erp_tokens = Arc::new(ErpTokenManager::new(http_client.clone(), db_pool.clone(), &env_vars));
        let marketplace_tokens = Arc::new(MarketplaceTokenManager::new(
            http_client.clone(),
            db_pool.clone(),
            &env_vars,
        ));

        let erp_client = Arc::new(ErpClient::new(
            http_client.clone(),
            env_vars.erp_api_base_url.clone(),
            erp_tokens.clone(),
            rate_limiter.clone(),
        ));
        let marketplace_client = Arc::new(MarketplaceClient::new(
            http_client.clone(),
            env_vars.marketplace_api_base_url.clone(),
            marketplace_tokens.clone(),
        ));

        Ok(AppState {
            http_client,
            cache: self.cache.unwrap_or_default(),
            telegram_client: self.telegram_client.unwrap_or_default(),
            env_vars,
            config,
            db_pool,
            rate_limiter,
            job_store,
            erp_tokens,
            marketplace_tokens,
            erp_client,
            marketplace_client,
        })
    }
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Initialize the application state with database connection and migrations.
    ///
    /// This is the main entry point for production use. For tests, use
    /// `AppState::builder()` to construct instances with only the required fields.
    pub async fn new() -> Result<AppState, Box<dyn std::error::Error>> {
        let env_vars = EnvVars::default();

        log::info!("Connecting to database...");
        let db_pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&env_vars.database_url)
            .await?;

        log::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        log::info!("Database connection established successfully");

        let telegram_client = TelegramClient::new(
            env_vars.telegram_bot_token.clone(),
            env_vars.telegram_chat_id.clone(),
        );

        AppStateBuilder::new()
            .env_vars(env_vars)
            .db_pool(db_pool)
            .telegram_client(telegram_client)
            .build()
    }
}
