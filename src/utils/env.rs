//! Process-wide environment configuration, loaded once at boot.

#[derive(Clone, Debug)]
pub struct EnvVars {
    pub database_url: String,

    // ERP (downstream double-entry ledger)
    pub erp_api_base_url: String,
    pub erp_client_id: String,
    pub erp_client_secret: String,
    pub erp_oauth_token_url: String,

    // Marketplace (upstream payments provider)
    pub marketplace_api_base_url: String,
    pub marketplace_oauth_token_url: String,

    // Operational tuning (see src/config/mod.rs for the typed view of these)
    pub erp_rate_limiter_capacity: u32,
    pub erp_rate_limiter_refill_per_sec: u32,
    pub http_timeout_secs: u64,
    pub marketplace_concurrency: usize,
    pub fee_validation_tolerance_cents: i64,
    pub settlement_lookback_days: i64,
    pub settlement_daily_hour_local: u32,
    pub worker_shutdown_grace_secs: u64,

    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub cors_allowed_origins: Vec<String>,

    pub admin_account_id: String,
    pub admin_password: String,

    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Default for EnvVars {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL is not set"),

            erp_api_base_url: std::env::var("ERP_API_BASE_URL")
                .unwrap_or_else(|_| "https://erp.example.com".to_string()),
            erp_client_id: std::env::var("ERP_CLIENT_ID").unwrap_or_default(),
            erp_client_secret: std::env::var("ERP_CLIENT_SECRET").unwrap_or_default(),
            erp_oauth_token_url: std::env::var("ERP_OAUTH_TOKEN_URL")
                .unwrap_or_else(|_| "https://erp.example.com/oauth/token".to_string()),

            marketplace_api_base_url: std::env::var("MARKETPLACE_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.mercadolibre.com".to_string()),
            marketplace_oauth_token_url: std::env::var("MARKETPLACE_OAUTH_TOKEN_URL")
                .unwrap_or_else(|_| "https://api.mercadolibre.com/oauth/token".to_string()),

            erp_rate_limiter_capacity: std::env::var("ERP_RATE_LIMITER_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(9),
            erp_rate_limiter_refill_per_sec: std::env::var("ERP_RATE_LIMITER_REFILL_PER_SEC")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(9),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            marketplace_concurrency: std::env::var("MARKETPLACE_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            fee_validation_tolerance_cents: std::env::var("FEE_VALIDATION_TOLERANCE_CENTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            settlement_lookback_days: std::env::var("SETTLEMENT_LOOKBACK_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(90),
            settlement_daily_hour_local: std::env::var("SETTLEMENT_DAILY_HOUR_LOCAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            worker_shutdown_grace_secs: std::env::var("WORKER_SHUTDOWN_GRACE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            jwt_secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string()),
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(24),
            cors_allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3001".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            admin_account_id: std::env::var("ADMIN_ACCOUNT_ID")
                .unwrap_or_else(|_| "ops".to_string()),
            admin_password: std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "dev-password".to_string()),

            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}
