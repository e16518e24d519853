use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_processing_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentProcessingStatus {
    Pending,
    Queued,
    Synced,
    Refunded,
    Skipped,
    SkippedNonSale,
}

impl PaymentProcessingStatus {
    /// §3: terminal states are {synced, refunded, skipped, skipped-non-sale}.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Synced | Self::Refunded | Self::Skipped | Self::SkippedNonSale
        )
    }
}

/// Local record of one marketplace payment. Key: (seller, marketplace_payment_id).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub seller_slug: String,
    pub marketplace_payment_id: String,
    pub marketplace_status: String,
    pub gross_amount: BigDecimal,
    pub net_amount: BigDecimal,
    pub approval_date: Option<NaiveDate>,
    pub release_date: Option<NaiveDate>,
    /// Commission as derived by the Processor (§4.3), persisted for the Fee
    /// Validator (§4.8) to diff against the authoritative release report.
    pub commission_amount: Option<BigDecimal>,
    pub processing_status: PaymentProcessingStatus,
    pub raw_payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
