use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "expense_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExpenseSource {
    MarketplaceApi,
    BankStatement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "expense_direction", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExpenseDirection {
    Expense,
    Income,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "expense_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    PendingReview,
    AutoCategorized,
    ManuallyCategorized,
    Exported,
    Imported,
}

/// Non-order payment or bank-statement gap line, exported to ERP via XLSX.
/// Key: (seller, payment_id).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub seller_slug: String,
    pub payment_id: String,
    pub source: ExpenseSource,
    pub expense_type: String,
    pub direction: ExpenseDirection,
    pub amount: BigDecimal,
    pub occurred_on: NaiveDate,
    pub description: Option<String>,
    pub beneficiary: Option<String>,
    pub suggested_category: Option<String>,
    pub status: ExpenseStatus,
    pub batch_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row snapshotted into an export run, so edits to the source Expense
/// after export don't change what was already written to the XLSX file.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExpenseBatchItem {
    pub id: i64,
    pub batch_id: i64,
    pub expense_id: i64,
    pub row_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One XLSX export run.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExpenseBatch {
    pub id: i64,
    pub seller_slug: String,
    pub status: String,
    pub row_count: i32,
    pub total_amount: BigDecimal,
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub exported_at: Option<DateTime<Utc>>,
    pub imported_at: Option<DateTime<Utc>>,
}
