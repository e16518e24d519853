//! Expense Classifier (§2): classifies non-order marketplace payments — the
//! ones the Processor pre-filters out as not sales — into Expense records so
//! they still reach the XLSX export lane instead of being silently dropped.

use bigdecimal::{BigDecimal, Zero};
use sqlx::PgPool;
use thiserror::Error;

use crate::domain::{ExpenseDirection, ExpenseSource, ExpenseStatus, Seller};
use crate::marketplace_client::PaymentDetail;

#[derive(Debug, Error)]
pub enum ExpenseClassifierError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Coarse rule table over payment descriptions, mirroring the gap ingester's
/// ordered-table-as-data approach (§9) at a smaller scale: API-observed
/// non-order payments are fewer and better-typed than bank-statement text.
const RULES: &[(&str, &str, ExpenseDirection, bool)] = &[
    ("marketplace_shipment", "debito-envio-ml", ExpenseDirection::Expense, true),
    ("ad_credit", "credito-ads", ExpenseDirection::Income, true),
    ("bill_payment", "pagamento-conta", ExpenseDirection::Expense, false),
    ("transfer", "transferencia", ExpenseDirection::Transfer, false),
];

pub struct ExpenseClassifier<'a> {
    pool: &'a PgPool,
}

impl<'a> ExpenseClassifier<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn classify(
        &self,
        seller: &Seller,
        payment: &PaymentDetail,
    ) -> Result<(), ExpenseClassifierError> {
        let description = payment.description.as_deref().unwrap_or("");
        let (expense_type, direction, auto) = RULES
            .iter()
            .find(|(pattern, ..)| description.eq_ignore_ascii_case(pattern))
            .map(|(_, t, d, a)| (*t, *d, *a))
            .unwrap_or(("non-order-payment", ExpenseDirection::Expense, false));

        let status = if auto {
            ExpenseStatus::AutoCategorized
        } else {
            ExpenseStatus::PendingReview
        };

        let amount: BigDecimal = if payment.transaction_amount == BigDecimal::zero() {
            payment.transaction_details.net_received_amount.clone()
        } else {
            payment.transaction_amount.clone()
        };

        sqlx::query!(
            r#"
            INSERT INTO expenses (
                seller_slug, payment_id, source, expense_type, direction,
                amount, occurred_on, description, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (seller_slug, payment_id) DO NOTHING
            "#,
            seller.slug,
            payment.id,
            ExpenseSource::MarketplaceApi as _,
            expense_type,
            direction as _,
            amount,
            payment.date_approved.unwrap_or_else(|| chrono::Utc::now().date_naive()),
            payment.description,
            status as _,
        )
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_description_auto_categorizes() {
        let (_, _, auto) = RULES
            .iter()
            .find(|(p, ..)| p.eq_ignore_ascii_case("marketplace_shipment"))
            .map(|(_, t, d, a)| (*t, *d, *a))
            .unwrap();
        assert!(auto);
    }

    #[test]
    fn unknown_description_needs_manual_review() {
        let found = RULES.iter().find(|(p, ..)| p.eq_ignore_ascii_case("something_weird"));
        assert!(found.is_none());
    }
}
