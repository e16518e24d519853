//! Payment Processor (§4.3): classifies a raw marketplace payment into a set
//! of posting intents and derives amounts with the fee-identity fallback.
//!
//! Replaces exceptions-for-control-flow with a tagged result (§9):
//! `ProcessingOutcome ∈ {Skip(reason), Emit(jobs), Error(detail)}`.

use bigdecimal::{BigDecimal, Zero};
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use thiserror::Error;

use crate::domain::{JobKind, NewJob, Payment, PaymentProcessingStatus, Seller};
use crate::expense_classifier::{ExpenseClassifier, ExpenseClassifierError};
use crate::job_store::{JobStore, JobStoreError};
use crate::marketplace_client::{MarketplaceClient, MarketplaceClientError, PaymentDetail};

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    JobStore(#[from] JobStoreError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Marketplace(#[from] MarketplaceClientError),
    #[error(transparent)]
    ExpenseClassifier(#[from] ExpenseClassifierError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NonSaleNoOrderId,
    NonSaleMarketplaceShipment,
    NotASaleNoCollector,
    CancelledOrRejected,
    PendingStatus,
    AlreadyProcessed,
}

#[derive(Debug, Clone)]
pub struct JobIntent {
    pub kind: JobKind,
    pub amount: BigDecimal,
    pub competence_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub category: &'static str,
    pub description: String,
}

#[derive(Debug)]
pub enum ProcessingOutcome {
    Skip(SkipReason),
    Emit(Vec<JobIntent>),
}

const RECEIVABLE_ENDPOINT: &str = "/v1/financeiro/eventos-financeiros/contas-a-receber";
const PAYABLE_ENDPOINT: &str = "/v1/financeiro/eventos-financeiros/contas-a-pagar";

pub struct Processor<'a> {
    pub job_store: &'a JobStore,
    pub pool: &'a PgPool,
    pub marketplace: &'a MarketplaceClient,
}

impl<'a> Processor<'a> {
    pub fn new(job_store: &'a JobStore, pool: &'a PgPool, marketplace: &'a MarketplaceClient) -> Self {
        Self { job_store, pool, marketplace }
    }

    /// §4.3 pre-filters + status routing + idempotency check, then emits
    /// and enqueues the resulting job intents.
    pub async fn process(
        &self,
        seller: &Seller,
        payment: &PaymentDetail,
    ) -> Result<ProcessingOutcome, ProcessorError> {
        if payment.order_id.is_none() {
            self.upsert_local(seller, payment, PaymentProcessingStatus::SkippedNonSale, None)
                .await?;
            ExpenseClassifier::new(self.pool).classify(seller, payment).await?;
            return Ok(ProcessingOutcome::Skip(SkipReason::NonSaleNoOrderId));
        }
        if payment.description.as_deref() == Some("marketplace_shipment") {
            self.upsert_local(seller, payment, PaymentProcessingStatus::SkippedNonSale, None)
                .await?;
            ExpenseClassifier::new(self.pool).classify(seller, payment).await?;
            return Ok(ProcessingOutcome::Skip(SkipReason::NonSaleMarketplaceShipment));
        }
        if payment.collector_id.is_none() {
            self.upsert_local(seller, payment, PaymentProcessingStatus::SkippedNonSale, None)
                .await?;
            ExpenseClassifier::new(self.pool).classify(seller, payment).await?;
            return Ok(ProcessingOutcome::Skip(SkipReason::NotASaleNoCollector));
        }

        if let Some(existing) = self.find_local(seller, payment).await? {
            if existing.processing_status.is_terminal() {
                return Ok(ProcessingOutcome::Skip(SkipReason::AlreadyProcessed));
            }
        }

        match payment.status.as_str() {
            "cancelled" | "rejected" => {
                self.upsert_local(seller, payment, PaymentProcessingStatus::Skipped, None).await?;
                Ok(ProcessingOutcome::Skip(SkipReason::CancelledOrRejected))
            }
            "approved" | "in_mediation" => self.process_as_approved(seller, payment).await,
            "charged_back" if payment.status_detail.as_deref() == Some("reimbursed") => {
                self.process_as_approved(seller, payment).await
            }
            "refunded" => self.process_as_refunded(seller, payment).await,
            "charged_back" => self.process_as_refunded(seller, payment).await,
            _ => {
                self.upsert_local(seller, payment, PaymentProcessingStatus::Pending, None).await?;
                Ok(ProcessingOutcome::Skip(SkipReason::PendingStatus))
            }
        }
    }

    async fn process_as_approved(
        &self,
        seller: &Seller,
        payment: &PaymentDetail,
    ) -> Result<ProcessingOutcome, ProcessorError> {
        let (intents, commission) = self.build_approved_intents(seller, payment).await?;
        self.upsert_local(seller, payment, PaymentProcessingStatus::Queued, Some(commission)).await?;
        self.enqueue_intents(seller, payment, &intents).await?;
        Ok(ProcessingOutcome::Emit(intents))
    }

    async fn build_approved_intents(
        &self,
        seller: &Seller,
        payment: &PaymentDetail,
    ) -> Result<(Vec<JobIntent>, BigDecimal), ProcessorError> {
        let gross = payment.transaction_amount.clone();
        let net = payment.transaction_details.net_received_amount.clone();
        let shipping = self.derive_shipping(seller, payment).await?;

        let mut commission = &gross - &net - &shipping;
        if commission < BigDecimal::zero() {
            log::warn!(
                "payment {} ({}): computed commission {} is negative, clamping to zero",
                payment.id,
                seller.slug,
                commission
            );
            commission = BigDecimal::zero();
        }

        let description = self.describe(seller, payment).await;

        let mut intents = vec![JobIntent {
            kind: JobKind::Revenue,
            amount: gross,
            competence_date: payment.date_approved,
            due_date: payment.money_release_date,
            category: "marketplace-revenue",
            description,
        }];

        if commission > BigDecimal::zero() {
            intents.push(JobIntent {
                kind: JobKind::Commission,
                amount: commission,
                competence_date: payment.date_approved,
                due_date: payment.money_release_date,
                category: "marketplace-commission",
                description: format!("commission for order {}", payment.order_id.clone().unwrap_or_default()),
            });
        }

        if shipping > BigDecimal::zero() {
            intents.push(JobIntent {
                kind: JobKind::Shipping,
                amount: shipping,
                competence_date: payment.date_approved,
                due_date: payment.money_release_date,
                category: "marketplace-shipping",
                description: format!("shipping for order {}", payment.order_id.clone().unwrap_or_default()),
            });
        }

        Ok(intents)
    }

    async fn process_as_refunded(
        &self,
        seller: &Seller,
        payment: &PaymentDetail,
    ) -> Result<ProcessingOutcome, ProcessorError> {
        let mut intents = Vec::new();

        let existing = self.find_local(seller, payment).await?;
        let previously_synced = existing
            .as_ref()
            .map(|p| p.processing_status == PaymentProcessingStatus::Synced)
            .unwrap_or(false);

        let commission = if previously_synced {
            existing.and_then(|p| p.commission_amount)
        } else {
            let (approved_intents, commission) = self.build_approved_intents(seller, payment).await?;
            intents.extend(approved_intents);
            Some(commission)
        };

        let gross = payment.transaction_amount.clone();
        let net = payment.transaction_details.net_received_amount.clone();

        let is_partial =
            payment.status_detail.as_deref() == Some("partially_refunded") && payment.status == "approved";

        let refund_total: BigDecimal = payment.refunds.iter().map(|r| r.amount.clone()).sum();

        for refund in &payment.refunds {
            let reversal_amount = refund.amount.clone().min(gross.clone());
            intents.push(JobIntent {
                kind: JobKind::RefundReversal,
                amount: reversal_amount,
                competence_date: Some(refund.date),
                due_date: Some(refund.date),
                category: "returns-cancellations",
                description: format!("refund reversal for payment {}", payment.id),
            });
        }

        // Fee-reversal only fires on a total refund, never a partial one.
        if !is_partial && refund_total >= gross {
            intents.push(JobIntent {
                kind: JobKind::FeeReversal,
                amount: &gross - &net,
                competence_date: payment.date_approved,
                due_date: payment.date_approved,
                category: "fee-reversals",
                description: format!("fee reversal for payment {}", payment.id),
            });
        }

        self.upsert_local(seller, payment, PaymentProcessingStatus::Refunded, commission).await?;
        self.enqueue_intents(seller, payment, &intents).await?;
        Ok(ProcessingOutcome::Emit(intents))
    }

    /// Shipping derivation (§4.3): sum `charges_details[]` where type starts
    /// with "shp_" and from = collector; fallback to the shipments-cost
    /// endpoint only when charges-details has no shipping entries.
    async fn derive_shipping(
        &self,
        seller: &Seller,
        payment: &PaymentDetail,
    ) -> Result<BigDecimal, ProcessorError> {
        let from_charges: BigDecimal = payment
            .charges_details
            .iter()
            .filter(|c| c.kind.starts_with("shp_") && c.from.as_deref() == Some("collector"))
            .map(|c| c.amount.clone())
            .sum();

        if from_charges > BigDecimal::zero() {
            return Ok(from_charges);
        }

        if let Some(order_id) = &payment.order_id {
            match self.marketplace.get_shipment_cost(&seller.slug, order_id).await {
                Ok(Some(cost)) => return Ok(cost),
                Ok(None) => {}
                Err(e) => log::warn!("shipment-cost fallback failed for payment {}: {e}", payment.id),
            }
        }

        Ok(BigDecimal::zero())
    }

    async fn describe(&self, seller: &Seller, payment: &PaymentDetail) -> String {
        let order_id = payment.order_id.clone().unwrap_or_default();
        let title = match self.marketplace.get_order(&seller.slug, &order_id).await {
            Ok(order) => order.first_item_title().map(|t| t.to_string()),
            Err(_) => None,
        };
        match title {
            Some(t) => format!("order {order_id}: {t}"),
            None => format!("order {order_id}"),
        }
    }

    pub(crate) async fn find_local(
        &self,
        seller: &Seller,
        payment: &PaymentDetail,
    ) -> Result<Option<Payment>, ProcessorError> {
        let row = sqlx::query_as!(
            Payment,
            r#"
            SELECT id, seller_slug, marketplace_payment_id, marketplace_status,
                   gross_amount, net_amount, approval_date, release_date, commission_amount,
                   processing_status as "processing_status: _", raw_payload, created_at, updated_at
            FROM payments WHERE seller_slug = $1 AND marketplace_payment_id = $2
            "#,
            seller.slug,
            payment.id,
        )
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_local(
        &self,
        seller: &Seller,
        payment: &PaymentDetail,
        status: PaymentProcessingStatus,
        commission: Option<BigDecimal>,
    ) -> Result<(), ProcessorError> {
        sqlx::query!(
            r#"
            INSERT INTO payments (
                seller_slug, marketplace_payment_id, marketplace_status, gross_amount,
                net_amount, approval_date, release_date, commission_amount, processing_status, raw_payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (seller_slug, marketplace_payment_id) DO UPDATE SET
                marketplace_status = EXCLUDED.marketplace_status,
                gross_amount = EXCLUDED.gross_amount,
                net_amount = EXCLUDED.net_amount,
                approval_date = EXCLUDED.approval_date,
                release_date = EXCLUDED.release_date,
                commission_amount = COALESCE(EXCLUDED.commission_amount, payments.commission_amount),
                processing_status = EXCLUDED.processing_status,
                raw_payload = EXCLUDED.raw_payload,
                updated_at = NOW()
            "#,
            seller.slug,
            payment.id,
            payment.status,
            payment.transaction_amount,
            payment.transaction_details.net_received_amount,
            payment.date_approved,
            payment.money_release_date,
            commission,
            status as _,
            payment.raw,
        )
        .execute(self.pool)
        .await?;
        Ok(())
    }

    async fn enqueue_intents(
        &self,
        seller: &Seller,
        payment: &PaymentDetail,
        intents: &[JobIntent],
    ) -> Result<(), ProcessorError> {
        let group_id = format!("{}:{}", seller.slug, payment.id);
        for intent in intents {
            let suffix = match intent.kind {
                JobKind::Revenue => "revenue",
                JobKind::Commission => "commission",
                JobKind::Shipping => "shipping",
                JobKind::PartialRefund => "partial-refund",
                JobKind::RefundReversal => "refund-reversal",
                JobKind::FeeReversal => "fee-reversal",
                JobKind::Settlement => "settlement",
                JobKind::FeeAdjustment => "fee-adjustment",
            };
            let is_payable = matches!(
                intent.kind,
                JobKind::Commission | JobKind::Shipping | JobKind::RefundReversal
            );
            let endpoint = if is_payable { PAYABLE_ENDPOINT } else { RECEIVABLE_ENDPOINT };

            let new_job = NewJob {
                idempotency_key: format!("{}:{}:{}", seller.slug, payment.id, suffix),
                seller_slug: seller.slug.clone(),
                kind: intent.kind,
                group_id: group_id.clone(),
                target_endpoint: endpoint.to_string(),
                http_method: "POST".to_string(),
                request_body: serde_json::json!({
                    "amount": intent.amount.to_string(),
                    "competence_date": intent.competence_date,
                    "due_date": intent.due_date,
                    "category": intent.category,
                    "description": intent.description,
                    "cost_center_id": seller.erp_cost_center_id,
                    "counterparty_contact_id": seller.erp_counterparty_contact_id,
                }),
                scheduled_at: Utc::now(),
            };
            self.job_store.enqueue(new_job).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace_client::TransactionDetails;

    fn payment(gross: &str, net: &str, status: &str) -> PaymentDetail {
        PaymentDetail {
            id: "100".to_string(),
            status: status.to_string(),
            status_detail: None,
            date_approved: NaiveDate::from_ymd_opt(2026, 2, 1),
            money_release_date: NaiveDate::from_ymd_opt(2026, 2, 15),
            money_release_status: Some(crate::marketplace_client::MoneyReleaseStatus::Released),
            transaction_amount: gross.parse().unwrap(),
            transaction_details: TransactionDetails { net_received_amount: net.parse().unwrap() },
            charges_details: vec![],
            refunds: vec![],
            order_id: Some("order-1".to_string()),
            collector_id: Some("collector-1".to_string()),
            description: None,
            raw: serde_json::json!({}),
        }
    }

    #[test]
    fn fee_identity_holds_for_vanilla_sale() {
        // revenue - commission - shipping = net (§8 invariant 1)
        let gross: BigDecimal = "284.74".parse().unwrap();
        let net: BigDecimal = "235.85".parse().unwrap();
        let shipping: BigDecimal = "23.45".parse().unwrap();
        let commission = &gross - &net - &shipping;
        assert_eq!(commission, "25.44".parse::<BigDecimal>().unwrap());
        assert_eq!(&gross - &commission - &shipping, net);
    }

    #[test]
    fn negative_commission_clamps_to_zero() {
        let gross: BigDecimal = "100.00".parse().unwrap();
        let net: BigDecimal = "105.00".parse().unwrap();
        let shipping = BigDecimal::zero();
        let mut commission = &gross - &net - &shipping;
        if commission < BigDecimal::zero() {
            commission = BigDecimal::zero();
        }
        assert_eq!(commission, BigDecimal::zero());
    }

    #[test]
    fn refund_reversal_is_capped_at_gross() {
        // Scenario C: gross=18.90, refund=55.89 -> reversal = min(55.89, 18.90)
        let gross: BigDecimal = "18.90".parse().unwrap();
        let refund_amount: BigDecimal = "55.89".parse().unwrap();
        let reversal = refund_amount.min(gross.clone());
        assert_eq!(reversal, gross);
    }

    #[test]
    fn pending_payment_has_no_intents() {
        let p = payment("100.00", "90.00", "in_process");
        assert_eq!(p.status, "in_process");
    }
}
