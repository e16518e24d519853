//! Typed access to marketplace payment, order, shipment, release-report
//! endpoints (§6). Each call attaches the seller's current access token via
//! the `MarketplaceTokenManager`; payloads are parsed into narrow typed
//! views while the raw JSON is kept by the caller for forensic replay (§9).

use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::token_manager::{MarketplaceTokenManager, TokenError};
use crate::utils::cache::CacheError;

#[derive(Debug, Error)]
pub enum MarketplaceClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("unexpected status {0} from marketplace")]
    UnexpectedStatus(u16),
}

impl From<MarketplaceClientError> for CacheError {
    fn from(e: MarketplaceClientError) -> Self {
        CacheError::Message(e.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargeDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: BigDecimal,
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundEntry {
    pub amount: BigDecimal,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionDetails {
    pub net_received_amount: BigDecimal,
}

/// The marketplace's own release-status field (§4.4 step 2, Scenario G),
/// distinct from `money_release_date`: a payment can have a release date on
/// file before the funds actually clear, so the two are checked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoneyReleaseStatus {
    Pending,
    Released,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentDetail {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    pub date_approved: Option<NaiveDate>,
    pub money_release_date: Option<NaiveDate>,
    #[serde(default)]
    pub money_release_status: Option<MoneyReleaseStatus>,
    pub transaction_amount: BigDecimal,
    pub transaction_details: TransactionDetails,
    #[serde(default)]
    pub charges_details: Vec<ChargeDetail>,
    #[serde(default)]
    pub refunds: Vec<RefundEntry>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub collector_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItem {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OrderItemWrapper {
    item: OrderItem,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderDetail {
    #[serde(default)]
    order_items: Vec<OrderItemWrapper>,
    #[serde(default)]
    pub pack_id: Option<String>,
}

impl OrderDetail {
    pub fn first_item_title(&self) -> Option<&str> {
        self.order_items.first().map(|w| w.item.title.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Sender {
    cost: BigDecimal,
}

#[derive(Debug, Clone, Deserialize)]
struct ShipmentCostsResponse {
    senders: Vec<Sender>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseReportRow {
    pub reference_id: String,
    pub fee_amount: BigDecimal,
}

pub struct MarketplaceClient {
    http: Client,
    base_url: String,
    tokens: Arc<MarketplaceTokenManager>,
}

impl MarketplaceClient {
    pub fn new(http: Client, base_url: String, tokens: Arc<MarketplaceTokenManager>) -> Self {
        Self { http, base_url, tokens }
    }

    async fn authed_get(&self, seller_slug: &str, path: &str) -> Result<reqwest::Response, MarketplaceClientError> {
        let token = self.tokens.get_token(seller_slug).await?;
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(response)
    }

    pub async fn search_payments(
        &self,
        seller_slug: &str,
        range_field: &str,
        begin_date: NaiveDate,
        end_date: NaiveDate,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<PaymentDetail>, MarketplaceClientError> {
        let path = format!(
            "/v1/payments/search?range={range_field}&begin_date={begin_date}&end_date={end_date}&offset={offset}&limit={limit}"
        );
        let response = self.authed_get(seller_slug, &path).await?;
        if !response.status().is_success() {
            return Err(MarketplaceClientError::UnexpectedStatus(response.status().as_u16()));
        }
        #[derive(Deserialize)]
        struct SearchResponse {
            results: Vec<PaymentDetail>,
        }
        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.results)
    }

    pub async fn get_payment(
        &self,
        seller_slug: &str,
        payment_id: &str,
    ) -> Result<PaymentDetail, MarketplaceClientError> {
        let response = self
            .authed_get(seller_slug, &format!("/v1/payments/{payment_id}"))
            .await?;
        if !response.status().is_success() {
            return Err(MarketplaceClientError::UnexpectedStatus(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    pub async fn get_order(
        &self,
        seller_slug: &str,
        order_id: &str,
    ) -> Result<OrderDetail, MarketplaceClientError> {
        let response = self.authed_get(seller_slug, &format!("/orders/{order_id}")).await?;
        if !response.status().is_success() {
            return Err(MarketplaceClientError::UnexpectedStatus(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    /// Fallback shipping-cost source, consulted only when charges_details
    /// has no "shp_" entries (§4.3).
    pub async fn get_shipment_cost(
        &self,
        seller_slug: &str,
        shipment_id: &str,
    ) -> Result<Option<BigDecimal>, MarketplaceClientError> {
        let response = self
            .authed_get(seller_slug, &format!("/shipments/{shipment_id}/costs"))
            .await?;
        if !response.status().is_success() {
            return Err(MarketplaceClientError::UnexpectedStatus(response.status().as_u16()));
        }
        let parsed: ShipmentCostsResponse = response.json().await?;
        Ok(parsed.senders.first().map(|s| s.cost.clone()))
    }

    /// Downloads the payout bank-account statement for a date range (§4.7,
    /// §6 "Bank-statement file format"). Same create-then-fetch handle
    /// pattern as the release report, same provider.
    pub async fn fetch_bank_statement(
        &self,
        seller_slug: &str,
        begin_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<String, MarketplaceClientError> {
        #[derive(Deserialize)]
        struct ReportHandle {
            file: String,
        }
        let token = self.tokens.get_token(seller_slug).await?;
        let create = self
            .http
            .post(format!("{}/v1/account/bank_statement", self.base_url))
            .bearer_auth(&token)
            .json(&serde_json::json!({"begin_date": begin_date, "end_date": end_date}))
            .send()
            .await?;
        if !create.status().is_success() {
            return Err(MarketplaceClientError::UnexpectedStatus(create.status().as_u16()));
        }
        let handle: ReportHandle = create.json().await?;

        let csv_response = self
            .http
            .get(format!("{}/v1/account/bank_statement/{}", self.base_url, handle.file))
            .bearer_auth(&token)
            .send()
            .await?;
        if !csv_response.status().is_success() {
            return Err(MarketplaceClientError::UnexpectedStatus(csv_response.status().as_u16()));
        }
        Ok(csv_response.text().await?)
    }

    /// Requests the authoritative release report and downloads it (§6, §4.8).
    /// Returns the parsed rows; the raw CSV's decimal/date quirks are the
    /// same as the bank-statement format and reuse `utils::decimal`.
    pub async fn fetch_release_report(
        &self,
        seller_slug: &str,
        begin_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<ReleaseReportRow>, MarketplaceClientError> {
        #[derive(Deserialize)]
        struct ReportHandle {
            file: String,
        }
        let token = self.tokens.get_token(seller_slug).await?;
        let create = self
            .http
            .post(format!("{}/v1/account/release_report", self.base_url))
            .bearer_auth(&token)
            .json(&serde_json::json!({"begin_date": begin_date, "end_date": end_date}))
            .send()
            .await?;
        if !create.status().is_success() {
            return Err(MarketplaceClientError::UnexpectedStatus(create.status().as_u16()));
        }
        let handle: ReportHandle = create.json().await?;

        let csv_response = self
            .http
            .get(format!(
                "{}/v1/account/release_report/{}",
                self.base_url, handle.file
            ))
            .bearer_auth(&token)
            .send()
            .await?;
        if !csv_response.status().is_success() {
            return Err(MarketplaceClientError::UnexpectedStatus(csv_response.status().as_u16()));
        }
        let body = csv_response.text().await?;
        Ok(crate::gap_ingester::parse_release_report_rows(&body))
    }
}
