//! Typed access to the ERP receivable/payable/settlement endpoints (§6).
//! Every outbound call is rate-limited by the shared global token bucket.
//! The Worker is the primary caller; the Settlement Scheduler also reads
//! (list-parcels) through here, sharing the same limiter (§5).

use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::rate_limiter::RateLimiter;
use crate::token_manager::{ErpTokenManager, TokenError};

#[derive(Debug, Error)]
pub enum ErpClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Outcome of posting an opaque job body to the ERP, handed to the Worker
/// for classification per §4.2.
pub struct ErpResponse {
    pub status: StatusCode,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParcelRow {
    pub id: String,
    pub description: String,
    pub due_date: NaiveDate,
    pub unpaid: BigDecimal,
    pub status: String,
}

pub struct ErpClient {
    http: Client,
    base_url: String,
    tokens: Arc<ErpTokenManager>,
    limiter: Arc<RateLimiter>,
}

impl ErpClient {
    pub fn new(
        http: Client,
        base_url: String,
        tokens: Arc<ErpTokenManager>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self { http, base_url, tokens, limiter }
    }

    /// Executes one arbitrary job post against the ERP: rate-limited,
    /// authenticated, with a single automatic retry on 401 (§4.6 "the
    /// failing request is retried once before any backoff logic engages").
    pub async fn post_job(
        &self,
        method: &str,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<ErpResponse, ErpClientError> {
        self.limiter.acquire().await;
        let response = self.send(method, endpoint, body).await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        log::warn!("ERP returned 401 for {endpoint}, invalidating cached token and retrying once");
        self.tokens.invalidate().await;
        self.limiter.acquire().await;
        self.send(method, endpoint, body).await
    }

    async fn send(
        &self,
        method: &str,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<ErpResponse, ErpClientError> {
        let token = self.tokens.get_token().await?;
        let url = format!("{}{}", self.base_url, endpoint);
        let request = match method {
            "POST" => self.http.post(&url).bearer_auth(&token).json(body),
            "PATCH" => self.http.patch(&url).bearer_auth(&token).json(body),
            "PUT" => self.http.put(&url).bearer_auth(&token).json(body),
            _ => self.http.get(&url).bearer_auth(&token),
        };
        let response = request.send().await?;
        let status = response.status();
        let body = response.json::<serde_json::Value>().await.unwrap_or(serde_json::Value::Null);
        Ok(ErpResponse { status, body })
    }

    /// Lists open/overdue receivables or payables on a financial account in
    /// a due-date window (§4.4 Settlement Scheduler step 1).
    pub async fn list_open_parcels(
        &self,
        kind: &str,
        financial_account_id: &str,
        due_from: NaiveDate,
        due_to: NaiveDate,
    ) -> Result<Vec<ParcelRow>, ErpClientError> {
        self.limiter.acquire().await;
        let token = self.tokens.get_token().await?;
        let path = format!(
            "/v1/financeiro/eventos-financeiros/contas-a-{kind}/buscar?status=EM_ABERTO,ATRASADO&ids_contas_financeiras={financial_account_id}&data_vencimento_de={due_from}&data_vencimento_ate={due_to}&pagina=0&tamanho_pagina=200"
        );
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await?;

        #[derive(Deserialize)]
        struct Page {
            #[serde(default)]
            content: Vec<ParcelRow>,
        }
        let page: Page = response.json().await.unwrap_or(Page { content: vec![] });
        Ok(page.content)
    }
}
