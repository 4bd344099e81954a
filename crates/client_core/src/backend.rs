use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use flashloan_shared::{
    domain::Address,
    error::ErrorBody,
    protocol::{
        BatchRecord, ExecuteBatchRequest, ExecuteBatchResponse, Quote, QuoteRequest,
        RiskAssessment, RiskAssessmentRequest, UserBatchesResponse,
    },
};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;
use url::Url;

use crate::{config::ClientSettings, error::BackendError};

const RISK_PATH: &str = "api/flashloans/multi/risk";
const QUOTE_PATH: &str = "api/flashloans/multi/quote";
const EXECUTE_PATH: &str = "api/flashloans/multi";
const USER_BATCHES_PATH: &str = "api/flashloans/multi/user";

const RISK_FALLBACK: &str = "Failed to assess risk";
const QUOTE_FALLBACK: &str = "Failed to get quote";
const EXECUTE_FALLBACK: &str = "Failed to execute batch";
const HISTORY_FALLBACK: &str = "Failed to fetch batch history";

/// Remote pricing, risk and execution service for multi-recipient flash loans.
#[async_trait]
pub trait FlashLoanBackend: Send + Sync {
    async fn assess_risk(
        &self,
        request: &RiskAssessmentRequest,
    ) -> Result<RiskAssessment, BackendError>;
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, BackendError>;
    async fn execute(
        &self,
        request: &ExecuteBatchRequest,
    ) -> Result<ExecuteBatchResponse, BackendError>;
    async fn user_batches(&self, user: Address) -> Result<Vec<BatchRecord>, BackendError>;
}

pub struct HttpFlashLoanBackend {
    http: Client,
    base_url: Url,
}

impl HttpFlashLoanBackend {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized)
            .with_context(|| format!("invalid flash loan api url: {base_url}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            anyhow::bail!("api url must start with http:// or https://");
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build http client")?;

        Ok(Self { http, base_url })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Self::new(&settings.api_base_url, settings.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str, fallback: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|err| BackendError::Transport(format!("{fallback}: {err}")))
    }

    async fn post_json<B, T>(&self, path: &str, body: &B, fallback: &str) -> Result<T, BackendError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path, fallback)?;
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| BackendError::Transport(format!("{fallback}: {err}")))?;
        read_json(response, fallback).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response, fallback: &str) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let raw = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&raw)
            .ok()
            .and_then(|body| body.message().map(str::to_owned))
            .unwrap_or_else(|| format!("{fallback} (HTTP {})", status.as_u16()));
        warn!(status = status.as_u16(), %message, "flashloan: backend rejected request");
        return Err(BackendError::Http {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|err| BackendError::Decode(format!("{fallback}: unexpected response ({err})")))
}

#[async_trait]
impl FlashLoanBackend for HttpFlashLoanBackend {
    async fn assess_risk(
        &self,
        request: &RiskAssessmentRequest,
    ) -> Result<RiskAssessment, BackendError> {
        self.post_json(RISK_PATH, request, RISK_FALLBACK).await
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, BackendError> {
        self.post_json(QUOTE_PATH, request, QUOTE_FALLBACK).await
    }

    async fn execute(
        &self,
        request: &ExecuteBatchRequest,
    ) -> Result<ExecuteBatchResponse, BackendError> {
        self.post_json(EXECUTE_PATH, request, EXECUTE_FALLBACK).await
    }

    async fn user_batches(&self, user: Address) -> Result<Vec<BatchRecord>, BackendError> {
        let url = self.endpoint(&format!("{USER_BATCHES_PATH}/{user}"), HISTORY_FALLBACK)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| BackendError::Transport(format!("{HISTORY_FALLBACK}: {err}")))?;
        let body: UserBatchesResponse = read_json(response, HISTORY_FALLBACK).await?;
        Ok(body.data)
    }
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
