//! Adapter for a live provider gateway exposing a small JSON API:
//! `GET {base}/rates?from=..&to=..` and `POST {base}/payments`.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::ProviderAdapter;
use crate::payments::providers::catalog::ProviderSpec;
use crate::payments::types::{CommissionTable, PaymentInstruction, PaymentOutcome};
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl HttpProviderConfig {
    /// Reads `{NAME}_API_URL`, `{NAME}_API_KEY`, `{NAME}_TIMEOUT_SECS` and `{NAME}_MAX_RETRIES`.
    pub fn from_env(provider: &str) -> PaymentResult<Self> {
        let prefix = provider.to_uppercase();
        let base_url = std::env::var(format!("{}_API_URL", prefix)).map_err(|_| {
            PaymentError::validation(
                format!("{}_API_URL is required in live mode", prefix),
                "api_url",
            )
        })?;
        let api_key = std::env::var(format!("{}_API_KEY", prefix)).map_err(|_| {
            PaymentError::validation(
                format!("{}_API_KEY is required in live mode", prefix),
                "api_key",
            )
        })?;
        let timeout = std::env::var(format!("{}_TIMEOUT_SECS", prefix))
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);
        let max_retries = std::env::var(format!("{}_MAX_RETRIES", prefix))
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(2);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(timeout),
            max_retries,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RateResponse {
    rate: Decimal,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    success: bool,
    transaction_id: Option<String>,
    message: Option<String>,
}

pub struct HttpProviderAdapter {
    spec: ProviderSpec,
    config: HttpProviderConfig,
    http: PaymentHttpClient,
}

impl HttpProviderAdapter {
    pub fn new(spec: ProviderSpec, config: HttpProviderConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(&spec.name, config.timeout, config.max_retries)?;
        Ok(Self { spec, config, http })
    }

    pub fn from_env(spec: ProviderSpec) -> PaymentResult<Self> {
        let config = HttpProviderConfig::from_env(&spec.name)?;
        Self::new(spec, config)
    }
}

#[async_trait]
impl ProviderAdapter for HttpProviderAdapter {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn supported_currencies(&self) -> &[String] {
        &self.spec.currencies
    }

    fn commission_rules(&self) -> &CommissionTable {
        &self.spec.commissions
    }

    fn priority(&self) -> u32 {
        self.spec.priority
    }

    fn initial_latency_ms(&self) -> f64 {
        self.spec.initial_latency_ms
    }

    async fn get_exchange_rate(&self, from: &str, to: &str) -> PaymentResult<Decimal> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(Decimal::ONE);
        }
        let url = format!("{}/rates?from={}&to={}", self.config.base_url, from, to);
        let response: RateResponse = self
            .http
            .request_json(reqwest::Method::GET, &url, Some(&self.config.api_key), None)
            .await?;
        if response.rate <= Decimal::ZERO {
            warn!(provider = %self.spec.name, from = %from, to = %to, "provider returned non-positive rate");
            return Err(PaymentError::ProviderError {
                provider: self.spec.name.clone(),
                message: format!("invalid rate {} for {}-{}", response.rate, from, to),
                provider_code: None,
                retryable: false,
            });
        }
        Ok(response.rate)
    }

    async fn process_payment(
        &self,
        instruction: &PaymentInstruction,
    ) -> PaymentResult<PaymentOutcome> {
        let url = format!("{}/payments", self.config.base_url);
        let body = serde_json::json!({
            "reference": instruction.transaction_id.to_string(),
            "amount": instruction.amount.to_string(),
            "from_currency": instruction.from_currency,
            "to_currency": instruction.to_currency,
            "exchange_rate": instruction.exchange_rate.to_string(),
            "recipient_id": instruction.recipient_id,
            "recipient_name": instruction.recipient_name,
            "card_token": instruction.card_token,
            "description": instruction.description,
        });

        let response: PaymentResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &url,
                Some(&self.config.api_key),
                Some(&body),
            )
            .await?;

        info!(
            provider = %self.spec.name,
            transaction_id = %instruction.transaction_id,
            success = response.success,
            "provider payment response received"
        );

        Ok(PaymentOutcome {
            success: response.success,
            provider_transaction_id: response.transaction_id,
            message: response.message,
        })
    }
}
