use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::warn;

/// JSON-over-HTTP client shared by gateway adapters.
///
/// Retries 429 and 5xx responses with exponential backoff up to `max_retries`.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    provider: String,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(provider: &str, timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            provider: provider.to_string(),
            timeout,
            max_retries,
        })
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
    ) -> PaymentResult<T> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let mut request = self.client.request(method.clone(), url).timeout(self.timeout);
            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        PaymentError::Timeout {
                            provider: self.provider.clone(),
                            timeout_ms: self.timeout.as_millis() as u64,
                        }
                    } else {
                        PaymentError::NetworkError {
                            message: format!("{} request failed: {}", self.provider, e),
                        }
                    });
                    if attempt < self.max_retries {
                        tokio::time::sleep(backoff(attempt)).await;
                    }
                    continue;
                }
            };

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return serde_json::from_str::<T>(&text).map_err(|e| PaymentError::ProviderError {
                    provider: self.provider.clone(),
                    message: format!("invalid provider JSON response: {}", e),
                    provider_code: None,
                    retryable: false,
                });
            }

            if status.as_u16() == 429 {
                if attempt < self.max_retries {
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
                return Err(PaymentError::RateLimitError {
                    message: format!("{} rate limit exceeded", self.provider),
                    retry_after_seconds: None,
                });
            }

            if status.is_server_error() && attempt < self.max_retries {
                warn!(
                    provider = %self.provider,
                    status = %status,
                    attempt = attempt + 1,
                    "provider server error, retrying"
                );
                tokio::time::sleep(backoff(attempt)).await;
                continue;
            }

            return Err(PaymentError::ProviderError {
                provider: self.provider.clone(),
                message: format!("HTTP {}: {}", status, text),
                provider_code: Some(status.as_u16().to_string()),
                retryable: status.is_server_error(),
            });
        }

        Err(last_error.unwrap_or(PaymentError::NetworkError {
            message: format!("{} request failed", self.provider),
        }))
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(250 * (1 << attempt.min(6)))
}
