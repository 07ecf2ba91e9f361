use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Payment declined: {message}")]
    PaymentDeclinedError {
        message: String,
        provider_code: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Provider {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },

    #[error("Unknown provider: {name}")]
    UnknownProvider { name: String },
}

impl PaymentError {
    pub fn validation(message: impl Into<String>, field: &str) -> Self {
        PaymentError::ValidationError {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::PaymentDeclinedError { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::RateLimitError { .. } => true,
            PaymentError::Timeout { .. } => true,
            PaymentError::ProviderError { retryable, .. } => *retryable,
            PaymentError::UnknownProvider { .. } => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::PaymentDeclinedError { .. } => 402,
            PaymentError::NetworkError { .. } => 503,
            PaymentError::RateLimitError { .. } => 429,
            PaymentError::Timeout { .. } => 504,
            PaymentError::ProviderError { .. } => 502,
            PaymentError::UnknownProvider { .. } => 404,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::ValidationError { message, .. } => message.clone(),
            PaymentError::PaymentDeclinedError { .. } => {
                "Payment was declined by the provider".to_string()
            }
            PaymentError::NetworkError { .. } => {
                "Payment provider is temporarily unavailable".to_string()
            }
            PaymentError::RateLimitError { .. } => {
                "Too many requests to payment provider. Please retry shortly".to_string()
            }
            PaymentError::Timeout { provider, .. } => {
                format!("Payment provider {} did not respond in time", provider)
            }
            PaymentError::ProviderError { .. } => "Payment provider returned an error".to_string(),
            PaymentError::UnknownProvider { name } => {
                format!("Payment provider {} is not available", name)
            }
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};

        let kind = match &err {
            PaymentError::ValidationError { message, field } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.clone().unwrap_or_else(|| "request".to_string()),
                    reason: message.clone(),
                })
            }
            PaymentError::Timeout {
                provider,
                timeout_ms,
            } => AppErrorKind::External(ExternalError::Timeout {
                service: provider.clone(),
                timeout_ms: *timeout_ms,
            }),
            _ => AppErrorKind::External(ExternalError::PaymentProvider {
                provider: "payments".to_string(),
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            }),
        };
        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_http_status_mapping_is_correct() {
        assert_eq!(PaymentError::validation("bad", "amount").http_status_code(), 400);
        assert_eq!(
            PaymentError::Timeout {
                provider: "Wise".to_string(),
                timeout_ms: 5000
            }
            .http_status_code(),
            504
        );
    }

    #[test]
    fn retryable_flags_are_set() {
        assert!(PaymentError::NetworkError {
            message: "timeout".to_string()
        }
        .is_retryable());
        assert!(!PaymentError::PaymentDeclinedError {
            message: "declined".to_string(),
            provider_code: None
        }
        .is_retryable());
    }

    #[test]
    fn validation_errors_convert_to_app_validation_kind() {
        let app: crate::error::AppError = PaymentError::validation("amount must be positive", "amount").into();
        assert_eq!(app.status_code(), 400);
        assert!(!app.is_retryable());
    }
}
