//! Unified error handling for the routing backend
//!
//! Subsystem errors (payments, routing, risk history, persistence) convert into
//! [`AppError`], which carries an HTTP status, a stable error code and a
//! user-facing message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "TRANSFER_BLOCKED")]
    TransferBlocked,
    #[serde(rename = "NO_PROVIDER_AVAILABLE")]
    NoProviderAvailable,
    #[serde(rename = "PROVIDER_NOT_ELIGIBLE")]
    ProviderNotEligible,
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CACHE_ERROR")]
    CacheError,
    #[serde(rename = "RISK_STORE_ERROR")]
    RiskStoreError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 503, 504)
    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimitError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business rule failures
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Sender identity is on the blacklist
    TransferBlocked { reason: String },
    /// No active provider supports the destination currency
    NoProviderAvailable { currency: String },
    /// A pinned provider is unknown, inactive or cannot pay out in the currency
    ProviderNotEligible { provider: String, reason: String },
    TransactionNotFound { transaction_id: String },
}

/// Infrastructure-level errors (database, cache, risk history, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Cache { message: String },
    RiskStore { message: String },
    Configuration { message: String },
}

/// External service errors (payment providers)
#[derive(Debug, Clone)]
pub enum ExternalError {
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    RateLimit {
        service: String,
        retry_after: Option<u64>,
    },
    Timeout { service: String, timeout_ms: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidCurrency { currency: String, reason: String },
    InvalidAmount { amount: String, reason: String },
    MissingField { field: String },
    InvalidField { field: String, reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransferBlocked { .. } => 403,
                DomainError::NoProviderAvailable { .. } => 422,
                DomainError::ProviderNotEligible { .. } => 422,
                DomainError::TransactionNotFound { .. } => 404,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => 502,
                ExternalError::RateLimit { .. } => 429,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransferBlocked { .. } => ErrorCode::TransferBlocked,
                DomainError::NoProviderAvailable { .. } => ErrorCode::NoProviderAvailable,
                DomainError::ProviderNotEligible { .. } => ErrorCode::ProviderNotEligible,
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Cache { .. } => ErrorCode::CacheError,
                InfrastructureError::RiskStore { .. } => ErrorCode::RiskStoreError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => ErrorCode::PaymentProviderError,
                ExternalError::RateLimit { .. } => ErrorCode::RateLimitError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransferBlocked { .. } => {
                    "This transfer cannot be processed. Please contact support".to_string()
                }
                DomainError::NoProviderAvailable { currency } => {
                    format!("No payment provider currently supports {}", currency)
                }
                DomainError::ProviderNotEligible { provider, reason } => {
                    format!("Provider '{}' cannot process this transfer: {}", provider, reason)
                }
                DomainError::TransactionNotFound { transaction_id } => {
                    format!("Transaction '{}' not found", transaction_id)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider {
                    provider,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!(
                            "Payment provider ({}) is temporarily unavailable. Please try again",
                            provider
                        )
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::RateLimit {
                    service,
                    retry_after,
                } => match retry_after {
                    Some(secs) => format!(
                        "Rate limit exceeded for {}. Please try again in {} seconds",
                        service, secs
                    ),
                    None => format!("Rate limit exceeded for {}. Please try again later", service),
                },
                ExternalError::Timeout {
                    service,
                    timeout_ms,
                } => format!(
                    "{} request timed out after {}ms. Please try again",
                    service, timeout_ms
                ),
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidCurrency { currency, reason } => {
                    format!("Invalid currency '{}': {}", currency, reason)
                }
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Cache { .. } => true,
                InfrastructureError::RiskStore { .. } => true,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { is_retryable, .. } => *is_retryable,
                ExternalError::RateLimit { .. } => true,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError> lives in database/error.rs, From<PaymentError> in payments/error.rs

impl From<crate::routing::RoutingError> for AppError {
    fn from(err: crate::routing::RoutingError) -> Self {
        match err {
            crate::routing::RoutingError::NoProviderAvailable { currency } => {
                AppError::new(AppErrorKind::Domain(DomainError::NoProviderAvailable { currency }))
            }
        }
    }
}

impl From<crate::fraud::RiskError> for AppError {
    fn from(err: crate::fraud::RiskError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(InfrastructureError::RiskStore {
            message: err.to_string(),
        }))
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: err.to_string(),
            },
        ))
    }
}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_blocked_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::TransferBlocked {
            reason: "blacklisted".to_string(),
        }));

        assert_eq!(error.status_code(), 403);
        assert_eq!(error.error_code(), ErrorCode::TransferBlocked);
        assert!(!error.user_message().contains("blacklisted"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_no_provider_from_routing_error() {
        let error: AppError = crate::routing::RoutingError::NoProviderAvailable {
            currency: "XYZ".to_string(),
        }
        .into();

        assert_eq!(error.status_code(), 422);
        assert_eq!(error.error_code(), ErrorCode::NoProviderAvailable);
        assert!(error.user_message().contains("XYZ"));
    }

    #[test]
    fn test_rate_limit_error() {
        let error = AppError::new(AppErrorKind::External(ExternalError::RateLimit {
            service: "Wise".to_string(),
            retry_after: Some(60),
        }));

        assert_eq!(error.status_code(), 429);
        assert_eq!(error.error_code(), ErrorCode::RateLimitError);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_validation_error() {
        let error = AppError::new(AppErrorKind::Validation(ValidationError::InvalidAmount {
            amount: "-100".to_string(),
            reason: "Amount must be positive".to_string(),
        }))
        .with_request_id("req-1");

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::ValidationError);
        assert_eq!(error.request_id.as_deref(), Some("req-1"));
        assert!(!error.is_retryable());
    }
}
