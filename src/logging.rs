//! Tracing setup and log-safe rendering of user identities.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Returns an error string when a subscriber is already installed, which
/// happens when tests share a process.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Plain => registry.with(fmt::layer().with_target(true)).try_init(),
    };

    result.map_err(|e| e.to_string())
}

/// Keep the first two characters of the local part and the full domain.
///
/// `jane.doe@example.com` becomes `ja***@example.com`; identities without an
/// `@` keep only their first two characters.
pub fn mask_identity(identity: &str) -> String {
    let identity = identity.trim();
    match identity.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            format!("{}***@{}", visible, domain)
        }
        None => {
            let visible: String = identity.chars().take(2).collect();
            format!("{}***", visible)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_email_local_part() {
        assert_eq!(mask_identity("jane.doe@example.com"), "ja***@example.com");
        assert_eq!(mask_identity("j@example.com"), "j***@example.com");
    }

    #[test]
    fn masks_plain_identifiers() {
        assert_eq!(mask_identity("user-42"), "us***");
        assert_eq!(mask_identity(""), "***");
    }
}
