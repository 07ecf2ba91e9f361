//! Type-safe cache key builders

use std::fmt;

pub const VERSION: &str = "v1";

pub mod risk {
    use super::*;

    pub const NAMESPACE: &str = "risk";

    /// Serialized `UserRiskHistory` of one user.
    #[derive(Debug, Clone)]
    pub struct HistoryKey {
        pub user_id: String,
    }

    impl HistoryKey {
        pub fn new(user_id: impl Into<String>) -> Self {
            Self {
                user_id: user_id.into(),
            }
        }
    }

    impl fmt::Display for HistoryKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}:history:{}", VERSION, NAMESPACE, self.user_id)
        }
    }

    /// Lease guarding read-modify-write of a user's history.
    #[derive(Debug, Clone)]
    pub struct LockKey {
        pub user_id: String,
    }

    impl LockKey {
        pub fn new(user_id: impl Into<String>) -> Self {
            Self {
                user_id: user_id.into(),
            }
        }
    }

    impl fmt::Display for LockKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}:lock:{}", VERSION, NAMESPACE, self.user_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_keys() {
        assert_eq!(risk::HistoryKey::new("u-1").to_string(), "v1:risk:history:u-1");
        assert_eq!(risk::LockKey::new("u-1").to_string(), "v1:risk:lock:u-1");
    }
}
