//! Stateful fraud-risk scoring.

pub mod engine;
pub mod history;
pub mod rules;
pub mod types;

pub use engine::{FraudConfig, FraudEngine};
pub use history::{
    HistoryLease, InMemoryRiskHistoryStore, RiskError, RiskHistoryStore, RiskResult,
    UserRiskHistory,
};
pub use types::{RiskAction, RiskAssessment, RiskLevel, RiskSignal, RuleBreakdown};
