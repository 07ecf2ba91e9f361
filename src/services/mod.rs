//! Services module for business logic and integrations

pub mod payment_orchestrator;
pub mod receipt;

pub use payment_orchestrator::{
    Clock, OrchestrationState, OrchestratorConfig, OrchestratorError, OrchestratorResult,
    PaymentOrchestrator, ProviderAttempt, ProviderHealth, ProviderHealthReport, RouteAlternative,
    SystemClock, TransferResult, TransferStatus, VerifyPolicy,
};
pub use receipt::{
    LoggingReceiptSink, MemoryReceiptSink, ReceiptError, ReceiptSink, TransactionSummary,
};
