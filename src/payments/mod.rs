pub mod error;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use provider::ProviderAdapter;
pub use registry::{ProviderMode, ProviderProfile, ProviderRegistry, RegisteredProvider, RegistryConfig};
pub use types::{
    CommissionRule, CommissionTable, OptimizationMode, PaymentInstruction, PaymentOutcome,
    TransferRequest,
};
