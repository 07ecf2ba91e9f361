pub mod catalog;
pub mod http;
pub mod sandbox;

pub use catalog::ProviderSpec;
pub use http::{HttpProviderAdapter, HttpProviderConfig};
pub use sandbox::{SandboxOutcome, SandboxProvider, DECLINED_TEST_CARD};
