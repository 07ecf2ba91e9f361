//! PSP routing, fraud screening and transfer orchestration.

#[cfg(feature = "cache")]
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod fraud;
pub mod health;
pub mod logging;
pub mod payments;
pub mod routing;
pub mod services;

pub use error::{AppError, AppResult};
