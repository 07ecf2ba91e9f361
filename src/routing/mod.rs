//! Cost, latency and reliability aware provider selection.

pub mod engine;
pub mod fees;
pub mod geo;
pub mod types;

pub use engine::RoutingEngine;
pub use fees::FxMarkupTable;
pub use geo::GeoTable;
pub use types::{RouteRequest, RouteResult, RoutingCandidate, RoutingError, RoutingResult};
