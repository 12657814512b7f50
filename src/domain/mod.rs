//! Domain layer: models, statistical primitives, errors, and ports.

pub mod errors;
pub mod models;
pub mod ports;
pub mod stats;

pub use errors::{DomainError, DomainResult};
