//! Fingerprint enrollment and verification engine.
//!
//! Raw ridge captures are scored, checked for cross-sample consistency and
//! reduced to minutiae; a completed session is merged into a composite
//! template that later captures are matched against.

pub mod biometrics;
pub mod capture;
pub mod config;
pub mod errors;

pub use config::{EngineConfig, NeighbourhoodRule};
pub use errors::{AppError, AppResult};
