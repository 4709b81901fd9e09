//! pelicun - Probabilistic Estimation of Losses, Injuries, and Community
//! resilience Under Natural disasters.
//!
//! The crate estimates the damage and repair consequences of an asset
//! exposed to a hazard event using Monte Carlo simulation. Demands on the
//! structure are characterized by a (calibrated) random sample, component
//! quantities and fragilities are sampled per performance group, and repair
//! consequences are aggregated into cost, time, carbon, and energy
//! measures.

pub mod assessment;
pub mod base;
pub mod config;
pub mod dl_calculation;
pub mod logger;
pub mod model;
pub mod stats;
pub mod table;
pub mod units;
pub mod uq;

use thiserror::Error;

pub use assessment::Assessment;
pub use config::Options;
pub use logger::Logger;
pub use table::Table;
pub use units::UnitRegistry;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum PelicunError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("cannot parse {what}: {value}")]
    Parse { what: &'static str, value: String },
    #[error("unit error: {0}")]
    Units(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
}

impl PelicunError {
    pub(crate) fn parse(what: &'static str, value: impl Into<String>) -> Self {
        Self::Parse {
            what,
            value: value.into(),
        }
    }
}
