//! Operational errors for this crate's own responsibilities:
//! configuration loading and domain-model (de)serialization. The
//! broader per-subsystem error taxonomy that gets folded into the event
//! log lives in [`crate::model::error_report`].

use thiserror::Error;

pub use crate::config::ConfigError;

/// Errors raised directly by `hotswap-core`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to (de)serialize {what}: {source}")]
    Serialization {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;
