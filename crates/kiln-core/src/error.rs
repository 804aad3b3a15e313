//! Error types for Kiln.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Lookup errors
    #[error("Checksum computation failed for {module}: {reason}")]
    ChecksumComputation { module: String, reason: String },

    #[error("Cache tier unavailable: {0}")]
    TierUnavailable(String),

    #[error("Corrupt build descriptor: {0}")]
    CorruptDescriptor(String),

    // Save errors
    #[error("Cannot read property {property} of {step}: {reason}")]
    PropertyUnreadable {
        property: String,
        step: String,
        reason: String,
    },

    #[error("Property {property} configured as tracked for {step} is not accessible")]
    UntrackableProperty { property: String, step: String },

    // Infrastructure errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors that must reach the host build instead of degrading caching.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::UntrackableProperty { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}
