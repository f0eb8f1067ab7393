//! Error types for the caching facade

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while caching
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    // =========================================================================
    // Protocol Misuse
    // =========================================================================
    /// `save()` without a pending `load()`
    #[error("Cache::load() must be called before Cache::save()")]
    LoadNotCalled,

    /// `end()` without a pending `start()`
    #[error("Cache::start() must be called before Cache::end()")]
    EndWithoutStart,

    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// Backend reported a failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    // =========================================================================
    // Memoization Errors
    // =========================================================================
    /// A wrapped object's method failed
    #[error("Invocation of '{method}' failed: {reason}")]
    Invocation { method: String, reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML configuration parse error
    #[error("Failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Named cache not registered in the manager
    #[error("Cache '{0}' not found")]
    CacheNotFound(String),
}

impl Error {
    /// True for errors caused by unbalanced load/save or start/end calls
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(self, Error::LoadNotCalled | Error::EndWithoutStart)
    }
}
