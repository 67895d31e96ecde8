use std::net::AddrParseError;
use std::num::ParseIntError;

use thiserror::Error;

#[derive(Debug, Error)]
/// Errors raised while loading or validating configuration.
pub enum ConfigError {
    /// The port value was not an integer.
    #[error("invalid port value '{value}': {source}")]
    PortParseError {
        /// Rejected value.
        value: String,
        /// Parse failure.
        source: ParseIntError,
    },

    /// The port value was out of range.
    #[error("invalid port: '{value}' (must be 1-65535)")]
    InvalidPort {
        /// Rejected value.
        value: String,
    },

    /// The bind address did not parse.
    #[error("invalid bind address '{value}': {source}")]
    InvalidBindAddr {
        /// Rejected value.
        value: String,
        /// Parse failure.
        source: AddrParseError,
    },

    /// The preferred tier name was unknown.
    #[error("invalid tier '{value}' (expected advanced|smart|basic|mock)")]
    InvalidTier {
        /// Rejected value.
        value: String,
    },

    /// The embedding dimension was unusable.
    #[error("invalid embedding dimension '{value}'")]
    InvalidDimension {
        /// Rejected value.
        value: String,
    },

    /// The encryption key was shorter than the minimum.
    #[error("encryption key too short: {chars} chars (minimum {min})")]
    EncryptionKeyTooShort {
        /// Observed length.
        chars: usize,
        /// Required minimum.
        min: usize,
    },

    /// A remote embedding endpoint was configured without an API key.
    #[error("embedding endpoint configured without an API key")]
    MissingApiKey,
}
