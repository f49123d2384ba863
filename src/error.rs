//! Error types for ticket delivery and settings storage.

use thiserror::Error;

/// Failure reported by the host BLE stack, before the transport classifies it.
pub type GattError = Box<dyn std::error::Error + Send + Sync>;

/// Transport failures. Every transport operation ends in exactly one of these.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Host has no usable BLE adapter. Don't offer the BLE path.
    #[error("BLE not supported: {0}")]
    UnsupportedEnvironment(String),

    /// Device chooser dismissed without a selection
    #[error("device selection cancelled")]
    UserCancelled,

    /// GATT session could not be established or re-established
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connected device exposes no write characteristic
    #[error("no writable characteristic: {0}")]
    NoWritableEndpoint(String),

    /// Characteristic write rejected or threw
    #[error("write failed: {0}")]
    WriteFailed(String),
}

impl TransportError {
    /// Whether re-invoking the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::WriteFailed(_))
    }

    /// Whether this is "no device" rather than a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::UserCancelled)
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Settings store errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for settings operations
pub type ConfigResult<T> = Result<T, ConfigError>;
