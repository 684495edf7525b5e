//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout the client core.
//! All errors are structured and map to stable error codes for JSON output.
//!
//! # Error Categories
//! - `MalformedProperty`: Connection string syntax errors
//! - `MissingDriver`: DSN persistence requested without a `Driver` key
//! - `RegistryRejected`: The driver manager refused a configuration request
//! - `EnumerationFailed`: Driver or data source listing ended without `NO_DATA`
//! - `StatementFailed`: Driver-reported statement execution errors
//! - `ScriptExecutionUnsupported`: Multi-statement scripts with pass-through disabled
//! - `ConnectionFailed`: Opening a database connection failed
//! - `SecretStore`: Credential store lookups or updates failed
//! - `ConfigError`: Settings file errors
//! - `InvalidInput`: Missing or malformed user input
//! - `Unsupported`: Feature not compiled into this build

use thiserror::Error;

/// Main error type for client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// A non-empty connection string segment has no `=`
    #[error("Malformed connection string property: {0}")]
    MalformedProperty(String),

    /// A data source cannot be registered without a driver
    #[error("Connection string has no Driver property; a data source cannot be registered without a driver")]
    MissingDriver,

    /// Driver manager returned failure (unknown driver, user cancel, ...)
    #[error("Driver manager rejected the request: {0}")]
    RegistryRejected(String),

    /// Enumeration terminated with a status other than `NO_DATA`
    #[error("Enumeration failed: {0}")]
    EnumerationFailed(String),

    /// Driver-reported statement execution error
    #[error("Statement failed: {0}")]
    StatementFailed(String),

    /// Script execution requested while script pass-through is disabled
    #[error("Script execution is not supported; run statements one at a time")]
    ScriptExecutionUnsupported,

    /// Database connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Credential store error
    #[error("Credential store error: {0}")]
    SecretStore(String),

    /// Configuration error (unreadable file, invalid JSON, ...)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Feature not available in this build
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl ClientError {
    /// Convert error to error code string for JSON output
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedProperty(_) => "MALFORMED_PROPERTY",
            Self::MissingDriver => "MISSING_DRIVER",
            Self::RegistryRejected(_) => "REGISTRY_REJECTED",
            Self::EnumerationFailed(_) => "ENUMERATION_FAILED",
            Self::StatementFailed(_) => "STATEMENT_FAILED",
            Self::ScriptExecutionUnsupported => "SCRIPT_EXECUTION_UNSUPPORTED",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::SecretStore(_) => "SECRET_STORE",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Unsupported(_) => "UNSUPPORTED",
        }
    }

    /// Get human-readable error message
    ///
    /// Never contains passwords: connection strings are redacted before they
    /// reach an error message.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether the error should be shown as a warning rather than a failure
    ///
    /// Registry and statement errors are user-visible warnings; the caller
    /// keeps running.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::RegistryRejected(_) | Self::EnumerationFailed(_) | Self::StatementFailed(_)
        )
    }

    /// Create a malformed property error
    pub fn malformed_property(segment: impl Into<String>) -> Self {
        Self::MalformedProperty(segment.into())
    }

    /// Create a registry rejected error
    pub fn registry_rejected(message: impl Into<String>) -> Self {
        Self::RegistryRejected(message.into())
    }

    /// Create an enumeration failed error
    pub fn enumeration_failed(message: impl Into<String>) -> Self {
        Self::EnumerationFailed(message.into())
    }

    /// Create a statement failed error
    pub fn statement_failed(message: impl Into<String>) -> Self {
        Self::StatementFailed(message.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a credential store error
    pub fn secret_store(message: impl Into<String>) -> Self {
        Self::SecretStore(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an unsupported feature error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
