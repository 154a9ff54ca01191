//! Vault error types using thiserror 2.0.
//!
//! Errors raised while talking to Vault, keeping a lease alive, or wiring
//! drivers together. Errors returned by a wrapped database driver are not
//! represented here; they pass through as opaque [`anyhow::Error`] values.

use thiserror::Error;

/// Errors produced by the credential lifecycle.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Vault server unavailable
    #[error("Vault unavailable: {0}")]
    Unavailable(String),

    /// Token rejected by Vault
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Token lacks a policy for the path
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Secret not found
    #[error("Secret not found at path: {0}")]
    SecretNotFound(String),

    /// Lease renewal failed
    #[error("Lease renewal failed: {0}")]
    LeaseRenewalFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Rate limited
    #[error("Rate limited")]
    RateLimited,

    /// No driver registered under the name
    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    /// A driver is already registered under the name
    #[error("Driver already registered: {0}")]
    DuplicateDriver(String),
}

/// Result type for Vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    /// Check if error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::RateLimited | Self::Http(_)
        )
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an authentication failed error.
    #[must_use]
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed(msg.into())
    }

    /// Create a secret not found error.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::SecretNotFound(path.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VaultError::unavailable("connection refused");
        assert_eq!(err.to_string(), "Vault unavailable: connection refused");

        let err = VaultError::invalid_config("VAULT_SECRET_PATH must be set");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: VAULT_SECRET_PATH must be set"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(VaultError::Unavailable("timeout".to_string()).is_retryable());
        assert!(VaultError::RateLimited.is_retryable());
        assert!(!VaultError::not_found("database/creds/app").is_retryable());
        assert!(!VaultError::auth_failed("bad token").is_retryable());
        assert!(!VaultError::UnknownDriver("mysql".to_string()).is_retryable());
    }

    #[test]
    fn test_from_serde_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: VaultError = serde_err.into();
        assert!(matches!(err, VaultError::Serialization(_)));
        assert!(!err.is_retryable());
    }
}
