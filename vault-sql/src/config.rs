//! Vault client configuration.

use crate::error::{VaultError, VaultResult};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Address used when `VAULT_ADDR` is not set.
pub const DEFAULT_ADDR: &str = "https://127.0.0.1:8200";

/// File under the home directory holding a token written by `vault login`.
pub const TOKEN_FILE: &str = ".vault-token";

/// Vault client configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server address
    pub addr: String,
    /// Token sent as `X-Vault-Token`
    pub token: SecretString,
    /// Path of the secret to lease, e.g. `database/creds/readonly`
    pub secret_path: String,
    /// Request timeout
    pub timeout: Duration,
    /// Fraction of the lease TTL left when renewal is attempted
    pub renewal_threshold: f64,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Base retry delay
    pub retry_delay: Duration,
}

impl VaultConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(
        addr: impl Into<String>,
        token: impl Into<String>,
        secret_path: impl Into<String>,
    ) -> Self {
        Self {
            addr: addr.into(),
            token: SecretString::from(token.into()),
            secret_path: secret_path.into(),
            timeout: Duration::from_secs(60),
            renewal_threshold: 0.2,
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }

    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] when the secret path or token is
    /// missing, or when the address or timeout cannot be parsed.
    pub fn from_env() -> VaultResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), dirs::home_dir())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// `home` is searched for a `.vault-token` file when `VAULT_TOKEN` is unset.
    ///
    /// # Errors
    ///
    /// See [`VaultConfig::from_env`].
    pub fn from_lookup<F>(lookup: F, home: Option<PathBuf>) -> VaultResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let addr = get("VAULT_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        Url::parse(&addr)
            .map_err(|e| VaultError::invalid_config(format!("VAULT_ADDR {addr:?}: {e}")))?;

        let secret_path = get("VAULT_SECRET_PATH")
            .ok_or_else(|| VaultError::invalid_config("VAULT_SECRET_PATH must be set"))?;

        let token = match get("VAULT_TOKEN") {
            Some(token) => token,
            None => {
                let home = home.ok_or_else(|| {
                    VaultError::invalid_config("VAULT_TOKEN is not set and no home directory")
                })?;
                read_token_file(&home.join(TOKEN_FILE))?
            }
        };

        let mut config = Self::new(addr, token.trim(), secret_path);
        if let Some(timeout) = get("VAULT_CLIENT_TIMEOUT") {
            let secs = timeout.trim().parse::<u64>().map_err(|e| {
                VaultError::invalid_config(format!("VAULT_CLIENT_TIMEOUT {timeout:?}: {e}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set renewal threshold (clamped to 0.1-0.5).
    #[must_use]
    pub fn with_renewal_threshold(mut self, threshold: f64) -> Self {
        self.renewal_threshold = threshold.clamp(0.1, 0.5);
        self
    }

    /// Set maximum retries for transient failures.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

fn read_token_file(path: &Path) -> VaultResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        VaultError::invalid_config(format!("Error reading vault token {}: {e}", path.display()))
    })
}
