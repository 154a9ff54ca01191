//! Vault HTTP client using token authentication.

use crate::{
    config::VaultConfig,
    error::{VaultError, VaultResult},
    provider::{LeaseRenewal, SecretProvider, Subscription},
    renewer::{self, RenewalPolicy},
    secret::Secret,
};
use async_trait::async_trait;
use reqwest::{Client, Method};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument};

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Vault client reading leased secrets and renewing their leases.
#[derive(Clone)]
pub struct VaultClient {
    config: Arc<VaultConfig>,
    http: Client,
}

impl VaultClient {
    /// Create a new Vault client.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Http`] if the HTTP client cannot be built.
    pub fn new(config: VaultConfig) -> VaultResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("vault-sql/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    /// Create a client from `VAULT_*` environment variables.
    ///
    /// # Errors
    ///
    /// See [`VaultConfig::from_env`] and [`VaultClient::new`].
    pub fn from_env() -> VaultResult<Self> {
        Self::new(VaultConfig::from_env()?)
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Read the secret at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if Vault is unreachable, rejects the token, or has
    /// nothing at `path`.
    #[instrument(skip(self))]
    pub async fn read(&self, path: &str) -> VaultResult<Secret> {
        let secret: Secret = self.request(Method::GET, path, None).await?;
        debug!(
            lease_id = %secret.lease_id,
            ttl_secs = secret.lease_duration,
            renewable = secret.renewable,
            "Read secret"
        );
        Ok(secret)
    }

    /// Renew a lease.
    ///
    /// # Errors
    ///
    /// Returns an error if the renewal request fails.
    #[instrument(skip(self))]
    pub async fn renew(&self, lease_id: &str, increment: Duration) -> VaultResult<Secret> {
        let body = serde_json::json!({
            "lease_id": lease_id,
            "increment": increment.as_secs()
        });
        self.request(Method::PUT, "sys/leases/renew", Some(body)).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> VaultResult<T> {
        let url = format!(
            "{}/v1/{}",
            self.config.addr.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let mut request = self
            .http
            .request(method, &url)
            .header(TOKEN_HEADER, self.config.token.expose_secret());

        if let Some(b) = body {
            request = request.json(&b);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VaultError::unavailable(e.to_string()))?;

        let status = response.status();
        match status.as_u16() {
            401 => return Err(VaultError::auth_failed(format!("Status {status}"))),
            403 => return Err(VaultError::PermissionDenied(path.to_string())),
            404 => return Err(VaultError::not_found(path)),
            429 => return Err(VaultError::RateLimited),
            _ if !status.is_success() => {
                let text = response.text().await.unwrap_or_default();
                return Err(VaultError::unavailable(format!("Status {status}: {text}")));
            }
            _ => {}
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(VaultError::from)
    }
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("addr", &self.config.addr)
            .field("secret_path", &self.config.secret_path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretProvider for VaultClient {
    async fn fetch(&self, path: &str) -> VaultResult<Secret> {
        self.read(path).await
    }

    fn subscribe(&self, secret: Secret) -> Subscription {
        let policy = RenewalPolicy::from(self.config.as_ref());
        renewer::spawn(Arc::new(self.clone()), secret, policy)
    }
}

#[async_trait]
impl LeaseRenewal for VaultClient {
    async fn renew_lease(&self, lease_id: &str, increment: Duration) -> VaultResult<Secret> {
        self.renew(lease_id, increment).await
    }
}
