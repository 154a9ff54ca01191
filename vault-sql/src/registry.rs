//! Named driver registry with `vault-` wrapped variants.

use crate::client::VaultClient;
use crate::config::VaultConfig;
use crate::connector::{Connector, Driver, DsnConnector, VaultConnector};
use crate::error::{VaultError, VaultResult};
use crate::provider::SecretProvider;
use crate::retry::RetryPolicy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Prefix of drivers that resolve credentials through Vault.
pub const VAULT_PREFIX: &str = "vault-";

/// Name under which the Vault variant of `driver` is registered.
#[must_use]
pub fn vault_driver_name(driver: &str) -> String {
    format!("{VAULT_PREFIX}{driver}")
}

/// A driver wrapped so that connection strings are templates filled from a
/// Vault secret.
pub struct VaultDriver<C> {
    driver: Arc<dyn Driver<C>>,
    provider: Arc<dyn SecretProvider>,
    secret_path: String,
    refetch_retry: RetryPolicy,
}

impl<C> Clone for VaultDriver<C> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            provider: Arc::clone(&self.provider),
            secret_path: self.secret_path.clone(),
            refetch_retry: self.refetch_retry.clone(),
        }
    }
}

impl<C> VaultDriver<C> {
    /// Wrap `driver`, leasing credentials for `secret_path` from `provider`.
    pub fn new(
        driver: Arc<dyn Driver<C>>,
        provider: Arc<dyn SecretProvider>,
        secret_path: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            provider,
            secret_path: secret_path.into(),
            refetch_retry: RetryPolicy::default(),
        }
    }

    /// Retry policy for fetches that follow an expired lease.
    #[must_use]
    pub fn with_refetch_retry(mut self, retry: RetryPolicy) -> Self {
        self.refetch_retry = retry;
        self
    }

    /// Build a connector for the templated connection string `template`.
    ///
    /// # Errors
    ///
    /// Fails when the first secret cannot be fetched.
    pub async fn open_connector(&self, template: &str) -> VaultResult<VaultConnector<C>> {
        VaultConnector::start_with_retry(
            Arc::clone(&self.driver),
            Arc::clone(&self.provider),
            template,
            self.secret_path.clone(),
            self.refetch_retry.clone(),
        )
        .await
    }
}

enum Entry<C> {
    Plain(Arc<dyn Driver<C>>),
    Vault(VaultDriver<C>),
}

impl<C> Clone for Entry<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Plain(driver) => Self::Plain(Arc::clone(driver)),
            Self::Vault(driver) => Self::Vault(driver.clone()),
        }
    }
}

/// Drivers available by name, for connections of type `C`.
pub struct DriverRegistry<C> {
    drivers: RwLock<HashMap<String, Entry<C>>>,
}

impl<C: Send + 'static> DriverRegistry<C> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a plain driver.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::DuplicateDriver`] if the name is taken.
    pub fn register(&self, name: impl Into<String>, driver: Arc<dyn Driver<C>>) -> VaultResult<()> {
        self.insert(name.into(), Entry::Plain(driver))
    }

    /// Register `vault-<name>`, wrapping the already registered driver `name`.
    ///
    /// Returns the name of the new driver. Fetches after a lease ends use
    /// [`RetryPolicy::default`].
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::UnknownDriver`] if `name` is not registered as a
    /// plain driver, or [`VaultError::DuplicateDriver`] if the variant exists.
    pub fn register_vault_variant(
        &self,
        name: &str,
        provider: Arc<dyn SecretProvider>,
        secret_path: impl Into<String>,
    ) -> VaultResult<String> {
        self.register_vault_variant_with_retry(name, provider, secret_path, RetryPolicy::default())
    }

    /// Like [`DriverRegistry::register_vault_variant`], retrying fetches
    /// after a lease ends with `refetch_retry`.
    ///
    /// # Errors
    ///
    /// See [`DriverRegistry::register_vault_variant`].
    pub fn register_vault_variant_with_retry(
        &self,
        name: &str,
        provider: Arc<dyn SecretProvider>,
        secret_path: impl Into<String>,
        refetch_retry: RetryPolicy,
    ) -> VaultResult<String> {
        let driver = match self.drivers.read().get(name) {
            Some(Entry::Plain(driver)) => Arc::clone(driver),
            _ => return Err(VaultError::UnknownDriver(name.to_string())),
        };

        let vault_name = vault_driver_name(name);
        let secret_path = secret_path.into();
        info!(driver = name, vault_driver = %vault_name, path = %secret_path, "Registering Vault driver");
        let vault_driver =
            VaultDriver::new(driver, provider, secret_path).with_refetch_retry(refetch_retry);
        self.insert(vault_name.clone(), Entry::Vault(vault_driver))?;
        Ok(vault_name)
    }

    /// Register `vault-<name>` backed by a [`VaultClient`] built from `config`.
    ///
    /// The config's retry settings apply to lease renewals and to fetches
    /// after a lease ends.
    ///
    /// # Errors
    ///
    /// See [`DriverRegistry::register_vault_variant`]; also fails if the
    /// client cannot be built.
    pub fn register_vault_variant_from_config(
        &self,
        name: &str,
        config: VaultConfig,
    ) -> VaultResult<String> {
        let secret_path = config.secret_path.clone();
        let refetch_retry = RetryPolicy::from(&config);
        let client = VaultClient::new(config)?;
        self.register_vault_variant_with_retry(name, Arc::new(client), secret_path, refetch_retry)
    }

    /// Registered driver names, sorted.
    #[must_use]
    pub fn drivers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Open a connector on driver `name`.
    ///
    /// For `vault-` drivers `dsn` is a template and the first secret is
    /// fetched before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::UnknownDriver`] for unregistered names, or the
    /// first fetch error of a Vault driver.
    pub async fn open_connector(&self, name: &str, dsn: &str) -> VaultResult<Arc<dyn Connector<C>>> {
        let entry = self
            .drivers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| VaultError::UnknownDriver(name.to_string()))?;

        match entry {
            Entry::Plain(driver) => Ok(Arc::new(DsnConnector::new(driver, dsn))),
            Entry::Vault(driver) => Ok(Arc::new(driver.open_connector(dsn).await?)),
        }
    }

    fn insert(&self, name: String, entry: Entry<C>) -> VaultResult<()> {
        let mut drivers = self.drivers.write();
        if drivers.contains_key(&name) {
            return Err(VaultError::DuplicateDriver(name));
        }
        drivers.insert(name, entry);
        Ok(())
    }
}

impl<C: Send + 'static> Default for DriverRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
