//! Connection factories handing Vault-issued credentials to a wrapped driver.

use crate::error::VaultResult;
use crate::provider::SecretProvider;
use crate::renewal::{RenewalHandle, RenewalLoop};
use crate::retry::RetryPolicy;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::template;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A database driver that opens connections from a connection string.
///
/// Errors are whatever the driver produces and are passed through untouched.
#[async_trait]
pub trait Driver<C>: Send + Sync {
    /// Open a connection to `dsn`.
    async fn connect(&self, dsn: &str) -> anyhow::Result<C>;
}

/// Opens connections with a fixed configuration.
#[async_trait]
pub trait Connector<C>: Send + Sync {
    /// Open a new connection.
    async fn connect(&self) -> anyhow::Result<C>;
}

/// Connector for a plain driver and a literal connection string.
pub struct DsnConnector<C> {
    driver: Arc<dyn Driver<C>>,
    dsn: String,
}

impl<C> DsnConnector<C> {
    /// Create a connector that always connects with `dsn`.
    pub fn new(driver: Arc<dyn Driver<C>>, dsn: impl Into<String>) -> Self {
        Self {
            driver,
            dsn: dsn.into(),
        }
    }
}

#[async_trait]
impl<C: Send + 'static> Connector<C> for DsnConnector<C> {
    async fn connect(&self) -> anyhow::Result<C> {
        self.driver.connect(&self.dsn).await
    }
}

/// Connection factory filling a templated connection string with the
/// credentials currently leased from Vault.
///
/// Construction performs the first secret fetch; afterwards a background
/// [`RenewalLoop`] keeps the credentials current until the connector is
/// dropped. Connection attempts never wait on the loop.
pub struct VaultConnector<C> {
    driver: Arc<dyn Driver<C>>,
    template: String,
    store: Arc<SnapshotStore>,
    renewal: RenewalHandle,
    unresolved: UnresolvedFields,
}

impl<C> VaultConnector<C> {
    /// Fetch the secret at `secret_path` and start keeping it alive.
    ///
    /// # Errors
    ///
    /// Fails when the first secret cannot be fetched; nothing keeps running
    /// in that case.
    pub async fn start(
        driver: Arc<dyn Driver<C>>,
        provider: Arc<dyn SecretProvider>,
        template: impl Into<String>,
        secret_path: impl Into<String>,
    ) -> VaultResult<Self> {
        Self::start_with_retry(driver, provider, template, secret_path, RetryPolicy::default())
            .await
    }

    /// Like [`VaultConnector::start`], with a custom retry policy for the
    /// fetches that follow an expired lease.
    ///
    /// # Errors
    ///
    /// See [`VaultConnector::start`].
    pub async fn start_with_retry(
        driver: Arc<dyn Driver<C>>,
        provider: Arc<dyn SecretProvider>,
        template: impl Into<String>,
        secret_path: impl Into<String>,
        refetch_retry: RetryPolicy,
    ) -> VaultResult<Self> {
        let store = Arc::new(SnapshotStore::new());
        let renewal = RenewalLoop::new(provider, Arc::clone(&store), secret_path)
            .with_refetch_retry(refetch_retry)
            .start()
            .await?;

        Ok(Self {
            driver,
            template: template.into(),
            store,
            renewal,
            unresolved: UnresolvedFields::default(),
        })
    }

    /// The connection string as it would be handed to the driver right now.
    #[must_use]
    pub fn resolved_dsn(&self) -> String {
        let snapshot = self.store.read_all();
        let missing = template::unresolved(&self.template, &snapshot);
        if self.unresolved.changed(&missing) {
            warn!(fields = ?missing, "Connection template has placeholders the secret does not fill");
        } else if !missing.is_empty() {
            debug!(fields = ?missing, "Connection template still has unfilled placeholders");
        }
        template::resolve(&self.template, &snapshot)
    }

    /// Open a connection through the wrapped driver using the current
    /// credentials.
    ///
    /// # Errors
    ///
    /// Returns the wrapped driver's error unchanged.
    #[instrument(skip(self))]
    pub async fn open(&self) -> anyhow::Result<C> {
        let dsn = self.resolved_dsn();
        self.driver.connect(&dsn).await
    }

    /// The credentials currently held.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.read_all()
    }

    /// The connection string template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Handle on the background renewal loop.
    #[must_use]
    pub const fn renewal(&self) -> &RenewalHandle {
        &self.renewal
    }

    /// Stop renewing and wait for the background loop to exit.
    pub async fn shutdown(self) {
        self.renewal.shutdown().await;
    }
}

#[async_trait]
impl<C: Send + 'static> Connector<C> for VaultConnector<C> {
    async fn connect(&self) -> anyhow::Result<C> {
        self.open().await
    }
}

/// Last set of unfilled placeholder names, so each new set is reported once.
#[derive(Debug, Default)]
struct UnresolvedFields {
    last: Mutex<Vec<String>>,
}

impl UnresolvedFields {
    /// Record `missing`; true when it is non-empty and differs from the
    /// previous call.
    fn changed(&self, missing: &[&str]) -> bool {
        let mut last = self.last.lock();
        if last.iter().map(String::as_str).eq(missing.iter().copied()) {
            return false;
        }
        *last = missing.iter().map(|name| (*name).to_string()).collect();
        !missing.is_empty()
    }
}

impl<C> fmt::Debug for VaultConnector<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConnector")
            .field("template", &self.template)
            .field("snapshot", &self.store.read_all())
            .field("renewal", &self.renewal.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_fields_reported_once_per_set() {
        let unresolved = UnresolvedFields::default();

        assert!(!unresolved.changed(&[]));
        assert!(unresolved.changed(&["database"]));
        assert!(!unresolved.changed(&["database"]));
        assert!(!unresolved.changed(&["database"]));

        assert!(unresolved.changed(&["database", "host"]));
        assert!(!unresolved.changed(&["database", "host"]));

        assert!(!unresolved.changed(&[]));
        assert!(unresolved.changed(&["database"]));
    }
}
