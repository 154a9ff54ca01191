//! Contract with the secret-issuing service.

use crate::error::{VaultError, VaultResult};
use crate::secret::Secret;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Something that issues leased secrets and keeps their leases alive.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Read the secret stored at `path`.
    async fn fetch(&self, path: &str) -> VaultResult<Secret>;

    /// Start watching the lease of `secret`.
    ///
    /// Must be called from within a tokio runtime.
    fn subscribe(&self, secret: Secret) -> Subscription;
}

/// Extends a lease by id.
#[async_trait]
pub trait LeaseRenewal: Send + Sync {
    /// Renew `lease_id` asking for `increment` more time.
    async fn renew_lease(&self, lease_id: &str, increment: Duration) -> VaultResult<Secret>;
}

/// Events yielded by a [`Subscription`].
#[derive(Debug)]
pub enum LeaseEvent {
    /// The lease was extended; carries the renewal response.
    Renewed(Secret),
    /// The lease watch ended. `None` means the lease ran its course and a
    /// fresh secret should be fetched.
    Done(Option<VaultError>),
}

/// Live relationship between one secret's lease and its watcher.
///
/// Yields any number of [`LeaseEvent::Renewed`] followed by exactly one
/// [`LeaseEvent::Done`]. Dropping or stopping the subscription aborts the
/// worker producing the events.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<LeaseEvent>,
    worker: Option<JoinHandle<()>>,
    finished: bool,
}

impl Subscription {
    /// Wrap an event channel and the task feeding it.
    #[must_use]
    pub const fn new(events: mpsc::Receiver<LeaseEvent>, worker: Option<JoinHandle<()>>) -> Self {
        Self {
            events,
            worker,
            finished: false,
        }
    }

    /// Next event, or `None` once the terminal event has been delivered.
    ///
    /// A channel that closes without a terminal event is reported as a
    /// failed renewal.
    pub async fn next(&mut self) -> Option<LeaseEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await.unwrap_or_else(|| {
            LeaseEvent::Done(Some(VaultError::LeaseRenewalFailed(
                "lease watcher exited without a result".to_string(),
            )))
        });
        if matches!(event, LeaseEvent::Done(_)) {
            self.finished = true;
        }
        Some(event)
    }

    /// Stop the worker and discard pending events.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        self.events.close();
        self.finished = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}
