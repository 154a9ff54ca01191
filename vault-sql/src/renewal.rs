//! Credential renewal loop.
//!
//! Keeps the [`SnapshotStore`] fed for as long as its [`RenewalHandle`] is
//! alive. The first fetch happens in [`RenewalLoop::start`] so callers learn
//! immediately when no secret can be obtained; everything after that runs on
//! a background task:
//!
//! ```text
//!  start ──fetch ok──▶ Renewing ──Renewed──▶ merge, stay Renewing
//!                          │
//!                          ├──Done(None)──▶ Fetching ──ok──▶ Renewing
//!                          │                   └──err──▶ Stopped(err)
//!                          ├──Done(err)───▶ Stopped(err)
//!                          └──stop()──────▶ Stopped(None)
//! ```

use crate::error::{VaultError, VaultResult};
use crate::provider::{LeaseEvent, SecretProvider, Subscription};
use crate::retry::RetryPolicy;
use crate::snapshot::SnapshotStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Observable state of a renewal loop.
#[derive(Debug, Clone)]
pub enum LoopState {
    /// Fetching a fresh secret after the previous lease ended.
    Fetching,
    /// Watching the lease of the current secret.
    Renewing {
        /// Lease being kept alive
        lease_id: String,
    },
    /// The loop has exited; `Some` carries the failure that ended it.
    Stopped(Option<Arc<VaultError>>),
}

impl LoopState {
    /// Whether the loop has exited.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }
}

/// Entry point for starting a renewal loop.
pub struct RenewalLoop {
    provider: Arc<dyn SecretProvider>,
    store: Arc<SnapshotStore>,
    secret_path: String,
    refetch_retry: RetryPolicy,
}

impl RenewalLoop {
    /// Prepare a loop that leases `secret_path` from `provider` into `store`.
    #[must_use]
    pub fn new(
        provider: Arc<dyn SecretProvider>,
        store: Arc<SnapshotStore>,
        secret_path: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            secret_path: secret_path.into(),
            refetch_retry: RetryPolicy::default(),
        }
    }

    /// Retry policy for fetches after a lease has ended. The first fetch is
    /// never retried.
    #[must_use]
    pub fn with_refetch_retry(mut self, retry: RetryPolicy) -> Self {
        self.refetch_retry = retry;
        self
    }

    /// Fetch the first secret, publish it, and start renewing in the
    /// background.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; no background task is started in that case.
    pub async fn start(self) -> VaultResult<RenewalHandle> {
        let secret = self.provider.fetch(&self.secret_path).await?;
        info!(
            path = %self.secret_path,
            lease_id = %secret.lease_id,
            ttl_secs = secret.lease_duration,
            "Fetched initial secret"
        );
        self.store.replace(secret.credential_fields());

        let (state_tx, state_rx) = watch::channel(LoopState::Renewing {
            lease_id: secret.lease_id.clone(),
        });
        let (stop_tx, stop_rx) = watch::channel(false);
        let subscription = self.provider.subscribe(secret);

        let worker = Worker {
            provider: self.provider,
            store: self.store,
            secret_path: self.secret_path,
            refetch_retry: self.refetch_retry,
            state: state_tx,
        };
        let task = tokio::spawn(worker.run(subscription, stop_rx));

        Ok(RenewalHandle {
            state: state_rx,
            stop: stop_tx,
            task: Some(task),
        })
    }
}

/// Owner's view of a running renewal loop.
///
/// Dropping the handle stops the loop.
#[derive(Debug)]
pub struct RenewalHandle {
    state: watch::Receiver<LoopState>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RenewalHandle {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> LoopState {
        self.state.borrow().clone()
    }

    /// A receiver notified on every state change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.clone()
    }

    /// The error that stopped the loop, if any.
    #[must_use]
    pub fn failure(&self) -> Option<Arc<VaultError>> {
        match &*self.state.borrow() {
            LoopState::Stopped(err) => err.clone(),
            _ => None,
        }
    }

    /// Wait until the loop stops and return the error that stopped it.
    pub async fn stopped(&self) -> Option<Arc<VaultError>> {
        let mut state = self.state.clone();
        let result = state.wait_for(LoopState::is_stopped).await;
        match result {
            Ok(state) => match &*state {
                LoopState::Stopped(err) => err.clone(),
                _ => None,
            },
            Err(_) => None,
        }
    }

    /// Ask the loop to stop at its next iteration boundary.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "Renewal loop task ended abnormally");
            }
        }
    }
}

impl Drop for RenewalHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    provider: Arc<dyn SecretProvider>,
    store: Arc<SnapshotStore>,
    secret_path: String,
    refetch_retry: RetryPolicy,
    state: watch::Sender<LoopState>,
}

impl Worker {
    async fn run(self, mut subscription: Subscription, mut stop: watch::Receiver<bool>) {
        let outcome = loop {
            let event = tokio::select! {
                _ = stop_requested(&mut stop) => break None,
                event = subscription.next() => event,
            };

            match event {
                Some(LeaseEvent::Renewed(secret)) => {
                    debug!(lease_id = %secret.lease_id, "Merging renewed secret");
                    self.store.merge(&secret.credential_fields());
                }
                Some(LeaseEvent::Done(None)) => {
                    info!(path = %self.secret_path, "Lease ended, fetching a new secret");
                    subscription.stop();
                    self.state.send_replace(LoopState::Fetching);

                    let fetched = tokio::select! {
                        _ = stop_requested(&mut stop) => break None,
                        fetched = self.refetch() => fetched,
                    };
                    match fetched {
                        Ok(next) => subscription = next,
                        Err(err) => break Some(err),
                    }
                }
                Some(LeaseEvent::Done(Some(err))) => break Some(err),
                None => {
                    break Some(VaultError::LeaseRenewalFailed(
                        "subscription ended unexpectedly".to_string(),
                    ));
                }
            }
        };

        subscription.stop();
        match &outcome {
            Some(err) => error!(path = %self.secret_path, error = %err, "Renewal loop stopped"),
            None => info!(path = %self.secret_path, "Renewal loop stopped"),
        }
        self.state
            .send_replace(LoopState::Stopped(outcome.map(Arc::new)));
    }

    async fn refetch(&self) -> VaultResult<Subscription> {
        let provider = self.provider.as_ref();
        let path = self.secret_path.as_str();
        let secret = self
            .refetch_retry
            .run("secret fetch", move || provider.fetch(path))
            .await?;

        info!(
            path = %self.secret_path,
            lease_id = %secret.lease_id,
            ttl_secs = secret.lease_duration,
            "Fetched new secret"
        );
        self.store.replace(secret.credential_fields());
        self.state.send_replace(LoopState::Renewing {
            lease_id: secret.lease_id.clone(),
        });
        Ok(self.provider.subscribe(secret))
    }
}

/// Resolves once a stop has been requested or the handle is gone.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    // An Err means the sender was dropped, which also means stop.
    let _ = stop.wait_for(|stop| *stop).await;
}
