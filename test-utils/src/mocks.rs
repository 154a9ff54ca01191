//! Mock implementations for testing.
//!
//! [`MockSecretProvider`] replays scripted fetch results and hands every
//! subscription it creates to the test as a [`LeaseController`], which then
//! decides when leases renew, expire or fail.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use vault_sql::{Driver, LeaseEvent, Secret, SecretProvider, Subscription, VaultError, VaultResult};

const EVENT_BUFFER: usize = 8;

/// Secret provider driven entirely by the test.
#[derive(Debug)]
pub struct MockSecretProvider {
    fetches: Mutex<VecDeque<VaultResult<Secret>>>,
    fetch_count: AtomicUsize,
    controllers_tx: mpsc::UnboundedSender<LeaseController>,
    controllers_rx: Mutex<mpsc::UnboundedReceiver<LeaseController>>,
}

impl MockSecretProvider {
    /// Create a provider answering fetches with `fetches`, in order.
    ///
    /// Fetches beyond the script fail with [`VaultError::Unavailable`].
    #[must_use]
    pub fn new(fetches: Vec<VaultResult<Secret>>) -> Self {
        let (controllers_tx, controllers_rx) = mpsc::unbounded_channel();
        Self {
            fetches: Mutex::new(fetches.into()),
            fetch_count: AtomicUsize::new(0),
            controllers_tx,
            controllers_rx: Mutex::new(controllers_rx),
        }
    }

    /// Append a fetch result to the script.
    pub async fn push_fetch(&self, result: VaultResult<Secret>) {
        self.fetches.lock().await.push_back(result);
    }

    /// Number of fetches served so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Controller of the next subscription, waiting up to a second for it
    /// to be created.
    pub async fn next_subscription(&self) -> Option<LeaseController> {
        let mut controllers = self.controllers_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(1), controllers.recv())
            .await
            .ok()
            .flatten()
    }

    /// Controller of a subscription that has already been created, if any.
    pub async fn try_next_subscription(&self) -> Option<LeaseController> {
        self.controllers_rx.lock().await.try_recv().ok()
    }
}

#[async_trait]
impl SecretProvider for MockSecretProvider {
    async fn fetch(&self, _path: &str) -> VaultResult<Secret> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.fetches
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(VaultError::unavailable("no scripted secret left")))
    }

    fn subscribe(&self, secret: Secret) -> Subscription {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        // The test may have stopped listening; the subscription still works.
        let _ = self.controllers_tx.send(LeaseController { events: tx, secret });
        Subscription::new(rx, None)
    }
}

/// Test side of one subscription.
#[derive(Debug)]
pub struct LeaseController {
    events: mpsc::Sender<LeaseEvent>,
    secret: Secret,
}

impl LeaseController {
    /// The secret whose lease is being watched.
    #[must_use]
    pub const fn secret(&self) -> &Secret {
        &self.secret
    }

    /// Deliver a renewal. Returns false if the subscription is gone.
    pub async fn renew(&self, secret: Secret) -> bool {
        self.events.send(LeaseEvent::Renewed(secret)).await.is_ok()
    }

    /// End the lease normally.
    pub async fn expire(&self) -> bool {
        self.events.send(LeaseEvent::Done(None)).await.is_ok()
    }

    /// End the lease with `err`.
    pub async fn fail(&self, err: VaultError) -> bool {
        self.events.send(LeaseEvent::Done(Some(err))).await.is_ok()
    }

    /// Whether the subscription has been stopped or dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Connection produced by [`RecordingDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedConnection {
    /// Connection string the driver was given
    pub dsn: String,
}

/// Driver that records the connection strings it receives.
///
/// Like a real driver handed an unfilled template, it rejects any address
/// that still contains `{{`.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    dsns: Mutex<Vec<String>>,
    refuse: Option<String>,
}

impl RecordingDriver {
    /// Create a driver that accepts every well-formed address.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a driver that refuses every connection with `message`.
    #[must_use]
    pub fn refusing(message: impl Into<String>) -> Self {
        Self {
            dsns: Mutex::default(),
            refuse: Some(message.into()),
        }
    }

    /// Every connection string received, in order.
    pub async fn dsns(&self) -> Vec<String> {
        self.dsns.lock().await.clone()
    }
}

#[async_trait]
impl Driver<RecordedConnection> for RecordingDriver {
    async fn connect(&self, dsn: &str) -> anyhow::Result<RecordedConnection> {
        self.dsns.lock().await.push(dsn.to_string());
        if let Some(message) = &self.refuse {
            anyhow::bail!("{message}");
        }
        if dsn.contains("{{") {
            anyhow::bail!("malformed address: {dsn}");
        }
        Ok(RecordedConnection {
            dsn: dsn.to_string(),
        })
    }
}
