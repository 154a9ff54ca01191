//! Background lease watcher feeding a [`Subscription`].
//!
//! Renews a lease once `1 - renewal_threshold` of its TTL has elapsed. When
//! Vault stops granting the full increment (the role's max TTL is near) or
//! the secret is not renewable, the watcher waits out the same fraction of
//! the remaining TTL and then reports [`LeaseEvent::Done`] without an error so
//! the owner fetches a fresh secret before the old one expires.

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::provider::{LeaseEvent, LeaseRenewal, Subscription};
use crate::retry::RetryPolicy;
use crate::secret::Secret;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 8;

/// Timing and retry behaviour of a lease watcher.
#[derive(Debug, Clone)]
pub struct RenewalPolicy {
    renewal_threshold: f64,
    retry: RetryPolicy,
}

impl RenewalPolicy {
    /// Create a policy; `renewal_threshold` is clamped to 0.1-0.5.
    #[must_use]
    pub fn new(renewal_threshold: f64, retry: RetryPolicy) -> Self {
        Self {
            renewal_threshold: renewal_threshold.clamp(0.1, 0.5),
            retry,
        }
    }

    /// How long to wait before acting on a lease with `ttl` left.
    #[must_use]
    pub fn renew_after(&self, ttl: Duration) -> Duration {
        ttl.mul_f64(1.0 - self.renewal_threshold)
    }

    /// Whether a renewal granting `granted` out of `requested` means the
    /// lease cannot be stretched any further.
    #[must_use]
    pub fn is_exhausted(&self, requested: Duration, granted: Duration) -> bool {
        granted < requested && granted <= requested.mul_f64(self.renewal_threshold)
    }
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self::new(0.2, RetryPolicy::default())
    }
}

impl From<&VaultConfig> for RenewalPolicy {
    fn from(config: &VaultConfig) -> Self {
        Self::new(config.renewal_threshold, RetryPolicy::from(config))
    }
}

/// Spawn a watcher for `secret`'s lease.
///
/// Must be called from within a tokio runtime.
pub fn spawn<L>(renewal: Arc<L>, secret: Secret, policy: RenewalPolicy) -> Subscription
where
    L: LeaseRenewal + ?Sized + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let worker = tokio::spawn(async move {
        let outcome = watch_lease(renewal.as_ref(), &secret, &policy, &tx).await;
        if let Err(err) = &outcome {
            warn!(lease_id = %secret.lease_id, error = %err, "Lease watch failed");
        }
        // Nobody listening any more is fine.
        let _ = tx.send(LeaseEvent::Done(outcome.err())).await;
    });
    Subscription::new(rx, Some(worker))
}

async fn watch_lease<L>(
    renewal: &L,
    secret: &Secret,
    policy: &RenewalPolicy,
    events: &mpsc::Sender<LeaseEvent>,
) -> VaultResult<()>
where
    L: LeaseRenewal + ?Sized,
{
    let increment = secret.lease_ttl();
    if increment.is_zero() {
        debug!(lease_id = %secret.lease_id, "Secret has no TTL, nothing to renew");
        std::future::pending::<()>().await;
    }
    if !secret.is_renewable() {
        debug!(
            lease_id = %secret.lease_id,
            ttl_secs = increment.as_secs(),
            "Secret is not renewable, waiting for it to run out"
        );
        tokio::time::sleep(policy.renew_after(increment)).await;
        return Ok(());
    }

    let mut lease_id = secret.lease_id.clone();
    let mut ttl = increment;
    loop {
        tokio::time::sleep(policy.renew_after(ttl)).await;

        let renewed = {
            let lease = lease_id.as_str();
            policy
                .retry
                .run("lease renewal", move || renewal.renew_lease(lease, increment))
                .await
                .map_err(|e| match e {
                    VaultError::LeaseRenewalFailed(_) => e,
                    other => VaultError::LeaseRenewalFailed(other.to_string()),
                })?
        };

        ttl = renewed.lease_ttl();
        if !renewed.lease_id.is_empty() {
            lease_id.clone_from(&renewed.lease_id);
        }
        debug!(lease_id = %lease_id, ttl_secs = ttl.as_secs(), "Lease renewed");

        if events.send(LeaseEvent::Renewed(renewed)).await.is_err() {
            return Ok(());
        }

        if policy.is_exhausted(increment, ttl) {
            info!(
                lease_id = %lease_id,
                ttl_secs = ttl.as_secs(),
                "Lease reached its maximum TTL, a new secret will be fetched"
            );
            tokio::time::sleep(policy.renew_after(ttl)).await;
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays scripted renewal results and records requests.
    #[derive(Default)]
    struct ScriptedRenewal {
        responses: Mutex<VecDeque<VaultResult<Secret>>>,
        requests: Mutex<Vec<(String, Duration)>>,
    }

    impl ScriptedRenewal {
        fn with(responses: Vec<VaultResult<Secret>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl LeaseRenewal for ScriptedRenewal {
        async fn renew_lease(&self, lease_id: &str, increment: Duration) -> VaultResult<Secret> {
            self.requests.lock().push((lease_id.to_string(), increment));
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(VaultError::unavailable("script exhausted")))
        }
    }

    fn leased(ttl: u64) -> Secret {
        Secret::new()
            .with_field("username", "u1")
            .with_lease("database/creds/app/1", Duration::from_secs(ttl), true)
    }

    fn renewal(ttl: u64) -> VaultResult<Secret> {
        Ok(Secret::new().with_lease("database/creds/app/1", Duration::from_secs(ttl), true))
    }

    fn policy() -> RenewalPolicy {
        RenewalPolicy::new(0.2, RetryPolicy::none())
    }

    #[test]
    fn test_policy_timing() {
        let policy = policy();
        assert_eq!(policy.renew_after(Duration::from_secs(100)), Duration::from_secs(80));
        assert!(!policy.is_exhausted(Duration::from_secs(100), Duration::from_secs(100)));
        assert!(!policy.is_exhausted(Duration::from_secs(100), Duration::from_secs(50)));
        assert!(policy.is_exhausted(Duration::from_secs(100), Duration::from_secs(20)));
    }

    #[test]
    fn test_threshold_clamped() {
        let policy = RenewalPolicy::new(0.9, RetryPolicy::none());
        assert_eq!(policy.renew_after(Duration::from_secs(10)), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_renews_then_finishes_at_max_ttl() {
        let renewer = ScriptedRenewal::with(vec![renewal(100), renewal(10)]);
        let mut subscription = spawn(renewer.clone(), leased(100), policy());

        let Some(LeaseEvent::Renewed(first)) = subscription.next().await else {
            panic!("expected a renewal");
        };
        assert_eq!(first.lease_duration, 100);

        let Some(LeaseEvent::Renewed(second)) = subscription.next().await else {
            panic!("expected a renewal");
        };
        assert_eq!(second.lease_duration, 10);

        assert!(matches!(subscription.next().await, Some(LeaseEvent::Done(None))));
        assert!(subscription.next().await.is_none());

        let requests = renewer.requests.lock().clone();
        assert_eq!(requests.len(), 2);
        assert!(requests
            .iter()
            .all(|(id, inc)| id == "database/creds/app/1" && *inc == Duration::from_secs(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_failure_ends_with_error() {
        let renewer = ScriptedRenewal::with(vec![Err(VaultError::PermissionDenied(
            "sys/leases/renew".to_string(),
        ))]);
        let mut subscription = spawn(renewer, leased(30), policy());

        match subscription.next().await {
            Some(LeaseEvent::Done(Some(VaultError::LeaseRenewalFailed(msg)))) => {
                assert!(msg.contains("Permission denied"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_renewable_secret_expires_normally() {
        let renewer = ScriptedRenewal::with(vec![]);
        let secret = Secret::new()
            .with_field("username", "u1")
            .with_lease("database/creds/app/2", Duration::from_secs(60), false);

        let start = tokio::time::Instant::now();
        let mut subscription = spawn(renewer.clone(), secret, policy());

        assert!(matches!(subscription.next().await, Some(LeaseEvent::Done(None))));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(48) && elapsed < Duration::from_secs(49));
        assert!(renewer.requests.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_secret_never_finishes() {
        let renewer = ScriptedRenewal::with(vec![]);
        let mut subscription = spawn(renewer, Secret::new().with_field("username", "u"), policy());

        let waited = tokio::time::timeout(Duration::from_secs(3600), subscription.next()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_watcher() {
        let renewer = ScriptedRenewal::with(vec![renewal(100)]);
        let mut subscription = spawn(renewer.clone(), leased(100), policy());

        subscription.stop();
        tokio::time::sleep(Duration::from_secs(500)).await;
        assert!(renewer.requests.lock().is_empty());
    }
}
