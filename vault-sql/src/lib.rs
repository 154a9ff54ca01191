//! Database connectors whose credentials come from HashiCorp Vault.
//!
//! A [`VaultConnector`] fetches a leased secret (for example from Vault's
//! database secrets engine), keeps the lease alive in the background, and
//! fills `{{field}}` placeholders of a connection string template with the
//! secret's current fields every time a connection is opened. Nothing is
//! written to disk.
//!
//! Drivers are wired up through a [`DriverRegistry`]: register the real
//! driver under its name, then call
//! [`DriverRegistry::register_vault_variant`] to expose it as
//! `vault-<name>`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod provider;
pub mod registry;
pub mod renewal;
pub mod renewer;
pub mod retry;
pub mod secret;
pub mod snapshot;
pub mod telemetry;
pub mod template;

pub use client::VaultClient;
pub use config::VaultConfig;
pub use connector::{Connector, Driver, DsnConnector, VaultConnector};
pub use error::{VaultError, VaultResult};
pub use provider::{LeaseEvent, LeaseRenewal, SecretProvider, Subscription};
pub use registry::{DriverRegistry, VaultDriver, vault_driver_name};
pub use renewal::{LoopState, RenewalHandle, RenewalLoop};
pub use retry::RetryPolicy;
pub use secret::Secret;
pub use snapshot::{Snapshot, SnapshotStore};
