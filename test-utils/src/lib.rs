//! Shared test utilities for vault-sql.
//!
//! This crate provides:
//! - A scripted secret provider and a recording driver
//! - Canned Vault responses and secrets
//! - Proptest generators for credential fields and templates

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;

use std::future::Future;
use std::time::Duration;

/// Poll `check` every few milliseconds until it returns true or `timeout`
/// elapses. Returns the last result.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
