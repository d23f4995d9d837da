//! Distributed lock acquisition with busy-wait-and-retry (§4.2).
//!
//! `LockFactory::try_acquire` is non-blocking by contract (`None` means
//! "held elsewhere, try again"); this module supplies the blocking loop
//! around it, with a fixed back-off and cancellation observed at every
//! suspension point.

use tracing::debug;

use crate::ctx::Context;
use crate::error::{ProviderError, ProviderResult};
use crate::interfaces::{Lock, LockFactory};

/// Block until `key` is acquired or `ctx` is cancelled, retrying every
/// `retry_interval` on contention. Any error the lock service itself
/// returns (as opposed to ordinary `Ok(None)` contention) is surfaced as
/// [`ProviderError::LockUnavailable`].
pub async fn acquire_with_retry(
    factory: &(dyn LockFactory),
    key: &str,
    retry_interval: std::time::Duration,
    ctx: &Context,
) -> ProviderResult<Box<dyn Lock>> {
    loop {
        ctx.check()?;
        match factory.try_acquire(key).await {
            Ok(Some(lock)) => return Ok(lock),
            Ok(None) => {
                debug!(key, "lock contended, retrying");
                tokio::time::sleep(retry_interval).await;
            }
            Err(err) => return Err(ProviderError::LockUnavailable(err.to_string())),
        }
    }
}
