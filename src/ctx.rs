//! A minimal cancellation context.
//!
//! Every suspension point in this crate (lock acquisition, runtime RPCs,
//! DB calls, volume streaming) takes a `&Context` and observes it. This
//! isn't a generic executor abstraction -- just a cooperative cancellation
//! flag cheap enough to clone and check on every `await`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ProviderError, ProviderResult};

#[derive(Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(ProviderError::Cancelled)` if cancellation was
    /// requested. Call this at every suspension point.
    pub fn check(&self) -> ProviderResult<()> {
        if self.is_cancelled() {
            Err(ProviderError::Cancelled)
        } else {
            Ok(())
        }
    }
}
