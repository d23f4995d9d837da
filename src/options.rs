//! In-process configuration knobs.
//!
//! No CLI, no env vars, no file formats are defined at this layer (per the
//! scope of the core) -- this is just the handful of tunables the
//! reconciler and lock gate need, in the shape of `runtime/options.rs`'s
//! `BoxliteOptions`.

use std::time::Duration;

/// Configuration for a [`crate::reconciler::ContainerProvider`].
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// Fixed back-off between lock acquisition attempts (§4.2).
    pub lock_retry_interval: Duration,
    /// Process user used by [`crate::handle::Container::run`] when neither
    /// the caller nor the runtime's `user` property supplies one (P7).
    pub default_user: String,
    /// Well-known handle the provider looks up on the worker's volume
    /// client to find its certs volume (§4.3).
    pub certs_volume_handle: String,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            lock_retry_interval: Duration::from_millis(100),
            default_user: "root".to_string(),
            certs_volume_handle: "certs".to_string(),
        }
    }
}
