//! Error kinds for the container provider.
//!
//! Mirrors the error-kind taxonomy a `boxlite`-style crate keeps at its
//! domain boundary: one variant per failure *kind*, with collaborator
//! errors folded in as strings rather than leaking foreign error types
//! across the trait objects in `interfaces`.

use thiserror::Error;

/// Errors produced while reconciling a container across DB, runtime and
/// volume state.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The DB row for this container is `created`, but the runtime has no
    /// matching container. The container was destroyed out-of-band; this
    /// layer does not auto-recreate it.
    #[error("container not found in runtime")]
    ContainerNotFound,

    /// A DB-recorded volume handle could not be resolved via the volume
    /// client.
    #[error("volume not found: {0}")]
    VolumeNotFound(String),

    /// A malformed spec or an unknown mount path during planning. Always
    /// the caller's bug, never retried.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// The caller's context was cancelled while a suspension point was in
    /// flight.
    #[error("operation cancelled")]
    Cancelled,

    /// The container runtime RPC failed.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// The volume service RPC failed.
    #[error("volume service error: {0}")]
    Volume(String),

    /// The database RPC failed.
    #[error("database error: {0}")]
    Database(String),

    /// The distributed lock service RPC failed (distinct from ordinary
    /// contention, which `try_acquire` reports as `Ok(None)` and
    /// [`crate::lock_gate`] retries).
    #[error("lock unavailable: {0}")]
    LockUnavailable(String),

    /// Catch-all for invariant violations that indicate a bug in this
    /// layer or an inconsistent collaborator response.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;
