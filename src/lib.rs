//! Reconciles a persistent workload database, a remote container
//! runtime, and a remote volume server into a ready-to-use container.
//!
//! The hard part is combining idempotent find-or-create across three
//! independently-failing systems with a distributed lock that serializes
//! concurrent creators racing on the same logical container, plus a
//! volume topology computation with strict path-nesting and ordering
//! rules.
//!
//! Everything this crate talks to -- the runtime, the volume service,
//! the database, the distributed lock, the image pipeline -- is an
//! external collaborator, reached only through the traits in
//! [`interfaces`]. This crate owns none of their implementations; it
//! owns the reconciliation logic that sits between them.
//!
//! Entry points: [`reconciler::ContainerProvider::find_or_create_container`]
//! and [`lookup::find_created_container_by_handle`].

pub mod ctx;
pub mod error;
pub mod factory;
pub mod handle;
pub mod interfaces;
pub mod lock_gate;
pub mod logging;
pub mod lookup;
pub mod options;
pub mod planner;
pub mod reconciler;
pub mod runtime_spec;
pub mod spec;
pub mod volume;

#[cfg(test)]
pub mod testutil;

pub use error::{ProviderError, ProviderResult};
pub use handle::Container;
pub use options::ProviderOptions;
pub use reconciler::ContainerProvider;
