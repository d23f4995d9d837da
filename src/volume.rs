//! Volume data model: strategies, specs and the live `Volume` handle.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderResult;

/// How a volume's contents should be populated at creation time.
#[derive(Clone)]
pub enum VolumeStrategy {
    /// A fresh, empty volume.
    Empty,
    /// A copy-on-write child of an already-located volume. Carries the
    /// concrete parent volume, not merely its handle, because the volume
    /// client's `find_or_create_cow_volume_for_container` call is made
    /// against that live object (see SPEC_FULL supplement #6).
    Cow(Arc<dyn Volume>),
    /// Populate from a host path. Not produced by the planner for any of
    /// the rules in §4.3 -- modeled for fidelity with the DATA MODEL
    /// section's `{strategy, privileged}` shape, available to collaborator
    /// implementations that need it (see DESIGN.md).
    Import(String),
}

impl fmt::Debug for VolumeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeStrategy::Empty => write!(f, "Empty"),
            VolumeStrategy::Cow(parent) => write!(f, "Cow({})", parent.handle()),
            VolumeStrategy::Import(path) => write!(f, "Import({path})"),
        }
    }
}

impl PartialEq for VolumeStrategy {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (VolumeStrategy::Empty, VolumeStrategy::Empty) => true,
            (VolumeStrategy::Cow(a), VolumeStrategy::Cow(b)) => a.handle() == b.handle(),
            (VolumeStrategy::Import(a), VolumeStrategy::Import(b)) => a == b,
            _ => false,
        }
    }
}

/// `{strategy, privileged}` -- privilege is derived once from the fetched
/// image and propagated to every volume created for the container (rule 8).
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeSpec {
    pub strategy: VolumeStrategy,
    pub privileged: bool,
}

/// A live volume, as returned by the volume client or resolved from a DB
/// volume record.
#[async_trait]
pub trait Volume: Send + Sync {
    /// Opaque identifier assigned by the volume service.
    fn handle(&self) -> &str;
    /// Host-side path backing this volume, used as a bind-mount source.
    fn path(&self) -> &str;
    /// Write a tar-like stream into this volume at `path`.
    async fn stream_in(&self, path: &str, data: &[u8]) -> ProviderResult<()>;
}

/// One entry of [`crate::handle::Container::volume_mounts`]'s result.
/// Unordered by contract (SPEC_FULL supplement #5): callers must not rely
/// on a particular iteration order.
#[derive(Clone)]
pub struct VolumeMount {
    pub volume: Arc<dyn Volume>,
    pub mount_path: String,
}

impl fmt::Debug for VolumeMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeMount")
            .field("volume", &self.volume.handle())
            .field("mount_path", &self.mount_path)
            .finish()
    }
}
