//! Request-side data model: `ContainerSpec`, `InputSource`, limits, image
//! specs and the opaque bags threaded through to collaborators.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;
use crate::volume::Volume;

pub type TeamId = u64;

/// Mapping from output name to absolute destination path. A `BTreeMap`
/// gives deterministic iteration for free, though the planner only ever
/// consumes the *values* -- names are provenance, not part of the mount
/// ordering contract (SPEC_FULL supplement #1).
pub type OutputPaths = BTreeMap<String, String>;

/// Opaque, not-yet-fetched resource descriptor for `ImageSpec::Resource`.
/// Source/params/version are left as JSON blobs: the core never
/// interprets them, it only forwards them to the image factory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageResource {
    pub resource_type: String,
    pub source: serde_json::Value,
    pub params: Option<serde_json::Value>,
    pub version: Option<serde_json::Value>,
}

/// An image that has already been resolved to a concrete rootfs URL
/// (skips the image factory's fetch step).
#[derive(Debug, Clone)]
pub struct PreResolvedImage {
    pub url: String,
    pub privileged: bool,
}

#[derive(Debug, Clone)]
pub enum ImageSpec {
    Resource(ImageResource),
    PreResolved(PreResolvedImage),
}

/// A destination some data needs to land at, plus the capability pair
/// that can get it there (`ArtifactSource`'s `locate`/`stream` below).
#[derive(Clone)]
pub struct InputSource {
    pub destination_path: String,
    pub source: Arc<dyn ArtifactSource>,
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSource")
            .field("destination_path", &self.destination_path)
            .finish()
    }
}

/// Accepts a streamed-in tar-like payload. Implemented by whatever wraps a
/// container volume's `stream_in` capability.
#[async_trait]
pub trait ArtifactDestination: Send + Sync {
    async fn stream_in(&self, path: &str, data: &[u8]) -> ProviderResult<()>;
}

/// A logical handle to data a step needs. `volume_on` is capability (a):
/// "do you already have a volume on this worker?" -- a `Some` result
/// classifies the input as local (cloned via COW); a `None` result
/// classifies it as remote (must be streamed in after the container
/// volume exists). `stream_to` is capability (b).
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn volume_on(&self, worker: &str) -> ProviderResult<Option<Arc<dyn Volume>>>;
    async fn stream_to(&self, destination: &(dyn ArtifactDestination + Sync)) -> ProviderResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
    Ro,
    Rw,
}

/// An explicit, caller-supplied bind mount -- not backed by a created
/// volume at all, emitted first and in caller order (rule 7).
#[derive(Debug, Clone)]
pub struct ExtraBindMount {
    pub src_path: String,
    pub dst_path: String,
    pub mode: MountMode,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerLimits {
    pub cpu: Option<u64>,
    pub memory: Option<u64>,
}

/// The request: everything needed to materialize a container once an
/// image has been fetched.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub team_id: TeamId,
    pub image_spec: ImageSpec,
    pub user: String,
    pub env: Vec<String>,
    pub work_dir: String,
    pub inputs: Vec<InputSource>,
    pub outputs: OutputPaths,
    pub bind_mounts: Vec<ExtraBindMount>,
    pub limits: ContainerLimits,
}

/// Forwarded opaquely to the image factory alongside `ContainerSpec`
/// (SPEC_FULL supplement #2) -- the original source passes both a
/// `WorkerSpec` and a bare `resourceTypes` parameter into
/// `FindOrCreateContainer`; they are allowed to diverge (e.g. a
/// resource-type check container created on behalf of a different team
/// than the one whose resource config it reads).
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub team_id: TeamId,
    pub resource_type: Option<String>,
}

/// Opaque to this layer: versioned resource-type configs threaded through
/// to the image factory, never interpreted here.
pub type ResourceTypes = serde_json::Value;

/// Opaque bag of provenance attributes persisted with the DB entity.
/// Stored as a JSON blob for flexibility with queryable columns, the same
/// pattern `db/mod.rs` uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerMetadata(pub BTreeMap<String, String>);

impl ContainerMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

/// "What logical thing owns this container" -- opaque beyond producing a
/// stable key, which the DB uses for its `(owner, worker)` uniqueness
/// guarantee.
pub trait ContainerOwner: Send + Sync {
    fn key(&self) -> String;
}

impl fmt::Debug for dyn ContainerOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerOwner({})", self.key())
    }
}

/// Opaque passthrough to the image factory -- credential/secret
/// resolution lives entirely in the implementation behind this trait,
/// out of scope for the core (§1).
pub trait ImageFetchingDelegate: Send + Sync {}
