//! External collaborator boundaries (§1): runtime, volume service, DB and
//! distributed lock. All out of scope to implement -- this module only
//! states the traits the reconciler is written against. Concrete
//! implementations live with whoever embeds this crate; fakes for tests
//! live in [`crate::testutil`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderResult;
use crate::runtime_spec::{ProcessIo, ProcessSpec, RuntimeContainerSpec};
use crate::spec::{ContainerMetadata, TeamId};
use crate::volume::{Volume, VolumeSpec};

/// The container runtime (Garden/boxlite-runtime-equivalent): creates,
/// looks up and destroys containers given an already-assembled spec.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    async fn create(&self, spec: RuntimeContainerSpec) -> ProviderResult<Arc<dyn RuntimeContainer>>;
    async fn lookup(&self, handle: &str) -> ProviderResult<Option<Arc<dyn RuntimeContainer>>>;
}

/// A container as the runtime sees it, independent of any DB row.
#[async_trait]
pub trait RuntimeContainer: Send + Sync {
    fn handle(&self) -> &str;
    async fn run(&self, process: ProcessSpec, io: ProcessIo) -> ProviderResult<()>;
    async fn destroy(&self) -> ProviderResult<()>;
    /// The volumes actually mounted into this container, as reported by
    /// the runtime -- unordered (SPEC_FULL supplement #5).
    async fn volume_mounts(&self) -> ProviderResult<Vec<crate::volume::VolumeMount>>;
}

/// The per-worker volume service: creates volumes from a [`VolumeSpec`]
/// and resolves well-known handles such as the certs volume.
#[async_trait]
pub trait VolumeClient: Send + Sync {
    async fn find_or_create_volume_for_container(
        &self,
        handle: &str,
        spec: &VolumeSpec,
    ) -> ProviderResult<Arc<dyn Volume>>;

    async fn find_or_create_cow_volume_for_container(
        &self,
        handle: &str,
        parent: &Arc<dyn Volume>,
        privileged: bool,
    ) -> ProviderResult<Arc<dyn Volume>>;

    async fn lookup_volume(&self, handle: &str) -> ProviderResult<Option<Arc<dyn Volume>>>;
}

/// State a DB container row can be in as far as this crate is concerned
/// (§3). The DB layer owns the actual state machine storage; this trait
/// only exposes the `creating` row's two legal transitions.
#[async_trait]
pub trait CreatingContainer: Send + Sync {
    fn handle(&self) -> &str;
    /// Transition `creating -> created`, recording the runtime handle and
    /// the volumes produced by the plan. Called exactly once per row.
    async fn created(
        &self,
        metadata: ContainerMetadata,
        volumes: Vec<CreatedVolumeRecord>,
    ) -> ProviderResult<Arc<dyn CreatedContainer>>;
    /// Transition `creating -> failed`. Called exactly once per row, on
    /// any error encountered while materializing the container (P6).
    async fn failed(&self) -> ProviderResult<()>;
}

/// A DB row in the `created` state.
#[async_trait]
pub trait CreatedContainer: Send + Sync {
    fn handle(&self) -> &str;
    fn metadata(&self) -> ContainerMetadata;
}

/// What [`DbTeam::find_container_on_worker`] found, mirroring the DB
/// state machine's three observable states (§3).
pub enum ContainerOnWorker {
    Creating(Arc<dyn CreatingContainer>),
    Created(Arc<dyn CreatedContainer>),
    Absent,
}

/// The team-scoped slice of the DB used to find or create a container row.
#[async_trait]
pub trait DbTeam: Send + Sync {
    async fn find_container_on_worker(
        &self,
        owner_key: &str,
        worker: &str,
    ) -> ProviderResult<ContainerOnWorker>;

    /// Insert a fresh `creating` row. The caller has already verified no
    /// row exists for `(owner_key, worker)` -- insertion races are the
    /// DB's problem, not this crate's (§1).
    async fn create_creating_container(
        &self,
        owner_key: &str,
        worker: &str,
    ) -> ProviderResult<Arc<dyn CreatingContainer>>;

    /// §6's `FindCreatedContainerByHandle(handle) → (created, found, err)`,
    /// scoped to this team. Used by [`crate::lookup`] to resolve the DB row
    /// and its real metadata for a runtime handle the caller already knows
    /// about.
    async fn find_created_container_by_handle(
        &self,
        handle: &str,
    ) -> ProviderResult<Option<Arc<dyn CreatedContainer>>>;
}

/// Resolves a [`TeamId`] to its [`DbTeam`] handle.
#[async_trait]
pub trait DbTeamFactory: Send + Sync {
    async fn team(&self, team_id: TeamId) -> ProviderResult<Arc<dyn DbTeam>>;
}

/// A volume row recorded in the DB alongside a created container: which
/// mount path it backs and the opaque handle the volume client resolves
/// it by. The live [`Volume`] object is resolved on demand, never stored
/// (§9 "Cyclic ownership avoidance").
#[derive(Debug, Clone)]
pub struct CreatedVolumeRecord {
    pub mount_path: String,
    pub handle: String,
}

/// DB-side volume bookkeeping, queried by [`crate::lookup`] when
/// reattaching to an already-`created` row.
#[async_trait]
pub trait DbVolumeRepository: Send + Sync {
    async fn volumes_for_container(&self, handle: &str) -> ProviderResult<Vec<CreatedVolumeRecord>>;
}

/// A held distributed lock, released on drop per the lock factory's
/// implementation.
pub trait Lock: Send + Sync {}

/// Per-key distributed lock acquisition (§4.2): `try_acquire` returns
/// `None` rather than blocking, leaving retry/backoff to
/// [`crate::lock_gate`].
#[async_trait]
pub trait LockFactory: Send + Sync {
    async fn try_acquire(&self, key: &str) -> ProviderResult<Option<Box<dyn Lock>>>;
}

/// Metadata describing a fetched image, independent of how it was
/// fetched.
#[derive(Debug, Clone, Default)]
pub struct ImageMetadata {
    pub privileged: bool,
    pub env: Vec<String>,
}

/// A resolved, ready-to-mount image.
pub trait Image: Send + Sync {
    fn root_fs_path(&self) -> &str;
    fn metadata(&self) -> &ImageMetadata;
}

/// An image together with the volume it was materialized onto, when the
/// image factory backs images with volumes (so the planner can treat the
/// image's volume as any other COW parent).
pub struct FetchedImage {
    pub image: Arc<dyn Image>,
    pub volume: Option<Arc<dyn Volume>>,
}

/// Resolves an [`crate::spec::ImageSpec`] to a [`FetchedImage`] on a
/// specific worker, scoped to a team and a set of resource-type configs.
/// Out of scope to implement (§1): credential handling, registry access
/// and caching all live behind this boundary; `resource_types` is
/// forwarded opaquely.
#[async_trait]
pub trait ImageFactory: Send + Sync {
    async fn fetch(
        &self,
        spec: &crate::spec::ImageSpec,
        worker: &str,
        team_id: TeamId,
        resource_types: &crate::spec::ResourceTypes,
    ) -> ProviderResult<FetchedImage>;
}
