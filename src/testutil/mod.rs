//! Hand-rolled fake collaborators for exercising the reconciler end to
//! end without a real DB, runtime or volume service. No mock-generation
//! crate is used here -- each fake is a small, directly-readable struct
//! with `*_returns`/`*_calls` style configuration points, in the same
//! spirit as the Go `workerfakes`/`dbfakes` packages this crate's design
//! is grounded on.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use ulid::Ulid;

use crate::error::{ProviderError, ProviderResult};
use crate::interfaces::{
    ContainerOnWorker, CreatedContainer, CreatedVolumeRecord, CreatingContainer, DbTeam, DbTeamFactory,
    DbVolumeRepository, FetchedImage, Image, ImageFactory, ImageMetadata, Lock, LockFactory, RuntimeClient,
    RuntimeContainer,
};
use crate::runtime_spec::{ProcessIo, ProcessSpec, RuntimeContainerSpec};
use crate::spec::{ContainerMetadata, ContainerOwner, ImageSpec, ResourceTypes, TeamId};
use crate::volume::{Volume, VolumeMount, VolumeSpec};

fn fresh_handle(prefix: &str) -> String {
    format!("{prefix}-{}", Ulid::new())
}

// --- Volume ---------------------------------------------------------

pub struct FakeVolume {
    pub handle: String,
    pub path: String,
    pub streamed: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeVolume {
    pub fn new(handle: impl Into<String>) -> Arc<Self> {
        let handle = handle.into();
        Arc::new(Self {
            path: format!("/volumes/{handle}"),
            handle,
            streamed: Mutex::new(vec![]),
        })
    }
}

#[async_trait]
impl Volume for FakeVolume {
    fn handle(&self) -> &str {
        &self.handle
    }
    fn path(&self) -> &str {
        &self.path
    }
    async fn stream_in(&self, path: &str, data: &[u8]) -> ProviderResult<()> {
        self.streamed.lock().push((path.to_string(), data.to_vec()));
        Ok(())
    }
}

// --- VolumeClient ----------------------------------------------------

#[derive(Default)]
pub struct FakeVolumeClient {
    pub volumes: Mutex<BTreeMap<String, Arc<dyn Volume>>>,
    pub certs_handle: Option<String>,
}

impl FakeVolumeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_certs_volume(handle: impl Into<String>) -> Self {
        let handle = handle.into();
        let mut client = Self::new();
        let volume = FakeVolume::new(handle.clone());
        client.volumes.get_mut().insert(handle.clone(), volume);
        client.certs_handle = Some(handle);
        client
    }
}

#[async_trait]
impl crate::interfaces::VolumeClient for FakeVolumeClient {
    async fn find_or_create_volume_for_container(
        &self,
        handle: &str,
        _spec: &VolumeSpec,
    ) -> ProviderResult<Arc<dyn Volume>> {
        let volume = FakeVolume::new(fresh_handle(&format!("{handle}-vol")));
        self.volumes.lock().insert(volume.handle.clone(), volume.clone());
        Ok(volume)
    }

    async fn find_or_create_cow_volume_for_container(
        &self,
        handle: &str,
        parent: &Arc<dyn Volume>,
        _privileged: bool,
    ) -> ProviderResult<Arc<dyn Volume>> {
        let volume = FakeVolume::new(fresh_handle(&format!("{handle}-cow-of-{}", parent.handle())));
        self.volumes.lock().insert(volume.handle.clone(), volume.clone());
        Ok(volume)
    }

    async fn lookup_volume(&self, handle: &str) -> ProviderResult<Option<Arc<dyn Volume>>> {
        Ok(self.volumes.lock().get(handle).cloned())
    }
}

// --- Runtime ----------------------------------------------------------

pub struct FakeRuntimeContainer {
    pub handle: String,
    pub destroyed: Mutex<bool>,
    pub last_run: Mutex<Option<ProcessSpec>>,
    pub mounts: Mutex<Vec<VolumeMount>>,
}

#[async_trait]
impl RuntimeContainer for FakeRuntimeContainer {
    fn handle(&self) -> &str {
        &self.handle
    }
    async fn run(&self, process: ProcessSpec, _io: ProcessIo) -> ProviderResult<()> {
        *self.last_run.lock() = Some(process);
        Ok(())
    }
    async fn destroy(&self) -> ProviderResult<()> {
        *self.destroyed.lock() = true;
        Ok(())
    }
    async fn volume_mounts(&self) -> ProviderResult<Vec<VolumeMount>> {
        Ok(self.mounts.lock().clone())
    }
}

/// Configurable fake runtime: `create_error` makes every `create()` call
/// fail once with the configured error (cleared after firing, so a
/// single-failure scenario doesn't wedge subsequent calls).
#[derive(Default)]
pub struct FakeRuntimeClient {
    pub containers: Mutex<BTreeMap<String, Arc<FakeRuntimeContainer>>>,
    pub create_error: Mutex<Option<String>>,
    pub create_calls: AtomicUsize,
}

impl FakeRuntimeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_present(&self, handle: impl Into<String>) -> Arc<FakeRuntimeContainer> {
        let handle = handle.into();
        let container = Arc::new(FakeRuntimeContainer {
            handle: handle.clone(),
            destroyed: Mutex::new(false),
            last_run: Mutex::new(None),
            mounts: Mutex::new(vec![]),
        });
        self.containers.lock().insert(handle, container.clone());
        container
    }

    pub fn fail_next_create(&self, message: impl Into<String>) {
        *self.create_error.lock() = Some(message.into());
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntimeClient {
    async fn create(&self, spec: RuntimeContainerSpec) -> ProviderResult<Arc<dyn RuntimeContainer>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.create_error.lock().take() {
            return Err(ProviderError::Runtime(message));
        }
        let container = Arc::new(FakeRuntimeContainer {
            handle: spec.handle.clone(),
            destroyed: Mutex::new(false),
            last_run: Mutex::new(None),
            mounts: Mutex::new(vec![]),
        });
        self.containers.lock().insert(spec.handle, container.clone());
        Ok(container)
    }

    async fn lookup(&self, handle: &str) -> ProviderResult<Option<Arc<dyn RuntimeContainer>>> {
        Ok(self
            .containers
            .lock()
            .get(handle)
            .cloned()
            .map(|c| c as Arc<dyn RuntimeContainer>))
    }
}

// --- Lock ---------------------------------------------------------------

pub struct FakeLock;
impl Lock for FakeLock {}

#[derive(Default)]
pub struct FakeLockFactory {
    pub acquire_calls: AtomicUsize,
    /// Number of times to return "contended" (`None`) before succeeding.
    pub contend_for: Mutex<u32>,
    /// When set, every `try_acquire` call fails with this message instead
    /// of contending or succeeding.
    pub fail_with: Mutex<Option<String>>,
}

impl FakeLockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contend_first(n: u32) -> Self {
        Self {
            acquire_calls: AtomicUsize::new(0),
            contend_for: Mutex::new(n),
            fail_with: Mutex::new(None),
        }
    }

    pub fn fail_with(message: impl Into<String>) -> Self {
        Self {
            acquire_calls: AtomicUsize::new(0),
            contend_for: Mutex::new(0),
            fail_with: Mutex::new(Some(message.into())),
        }
    }
}

#[async_trait]
impl LockFactory for FakeLockFactory {
    async fn try_acquire(&self, _key: &str) -> ProviderResult<Option<Box<dyn Lock>>> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(ProviderError::Database(message));
        }
        let mut remaining = self.contend_for.lock();
        if *remaining > 0 {
            *remaining -= 1;
            Ok(None)
        } else {
            Ok(Some(Box::new(FakeLock)))
        }
    }
}

// --- Image ----------------------------------------------------------

pub struct FakeImage {
    pub root_fs_path: String,
    pub metadata: ImageMetadata,
}

impl Image for FakeImage {
    fn root_fs_path(&self) -> &str {
        &self.root_fs_path
    }
    fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }
}

pub struct FakeImageFactory {
    pub root_fs_path: String,
    pub privileged: bool,
    pub env: Vec<String>,
    /// When set, the next `fetch` call fails with this message instead of
    /// returning an image, and the override is cleared.
    pub fail_next_fetch: Mutex<Option<String>>,
}

impl FakeImageFactory {
    pub fn new() -> Self {
        Self {
            root_fs_path: "/rootfs".to_string(),
            privileged: false,
            env: vec!["IMAGE=ENV".to_string()],
            fail_next_fetch: Mutex::new(None),
        }
    }

    pub fn fail_next_fetch(&self, message: impl Into<String>) {
        *self.fail_next_fetch.lock() = Some(message.into());
    }
}

impl Default for FakeImageFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFactory for FakeImageFactory {
    async fn fetch(
        &self,
        _spec: &ImageSpec,
        _worker: &str,
        _team_id: TeamId,
        _resource_types: &ResourceTypes,
    ) -> ProviderResult<FetchedImage> {
        if let Some(message) = self.fail_next_fetch.lock().take() {
            return Err(ProviderError::Volume(message));
        }
        Ok(FetchedImage {
            image: Arc::new(FakeImage {
                root_fs_path: self.root_fs_path.clone(),
                metadata: ImageMetadata {
                    privileged: self.privileged,
                    env: self.env.clone(),
                },
            }),
            volume: None,
        })
    }
}

// --- DB -----------------------------------------------------------------

struct Row {
    state: RowState,
    volumes: Vec<CreatedVolumeRecord>,
    metadata: ContainerMetadata,
    created_at: chrono::DateTime<chrono::Utc>,
}

enum RowState {
    Creating,
    Created,
    Failed,
}

pub struct FakeCreatingContainer {
    handle: String,
    rows: Arc<Mutex<BTreeMap<String, Row>>>,
}

#[async_trait]
impl CreatingContainer for FakeCreatingContainer {
    fn handle(&self) -> &str {
        &self.handle
    }

    async fn created(
        &self,
        metadata: ContainerMetadata,
        volumes: Vec<CreatedVolumeRecord>,
    ) -> ProviderResult<Arc<dyn CreatedContainer>> {
        let mut rows = self.rows.lock();
        let row = rows
            .get_mut(&self.handle)
            .ok_or_else(|| ProviderError::Internal("row vanished".to_string()))?;
        row.state = RowState::Created;
        row.volumes = volumes;
        row.metadata = metadata;
        Ok(Arc::new(FakeCreatedContainer {
            handle: self.handle.clone(),
            rows: Arc::clone(&self.rows),
        }))
    }

    async fn failed(&self) -> ProviderResult<()> {
        let mut rows = self.rows.lock();
        if let Some(row) = rows.get_mut(&self.handle) {
            row.state = RowState::Failed;
        }
        Ok(())
    }
}

pub struct FakeCreatedContainer {
    handle: String,
    rows: Arc<Mutex<BTreeMap<String, Row>>>,
}

impl CreatedContainer for FakeCreatedContainer {
    fn handle(&self) -> &str {
        &self.handle
    }
    fn metadata(&self) -> ContainerMetadata {
        self.rows
            .lock()
            .get(&self.handle)
            .map(|r| r.metadata.clone())
            .unwrap_or_default()
    }
}

/// A single team's container rows, keyed by `(owner, worker)`.
#[derive(Default)]
pub struct FakeDbTeam {
    rows: Arc<Mutex<BTreeMap<String, Row>>>,
    by_owner_worker: Mutex<BTreeMap<(String, String), String>>,
}

impl FakeDbTeam {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a `creating` row directly, bypassing `create_creating_container`.
    pub fn seed_creating(&self, owner_key: &str, worker: &str, handle: &str) {
        self.rows.lock().insert(
            handle.to_string(),
            Row {
                state: RowState::Creating,
                volumes: vec![],
                metadata: ContainerMetadata::new(),
                created_at: chrono::Utc::now(),
            },
        );
        self.by_owner_worker
            .lock()
            .insert((owner_key.to_string(), worker.to_string()), handle.to_string());
    }

    pub fn seed_created(&self, owner_key: &str, worker: &str, handle: &str) {
        self.seed_created_with_metadata(owner_key, worker, handle, ContainerMetadata::new());
    }

    /// Same as [`Self::seed_created`], but with caller-supplied metadata
    /// instead of always defaulting it -- used to exercise the path where
    /// [`DbTeam::find_created_container_by_handle`] must thread real
    /// metadata back to a caller resolving by handle alone.
    pub fn seed_created_with_metadata(&self, owner_key: &str, worker: &str, handle: &str, metadata: ContainerMetadata) {
        self.rows.lock().insert(
            handle.to_string(),
            Row {
                state: RowState::Created,
                volumes: vec![],
                metadata,
                created_at: chrono::Utc::now(),
            },
        );
        self.by_owner_worker
            .lock()
            .insert((owner_key.to_string(), worker.to_string()), handle.to_string());
    }

    pub fn handle_for(&self, owner_key: &str, worker: &str) -> Option<String> {
        self.by_owner_worker
            .lock()
            .get(&(owner_key.to_string(), worker.to_string()))
            .cloned()
    }

    pub fn row_state(&self, handle: &str) -> Option<&'static str> {
        self.rows.lock().get(handle).map(|r| match r.state {
            RowState::Creating => "creating",
            RowState::Created => "created",
            RowState::Failed => "failed",
        })
    }

    /// When this row was inserted, mirroring `BoxConfig::created_at` in the
    /// teacher's own in-memory fixtures.
    pub fn created_at(&self, handle: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        self.rows.lock().get(handle).map(|r| r.created_at)
    }
}

#[async_trait]
impl DbTeam for FakeDbTeam {
    async fn find_container_on_worker(
        &self,
        owner_key: &str,
        worker: &str,
    ) -> ProviderResult<ContainerOnWorker> {
        let handle = self
            .by_owner_worker
            .lock()
            .get(&(owner_key.to_string(), worker.to_string()))
            .cloned();
        let Some(handle) = handle else {
            return Ok(ContainerOnWorker::Absent);
        };
        let state = self.rows.lock().get(&handle).map(|r| match r.state {
            RowState::Creating => 0,
            RowState::Created => 1,
            RowState::Failed => 2,
        });
        match state {
            Some(0) => Ok(ContainerOnWorker::Creating(Arc::new(FakeCreatingContainer {
                handle,
                rows: Arc::clone(&self.rows),
            }))),
            Some(1) => Ok(ContainerOnWorker::Created(Arc::new(FakeCreatedContainer {
                handle,
                rows: Arc::clone(&self.rows),
            }))),
            _ => Ok(ContainerOnWorker::Absent),
        }
    }

    async fn create_creating_container(
        &self,
        owner_key: &str,
        worker: &str,
    ) -> ProviderResult<Arc<dyn CreatingContainer>> {
        let handle = fresh_handle("container");
        self.rows.lock().insert(
            handle.clone(),
            Row {
                state: RowState::Creating,
                volumes: vec![],
                metadata: ContainerMetadata::new(),
                created_at: chrono::Utc::now(),
            },
        );
        self.by_owner_worker
            .lock()
            .insert((owner_key.to_string(), worker.to_string()), handle.clone());
        Ok(Arc::new(FakeCreatingContainer {
            handle,
            rows: Arc::clone(&self.rows),
        }))
    }

    async fn find_created_container_by_handle(&self, handle: &str) -> ProviderResult<Option<Arc<dyn CreatedContainer>>> {
        let is_created = matches!(self.rows.lock().get(handle).map(|r| &r.state), Some(RowState::Created));
        if !is_created {
            return Ok(None);
        }
        Ok(Some(Arc::new(FakeCreatedContainer {
            handle: handle.to_string(),
            rows: Arc::clone(&self.rows),
        })))
    }
}

#[derive(Default)]
pub struct FakeDbTeamFactory {
    pub teams: Mutex<BTreeMap<TeamId, Arc<FakeDbTeam>>>,
}

impl FakeDbTeamFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn team_for(&self, team_id: TeamId) -> Arc<FakeDbTeam> {
        self.teams
            .lock()
            .entry(team_id)
            .or_insert_with(|| Arc::new(FakeDbTeam::new()))
            .clone()
    }
}

#[async_trait]
impl DbTeamFactory for FakeDbTeamFactory {
    async fn team(&self, team_id: TeamId) -> ProviderResult<Arc<dyn DbTeam>> {
        Ok(self.team_for(team_id) as Arc<dyn DbTeam>)
    }
}

/// Shares a [`FakeDbTeam`]'s row storage so tests can construct one from
/// the team they already built, e.g. `FakeDbVolumeRepository::for_team(&team)`.
pub struct FakeDbVolumeRepository {
    rows: Arc<Mutex<BTreeMap<String, Row>>>,
}

impl FakeDbVolumeRepository {
    pub fn for_team(team: &FakeDbTeam) -> Self {
        Self {
            rows: Arc::clone(&team.rows),
        }
    }
}

#[async_trait]
impl DbVolumeRepository for FakeDbVolumeRepository {
    async fn volumes_for_container(&self, handle: &str) -> ProviderResult<Vec<CreatedVolumeRecord>> {
        Ok(self
            .rows
            .lock()
            .get(handle)
            .map(|r| r.volumes.clone())
            .unwrap_or_default())
    }
}

// --- Misc -----------------------------------------------------------

pub struct FakeOwner(pub String);

impl ContainerOwner for FakeOwner {
    fn key(&self) -> String {
        self.0.clone()
    }
}

pub struct FakeDelegate;
impl crate::spec::ImageFetchingDelegate for FakeDelegate {}

pub struct FakeArtifactSource {
    pub local_on: Mutex<Option<Arc<dyn Volume>>>,
    pub streamed_to: Mutex<bool>,
}

impl FakeArtifactSource {
    pub fn remote() -> Arc<Self> {
        Arc::new(Self {
            local_on: Mutex::new(None),
            streamed_to: Mutex::new(false),
        })
    }

    pub fn local(volume: Arc<dyn Volume>) -> Arc<Self> {
        Arc::new(Self {
            local_on: Mutex::new(Some(volume)),
            streamed_to: Mutex::new(false),
        })
    }
}

#[async_trait]
impl crate::spec::ArtifactSource for FakeArtifactSource {
    async fn volume_on(&self, _worker: &str) -> ProviderResult<Option<Arc<dyn Volume>>> {
        Ok(self.local_on.lock().clone())
    }
    async fn stream_to(
        &self,
        destination: &(dyn crate::spec::ArtifactDestination + Sync),
    ) -> ProviderResult<()> {
        *self.streamed_to.lock() = true;
        destination.stream_in("/", b"payload").await
    }
}
