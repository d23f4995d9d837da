//! Reconciler (§4.1): cross-checks `{DB state, runtime state}` and
//! branches between attach-existing, finish-creating, create-fresh and
//! fail. Owns the one `FindOrCreateContainer` entry point.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::ctx::Context;
use crate::error::{ProviderError, ProviderResult};
use crate::factory::{self, FetchedImageView};
use crate::handle::Container;
use crate::interfaces::{
    ContainerOnWorker, CreatedContainer, CreatingContainer, DbTeamFactory, DbVolumeRepository, ImageFactory,
    LockFactory, RuntimeClient, VolumeClient,
};
use crate::lock_gate::acquire_with_retry;
use crate::options::ProviderOptions;
use crate::planner::{plan_volumes, InputClassification, ProxyVars, ResolvedInput, VolumePlan};
use crate::spec::{
    ContainerMetadata, ContainerOwner, ContainerSpec, ImageFetchingDelegate, ResourceTypes, WorkerSpec,
};
use crate::volume::Volume;

/// Everything the reconciler needs to talk to the outside world for one
/// worker. Constructed once per worker, reused across calls (§5's "the
/// Container Provider itself holds no per-container mutable state").
pub struct ContainerProvider {
    worker: String,
    runtime: Arc<dyn RuntimeClient>,
    volume_client: Arc<dyn VolumeClient>,
    db_team_factory: Arc<dyn DbTeamFactory>,
    db_volume_repository: Arc<dyn DbVolumeRepository>,
    lock_factory: Arc<dyn LockFactory>,
    image_factory: Arc<dyn ImageFactory>,
    options: ProviderOptions,
}

impl ContainerProvider {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker: impl Into<String>,
        runtime: Arc<dyn RuntimeClient>,
        volume_client: Arc<dyn VolumeClient>,
        db_team_factory: Arc<dyn DbTeamFactory>,
        db_volume_repository: Arc<dyn DbVolumeRepository>,
        lock_factory: Arc<dyn LockFactory>,
        image_factory: Arc<dyn ImageFactory>,
        options: ProviderOptions,
    ) -> Self {
        Self {
            worker: worker.into(),
            runtime,
            volume_client,
            db_team_factory,
            db_volume_repository,
            lock_factory,
            image_factory,
            options,
        }
    }

    /// §4.1's `FindOrCreateContainer`. `proxies` stands in for the
    /// worker-level proxy variables the original derives from the
    /// `Worker` DB record -- out of scope here (§1), supplied by the
    /// caller instead. `delegate` and `resource_types` are forwarded
    /// opaquely to the image factory.
    #[instrument(skip_all, fields(worker = %self.worker))]
    #[allow(clippy::too_many_arguments)]
    pub async fn find_or_create_container(
        &self,
        ctx: &Context,
        owner: &dyn ContainerOwner,
        _delegate: &dyn ImageFetchingDelegate,
        metadata: ContainerMetadata,
        spec: ContainerSpec,
        worker_spec: WorkerSpec,
        resource_types: ResourceTypes,
        proxies: &ProxyVars,
    ) -> ProviderResult<Container> {
        ctx.check()?;
        let owner_key = owner.key();
        let team = self.db_team_factory.team(spec.team_id).await?;

        let on_worker = team.find_container_on_worker(&owner_key, &self.worker).await?;

        match on_worker {
            ContainerOnWorker::Created(created) => self.attach_created(created).await,
            ContainerOnWorker::Creating(creating) => {
                self.resolve_creating(ctx, creating.as_ref(), &spec, &worker_spec, &resource_types, metadata, proxies)
                    .await
            }
            ContainerOnWorker::Absent => {
                let creating = team
                    .create_creating_container(&owner_key, &self.worker)
                    .await?;
                self.resolve_creating(ctx, creating.as_ref(), &spec, &worker_spec, &resource_types, metadata, proxies)
                    .await
            }
        }
    }

    /// `created` DB state: the row says the container should exist.
    /// Present -> return its handle. Absent -> the container was
    /// destroyed out-of-band; this is an error, not auto-recreated (§4.1,
    /// non-goal in §1).
    async fn attach_created(&self, created: Arc<dyn CreatedContainer>) -> ProviderResult<Container> {
        let handle = created.handle();
        let runtime_container = self
            .runtime
            .lookup(handle)
            .await?
            .ok_or(ProviderError::ContainerNotFound)?;
        let records = self.db_volume_repository.volumes_for_container(handle).await?;
        Ok(Container::new(
            runtime_container,
            Arc::clone(&self.volume_client),
            records,
            created.metadata(),
            self.options.default_user.clone(),
        ))
    }

    /// `creating` DB state (freshly inserted or pre-existing): branches
    /// on runtime presence.
    #[allow(clippy::too_many_arguments)]
    async fn resolve_creating(
        &self,
        ctx: &Context,
        creating: &dyn CreatingContainer,
        spec: &ContainerSpec,
        worker_spec: &WorkerSpec,
        resource_types: &ResourceTypes,
        metadata: ContainerMetadata,
        proxies: &ProxyVars,
    ) -> ProviderResult<Container> {
        match self.runtime.lookup(creating.handle()).await? {
            Some(runtime_container) => {
                // creating + present: no lock, trust the existing
                // container and drive DB straight to `created` (§9's
                // first open question -- re-attach without validation).
                info!(handle = creating.handle(), "reattaching to existing runtime container");
                let created = creating.created(metadata, vec![]).await?;
                Ok(Container::new(
                    runtime_container,
                    Arc::clone(&self.volume_client),
                    vec![],
                    created.metadata(),
                    self.options.default_user.clone(),
                ))
            }
            None => {
                self.create_fresh(ctx, creating, spec, worker_spec, resource_types, metadata, proxies)
                    .await
            }
        }
    }

    /// `creating + absent`: the one branch that acquires the lock gate
    /// and actually talks to the runtime.
    #[allow(clippy::too_many_arguments)]
    async fn create_fresh(
        &self,
        ctx: &Context,
        creating: &dyn CreatingContainer,
        spec: &ContainerSpec,
        worker_spec: &WorkerSpec,
        resource_types: &ResourceTypes,
        metadata: ContainerMetadata,
        proxies: &ProxyVars,
    ) -> ProviderResult<Container> {
        let _lock = acquire_with_retry(
            self.lock_factory.as_ref(),
            creating.handle(),
            self.options.lock_retry_interval,
            ctx,
        )
        .await?;
        ctx.check()?;

        // Everything from here through the runtime submission requires a
        // `creating` row that already exists (absent -> creating happened
        // above, or the row pre-existed). Any failure in this stretch --
        // image fetch, input resolution, planning, the certs lookup --
        // must transition the row to `failed` (§7), same as a runtime
        // `Create` failure; cancellation is the one exception this layer
        // never rolls back (§5).
        let (plan, resolved_inputs, image_view, certs_volume) =
            match self.prepare_for_materialize(ctx, spec, worker_spec, resource_types).await {
                Ok(prepared) => prepared,
                Err(err) => {
                    if !matches!(err, ProviderError::Cancelled) {
                        creating.failed().await?;
                    }
                    return Err(err);
                }
            };

        let created = factory::materialize(
            creating,
            plan,
            &resolved_inputs,
            &image_view,
            spec,
            proxies,
            certs_volume,
            self.volume_client.as_ref(),
            self.runtime.as_ref(),
            metadata,
            &self.options,
            ctx,
        )
        .await?;

        let runtime_container = self
            .runtime
            .lookup(creating.handle())
            .await?
            .ok_or(ProviderError::ContainerNotFound)?;
        let records = self
            .db_volume_repository
            .volumes_for_container(creating.handle())
            .await?;

        Ok(Container::new(
            runtime_container,
            Arc::clone(&self.volume_client),
            records,
            created.metadata(),
            self.options.default_user.clone(),
        ))
    }

    /// Everything `create_fresh` needs before it can submit to the
    /// runtime: the fetched image, resolved inputs, the volume plan and
    /// the (optional) certs volume. Kept separate from `create_fresh` so
    /// every failure in this stretch funnels through one `?`-propagating
    /// path, letting the caller decide whether to transition the row to
    /// `failed` (§7) -- the lock acquired in `create_fresh` is not
    /// touched here and stays held across this call.
    async fn prepare_for_materialize(
        &self,
        ctx: &Context,
        spec: &ContainerSpec,
        worker_spec: &WorkerSpec,
        resource_types: &ResourceTypes,
    ) -> ProviderResult<(VolumePlan, Vec<ResolvedInput>, FetchedImageView, Option<Arc<dyn Volume>>)> {
        let fetched = self
            .image_factory
            .fetch(&spec.image_spec, &self.worker, worker_spec.team_id, resource_types)
            .await?;
        ctx.check()?;

        let resolved_inputs = self.resolve_inputs(spec, ctx).await?;
        let plan = plan_volumes(spec, &resolved_inputs, fetched.image.metadata().privileged)?;

        // An RPC failure resolving the certs volume is not the same as it
        // simply not existing (§4.3) -- only the latter is a normal
        // condition, so the former must propagate rather than silently
        // becoming `None`.
        let certs_volume = self.volume_client.lookup_volume(&self.options.certs_volume_handle).await?;

        let image_view = FetchedImageView {
            root_fs_path: fetched.image.root_fs_path().to_string(),
            env: fetched.image.metadata().env.clone(),
            privileged: fetched.image.metadata().privileged,
        };

        Ok((plan, resolved_inputs, image_view, certs_volume))
    }

    /// Resolves each input's `volume_on` capability against this worker,
    /// classifying it local/remote before handing it to the (pure)
    /// planner.
    async fn resolve_inputs(&self, spec: &ContainerSpec, ctx: &Context) -> ProviderResult<Vec<ResolvedInput>> {
        let mut resolved = Vec::with_capacity(spec.inputs.len());
        for input in &spec.inputs {
            ctx.check()?;
            let classification = match input.source.volume_on(&self.worker).await? {
                Some(volume) => InputClassification::Local(volume),
                None => InputClassification::Remote,
            };
            resolved.push(ResolvedInput {
                destination_path: input.destination_path.clone(),
                classification,
                source: Arc::clone(&input.source),
            });
        }
        Ok(resolved)
    }
}
