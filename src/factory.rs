//! Container factory (§4.4): turns a volume plan and a fetched image into
//! a live runtime container and a `created` DB row.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::ctx::Context;
use crate::error::{ProviderError, ProviderResult};
use crate::interfaces::{CreatedContainer, CreatedVolumeRecord, CreatingContainer, RuntimeClient, VolumeClient};
use crate::options::ProviderOptions;
use crate::planner::{assemble_env, runtime_limits, ProxyVars, ResolvedInput, VolumePlan};
use crate::runtime_spec::RuntimeContainerSpec;
use crate::spec::{ContainerMetadata, ContainerSpec};
use crate::volume::{Volume, VolumeStrategy};

/// Everything the factory needs about the image, independent of how it
/// was fetched (§6's `FetchedImage{URL, Metadata{Env}, Privileged}`).
pub struct FetchedImageView {
    pub root_fs_path: String,
    pub env: Vec<String>,
    pub privileged: bool,
}

/// Materializes volumes from a plan, submits the container to the
/// runtime, streams remote inputs and transitions the DB row to
/// `created`. Any failure along the way transitions the row to `failed`
/// instead (P6) and propagates the original error -- except cancellation,
/// which this layer never rolls back (§5): a cancelled `creating` row is
/// left for an external garbage collector to reap.
#[instrument(skip_all, fields(handle = creating.handle()))]
pub async fn materialize(
    creating: &dyn CreatingContainer,
    plan: VolumePlan,
    resolved_inputs: &[ResolvedInput],
    image: &FetchedImageView,
    spec: &ContainerSpec,
    proxies: &ProxyVars,
    certs_volume: Option<Arc<dyn Volume>>,
    volume_client: &dyn VolumeClient,
    runtime: &dyn RuntimeClient,
    metadata: ContainerMetadata,
    options: &ProviderOptions,
    ctx: &Context,
) -> ProviderResult<Arc<dyn CreatedContainer>> {
    match materialize_inner(
        creating,
        plan,
        resolved_inputs,
        image,
        spec,
        proxies,
        certs_volume,
        volume_client,
        runtime,
        metadata,
        options,
        ctx,
    )
    .await
    {
        Ok(created) => Ok(created),
        Err(ProviderError::Cancelled) => Err(ProviderError::Cancelled),
        Err(err) => {
            creating.failed().await?;
            Err(err)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn materialize_inner(
    creating: &dyn CreatingContainer,
    plan: VolumePlan,
    resolved_inputs: &[ResolvedInput],
    image: &FetchedImageView,
    spec: &ContainerSpec,
    proxies: &ProxyVars,
    certs_volume: Option<Arc<dyn Volume>>,
    volume_client: &dyn VolumeClient,
    runtime: &dyn RuntimeClient,
    metadata: ContainerMetadata,
    options: &ProviderOptions,
    ctx: &Context,
) -> ProviderResult<Arc<dyn CreatedContainer>> {
    let handle = creating.handle().to_string();

    let mut created_volumes: Vec<(String, Arc<dyn Volume>)> = Vec::new();
    for planned in &plan.volumes {
        ctx.check()?;
        let volume = match &planned.spec.strategy {
            VolumeStrategy::Cow(parent) => {
                volume_client
                    .find_or_create_cow_volume_for_container(&handle, parent, planned.spec.privileged)
                    .await?
            }
            VolumeStrategy::Empty | VolumeStrategy::Import(_) => {
                volume_client
                    .find_or_create_volume_for_container(&handle, &planned.spec)
                    .await?
            }
        };
        created_volumes.push((planned.mount_path.clone(), volume));
    }

    let mut bind_mounts = plan.bind_mounts;
    if let Some(certs) = &certs_volume {
        bind_mounts.push(crate::runtime_spec::RuntimeBindMount {
            src_path: certs.path().to_string(),
            dst_path: "/etc/ssl/certs".to_string(),
            mode: crate::runtime_spec::BindMountMode::Ro,
        });
    }

    let mut properties = BTreeMap::new();
    properties.insert(
        "user".to_string(),
        if spec.user.is_empty() {
            options.default_user.clone()
        } else {
            spec.user.clone()
        },
    );

    let runtime_spec = RuntimeContainerSpec {
        handle: handle.clone(),
        root_fs_path: image.root_fs_path.clone(),
        properties,
        bind_mounts,
        limits: runtime_limits(&spec.limits),
        env: assemble_env(&image.env, &spec.env, proxies),
        privileged: image.privileged,
    };

    info!(handle, volumes = created_volumes.len(), "submitting container to runtime");
    runtime.create(runtime_spec).await?;

    // Streaming happens after runtime creation, before the `created`
    // transition (§4.4's streaming-ordering rule).
    for planned in &plan.volumes {
        if !planned.needs_streaming {
            continue;
        }
        ctx.check()?;
        let resolved = resolved_inputs
            .iter()
            .find(|i| i.destination_path == planned.mount_path)
            .expect("every streaming volume came from a resolved input");
        let volume = created_volumes
            .iter()
            .find(|(path, _)| path == &planned.mount_path)
            .map(|(_, v)| Arc::clone(v))
            .expect("volume for this mount path was just created above");
        stream_input(resolved, volume).await?;
    }

    let records = created_volumes
        .into_iter()
        .map(|(mount_path, volume)| CreatedVolumeRecord {
            mount_path,
            handle: volume.handle().to_string(),
        })
        .collect();

    creating.created(metadata, records).await
}

struct StreamDestination(Arc<dyn Volume>);

#[async_trait::async_trait]
impl crate::spec::ArtifactDestination for StreamDestination {
    async fn stream_in(&self, path: &str, data: &[u8]) -> ProviderResult<()> {
        self.0.stream_in(path, data).await
    }
}

async fn stream_input(resolved: &ResolvedInput, volume: Arc<dyn Volume>) -> ProviderResult<()> {
    // The source's `stream_to` is driven against this wrapper so sources
    // only ever see the `ArtifactDestination` capability, never the
    // concrete `Volume` type (§9 "Streaming as capability").
    let destination = StreamDestination(volume);
    resolved.source.stream_to(&destination).await
}
