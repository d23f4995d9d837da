//! Container handle (§4.5): the object returned to callers. Wraps a
//! runtime container, injects the default process user, and resolves its
//! volumes live on demand rather than retaining owning references (§9
//! "Cyclic ownership avoidance").

use std::sync::Arc;

use crate::error::{ProviderError, ProviderResult};
use crate::interfaces::{CreatedVolumeRecord, RuntimeContainer, VolumeClient};
use crate::runtime_spec::{ProcessIo, ProcessSpec};
use crate::spec::ContainerMetadata;
use crate::volume::VolumeMount;

/// A ready-to-use container, backed by a live runtime container and a
/// set of volume handles recorded in the DB.
pub struct Container {
    runtime_container: Arc<dyn RuntimeContainer>,
    volume_client: Arc<dyn VolumeClient>,
    volume_records: Vec<CreatedVolumeRecord>,
    metadata: ContainerMetadata,
    default_user: String,
}

impl Container {
    pub fn new(
        runtime_container: Arc<dyn RuntimeContainer>,
        volume_client: Arc<dyn VolumeClient>,
        volume_records: Vec<CreatedVolumeRecord>,
        metadata: ContainerMetadata,
        default_user: String,
    ) -> Self {
        Self {
            runtime_container,
            volume_client,
            volume_records,
            metadata,
            default_user,
        }
    }

    pub fn handle(&self) -> &str {
        self.runtime_container.handle()
    }

    pub fn metadata(&self) -> &ContainerMetadata {
        &self.metadata
    }

    /// Resolves the DB's recorded volume handles to live objects via the
    /// volume client. Unordered by contract (SPEC_FULL supplement #5);
    /// any lookup failure propagates.
    pub async fn volume_mounts(&self) -> ProviderResult<Vec<VolumeMount>> {
        let mut mounts = Vec::with_capacity(self.volume_records.len());
        for record in &self.volume_records {
            let volume = self
                .volume_client
                .lookup_volume(&record.handle)
                .await?
                .ok_or_else(|| ProviderError::VolumeNotFound(record.handle.clone()))?;
            mounts.push(VolumeMount {
                volume,
                mount_path: record.mount_path.clone(),
            });
        }
        Ok(mounts)
    }

    /// Runs `process` with the container's `user` property injected when
    /// the caller supplied none (P7); falls back to `default_user` when
    /// the property itself is empty or missing.
    pub async fn run(&self, mut process: ProcessSpec, io: ProcessIo) -> ProviderResult<()> {
        if process.user.as_deref().unwrap_or("").is_empty() {
            let user = if self.default_user.is_empty() {
                "root".to_string()
            } else {
                self.default_user.clone()
            };
            process.user = Some(user);
        }
        self.runtime_container.run(process, io).await
    }

    /// Asks the runtime to destroy this container unconditionally -- no
    /// DB mutation happens here (SPEC_FULL supplement #4). Idempotence
    /// with respect to an already-gone container is the runtime's
    /// property, not this layer's.
    pub async fn destroy(&self) -> ProviderResult<()> {
        self.runtime_container.destroy().await
    }
}
