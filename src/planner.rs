//! Volume topology planner (§4.3): a pure function from a resolved
//! container spec to an ordered bind-mount list plus the volumes that
//! need to be created to back it.
//!
//! Resolution of "is this input local or remote" requires an RPC
//! (`ArtifactSource::volume_on`), so it happens in the Reconciler before
//! calling here (§9 "Planner as pure function"). This module only ever
//! sees the already-resolved result.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ProviderError, ProviderResult};
use crate::runtime_spec::{BindMountMode, RuntimeBindMount};
use crate::spec::{ContainerLimits, ContainerSpec, MountMode};
use crate::volume::{Volume, VolumeSpec, VolumeStrategy};

/// Whether a resolved input's artifact was found on this worker already
/// (and is therefore cloned via COW) or must be streamed in after the
/// container volume exists.
#[derive(Clone)]
pub enum InputClassification {
    Local(Arc<dyn Volume>),
    Remote,
}

/// An input after the async `volume_on` check has already run.
pub struct ResolvedInput {
    pub destination_path: String,
    pub classification: InputClassification,
    pub source: Arc<dyn crate::spec::ArtifactSource>,
}

/// A single volume the factory needs to create, keyed by mount path.
#[derive(Clone)]
pub struct PlannedVolume {
    pub mount_path: String,
    pub spec: VolumeSpec,
    /// Set for [`InputClassification::Remote`] entries: the factory must
    /// stream the artifact into this volume after runtime creation.
    pub needs_streaming: bool,
}

/// The planner's output: the ordered bind-mount list ready to hand to the
/// runtime client, and the volumes to create to back it.
pub struct VolumePlan {
    pub bind_mounts: Vec<RuntimeBindMount>,
    pub volumes: Vec<PlannedVolume>,
}

fn is_strict_ancestor(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && (ancestor.ends_with('/') || path.as_bytes()[ancestor.len()] == b'/')
}

/// Implements §4.3 rules 1-6 and 8. Ordering (rule 7) is deferred to
/// [`VolumePlan`] assembly, which sorts the map by key and prepends the
/// explicit bind mounts.
pub fn plan_volumes(
    spec: &ContainerSpec,
    inputs: &[ResolvedInput],
    image_privileged: bool,
) -> ProviderResult<VolumePlan> {
    if spec.work_dir.is_empty() || !spec.work_dir.starts_with('/') {
        return Err(ProviderError::Precondition(format!(
            "work_dir must be an absolute path, got {:?}",
            spec.work_dir
        )));
    }

    // mount path -> (spec, needs_streaming). BTreeMap gives byte-lexicographic
    // key order for free, which is exactly rule 7's tiebreak and also
    // happens to guarantee rule 6's ancestor-first nesting (a path's
    // string representation always sorts before any of its descendants).
    let mut volumes: BTreeMap<String, PlannedVolume> = BTreeMap::new();

    let mk = |strategy: VolumeStrategy, needs_streaming: bool, mount_path: &str| PlannedVolume {
        mount_path: mount_path.to_string(),
        spec: VolumeSpec {
            strategy,
            privileged: image_privileged,
        },
        needs_streaming,
    };

    // Rule 1: fixed volumes, subject to rule 5's workdir-shadow exception.
    volumes.insert(
        "/scratch".to_string(),
        mk(VolumeStrategy::Empty, false, "/scratch"),
    );

    let workdir_shadowed = inputs.iter().any(|i| i.destination_path == spec.work_dir);
    if !workdir_shadowed {
        volumes.insert(
            spec.work_dir.clone(),
            mk(VolumeStrategy::Empty, false, &spec.work_dir),
        );
    }

    // Rules 2-3: inputs.
    for input in inputs {
        let planned = match &input.classification {
            InputClassification::Local(parent) => mk(
                VolumeStrategy::Cow(Arc::clone(parent)),
                false,
                &input.destination_path,
            ),
            InputClassification::Remote => {
                mk(VolumeStrategy::Empty, true, &input.destination_path)
            }
        };
        volumes.insert(input.destination_path.clone(), planned);
    }

    // Rule 4 + rule 6's exact-collision clause: outputs lose to an input
    // at the exact same path, but still populate any path not already
    // claimed.
    for (_name, dest) in spec.outputs.iter() {
        if volumes.contains_key(dest) {
            continue;
        }
        volumes.insert(dest.clone(), mk(VolumeStrategy::Empty, false, dest));
    }

    // Rule 6's general nesting clause (non-exact overlaps) requires no
    // extra work here: every mount stays in the map regardless of
    // ancestry, and BTreeMap's key order already yields ancestor-first
    // iteration since an ancestor's path string is always a proper
    // prefix, hence lexicographically smaller than any descendant's.
    for a in volumes.keys() {
        for b in volumes.keys() {
            if a != b && is_strict_ancestor(b, a) {
                return Err(ProviderError::Internal(format!(
                    "planner invariant violated: {a} sorts before its ancestor {b}"
                )));
            }
        }
    }

    let sorted_mount_paths: Vec<String> = volumes.keys().cloned().collect();
    let mut bind_mounts: Vec<RuntimeBindMount> = spec
        .bind_mounts
        .iter()
        .map(|b| RuntimeBindMount {
            src_path: b.src_path.clone(),
            dst_path: b.dst_path.clone(),
            mode: match b.mode {
                MountMode::Ro => BindMountMode::Ro,
                MountMode::Rw => BindMountMode::Rw,
            },
        })
        .collect();

    for mount_path in &sorted_mount_paths {
        let planned = &volumes[mount_path];
        bind_mounts.push(RuntimeBindMount {
            src_path: planned.mount_path.clone(),
            dst_path: planned.mount_path.clone(),
            mode: BindMountMode::Rw,
        });
    }

    Ok(VolumePlan {
        bind_mounts,
        volumes: sorted_mount_paths
            .into_iter()
            .map(|p| volumes.remove(&p).expect("key just iterated"))
            .collect(),
    })
}

/// §4.3 "Environment assembly": image env, then caller env, then worker
/// proxy vars, in that order.
pub fn assemble_env(image_env: &[String], spec_env: &[String], proxies: &ProxyVars) -> Vec<String> {
    let mut env = Vec::with_capacity(image_env.len() + spec_env.len() + 3);
    env.extend(image_env.iter().cloned());
    env.extend(spec_env.iter().cloned());
    if let Some(v) = &proxies.http_proxy {
        env.push(format!("http_proxy={v}"));
    }
    if let Some(v) = &proxies.https_proxy {
        env.push(format!("https_proxy={v}"));
    }
    if let Some(v) = &proxies.no_proxy {
        env.push(format!("no_proxy={v}"));
    }
    env
}

#[derive(Debug, Clone, Default)]
pub struct ProxyVars {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

/// Convert [`ContainerLimits`] to the runtime's limit shape. Pulled out
/// of the factory so both it and tests can share the mapping.
pub fn runtime_limits(limits: &ContainerLimits) -> crate::runtime_spec::RuntimeLimits {
    crate::runtime_spec::RuntimeLimits {
        cpu: limits.cpu,
        memory: limits.memory,
    }
}
