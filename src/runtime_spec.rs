//! The container spec submitted to the runtime client -- bit-compatible
//! with the runtime's native spec (§6): handle, root-FS path, properties,
//! bind mounts, limits, env, privileged flag.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMountMode {
    Ro,
    Rw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeBindMount {
    pub src_path: String,
    pub dst_path: String,
    pub mode: BindMountMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeLimits {
    pub cpu: Option<u64>,
    pub memory: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContainerSpec {
    pub handle: String,
    pub root_fs_path: String,
    pub properties: BTreeMap<String, String>,
    pub bind_mounts: Vec<RuntimeBindMount>,
    pub limits: RuntimeLimits,
    pub env: Vec<String>,
    pub privileged: bool,
}

/// A single process to run inside an already-materialized container.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    pub path: String,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub dir: Option<String>,
    /// Process user. When empty, [`crate::handle::Container::run`] injects
    /// the container's `user` property, defaulting to `root` (P7).
    pub user: Option<String>,
}

/// Stdio wiring for a running process. Left as a marker -- this layer
/// never inspects process output, it only forwards the spec to the
/// runtime client.
#[derive(Debug, Clone, Default)]
pub struct ProcessIo;
