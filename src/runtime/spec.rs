//! Container creation spec (spec §4.2).

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    pub cpu_cores: f64,
    pub memory_mb: u64,
    pub pids_limit: u32,
}

#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub volume_name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone)]
pub struct PublishedPort {
    pub internal: u16,
    pub external: u16,
}

/// A host-path bind mount, used by short-lived helper containers (snapshot
/// export/import) that need a scratch directory visible to the host caller.
/// Pod containers use named [`VolumeMount`]s instead.
#[derive(Debug, Clone)]
pub struct HostBindMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub limits: ResourceLimits,
    pub mounts: Vec<VolumeMount>,
    pub host_binds: Vec<HostBindMount>,
    pub network_name: String,
    pub published_ports: Vec<PublishedPort>,
    pub labels: HashMap<String, String>,
}
