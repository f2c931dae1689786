//! The `Pod` entity, its volume set, port mappings, and resource tiers
//! (spec §3 "Pod", "Volume Set", "Pod Network", "Port Mapping").

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ids::PodId;
use crate::error::{CoreError, CoreResult};

/// The eight canonical persistent volumes every pod gets, in the fixed order
/// snapshot manifests and archive layouts depend on (spec §3, §6).
pub const CANONICAL_VOLUMES: [&str; 8] = [
    "workspace", "home", "root", "etc", "usr-local", "opt", "var", "srv",
];

/// Canonical volume name, e.g. `pinacle-vol-<podId>-workspace`.
pub fn volume_name(pod_id: &PodId, volume: &str) -> String {
    format!("pinacle-vol-{pod_id}-{volume}")
}

/// Canonical per-pod bridge network name.
pub fn network_name(pod_id: &PodId) -> String {
    format!("pinacle-net-{pod_id}")
}

/// Naming convention the Host Agent uses to find a pod's container.
pub fn container_name(pod_id: &PodId) -> String {
    format!("pinacle-pod-{pod_id}")
}

/// The distinguished port name the proxy depends on.
pub const NGINX_PROXY_PORT_NAME: &str = "nginx-proxy";

static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,62}$").unwrap());

/// Validate a pod slug against spec §3's invariant.
pub fn validate_slug(slug: &str) -> CoreResult<()> {
    if SLUG_RE.is_match(slug) {
        Ok(())
    } else {
        Err(CoreError::Invariant(format!(
            "slug {slug:?} does not match [a-z0-9][a-z0-9-]{{1,62}}"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodStatus {
    Creating,
    Provisioning,
    Running,
    Stopping,
    Stopped,
    Deleting,
    Error,
}

impl PodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodStatus::Creating => "creating",
            PodStatus::Provisioning => "provisioning",
            PodStatus::Running => "running",
            PodStatus::Stopping => "stopping",
            PodStatus::Stopped => "stopped",
            PodStatus::Deleting => "deleting",
            PodStatus::Error => "error",
        }
    }
}

/// Named tuple of resource limits applied to a pod's container (spec §3,
/// §4.3 "Resource limits by tier"). Tiers are totally ordered by price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    DevSmall,
    DevMedium,
    DevLarge,
    ProSmall,
    ProLarge,
}

#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub cpu_cores: f64,
    pub memory_mb: u64,
    pub storage_mb: u64,
}

impl Tier {
    /// The tier → resource-limit mapping. A constant table, not derived from
    /// config, per spec §4.3.
    pub fn limits(self) -> TierLimits {
        match self {
            Tier::DevSmall => TierLimits { cpu_cores: 1.0, memory_mb: 1024, storage_mb: 10_240 },
            Tier::DevMedium => TierLimits { cpu_cores: 2.0, memory_mb: 2048, storage_mb: 20_480 },
            Tier::DevLarge => TierLimits { cpu_cores: 4.0, memory_mb: 4096, storage_mb: 40_960 },
            Tier::ProSmall => TierLimits { cpu_cores: 4.0, memory_mb: 8192, storage_mb: 81_920 },
            Tier::ProLarge => TierLimits { cpu_cores: 8.0, memory_mb: 16384, storage_mb: 163_840 },
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Tier::DevSmall => "dev.small",
            Tier::DevMedium => "dev.medium",
            Tier::DevLarge => "dev.large",
            Tier::ProSmall => "pro.small",
            Tier::ProLarge => "pro.large",
        }
    }

    pub fn from_tag(tag: &str) -> CoreResult<Self> {
        match tag {
            "dev.small" => Ok(Tier::DevSmall),
            "dev.medium" => Ok(Tier::DevMedium),
            "dev.large" => Ok(Tier::DevLarge),
            "pro.small" => Ok(Tier::ProSmall),
            "pro.large" => Ok(Tier::ProLarge),
            other => Err(CoreError::Invariant(format!("unknown tier tag {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub name: String,
    pub internal: u16,
    pub external: u16,
}

/// A template + tier + toggles descriptor. The catalog contents themselves
/// are out of scope (spec §1); the core only consumes this typed shape.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodConfig {
    pub template: String,
    pub tier_tag: String,
    #[serde(default)]
    pub service_toggles: Vec<String>,
    #[serde(default)]
    pub env_set_ref: Option<String>,
    /// Optional per-template quiescence hook invoked before a snapshot is
    /// taken (spec §9 open question on partial-snapshot consistency).
    #[serde(default)]
    pub pre_snapshot_hook: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    pub id: PodId,
    pub name: String,
    pub slug: String,
    pub owner_user_id: String,
    pub owner_team_id: String,
    pub host_id: Option<String>,
    pub container_id: Option<String>,
    pub template: String,
    pub tier: Tier,
    pub config: PodConfig,
    pub ports: Vec<PortMapping>,
    pub status: PodStatus,
    pub last_error_message: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pod {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Invariant (spec §3, §8): a `running` pod must have `hostId` and
    /// `containerId` set.
    pub fn check_running_invariant(&self) -> CoreResult<()> {
        if self.status == PodStatus::Running
            && (self.host_id.is_none() || self.container_id.is_none())
        {
            return Err(CoreError::Invariant(format!(
                "pod {} is running with host_id={:?} container_id={:?}",
                self.id, self.host_id, self.container_id
            )));
        }
        Ok(())
    }

    pub fn nginx_proxy_port(&self) -> Option<u16> {
        self.ports
            .iter()
            .find(|p| p.name == NGINX_PROXY_PORT_NAME)
            .map(|p| p.external)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_slug() {
        assert!(validate_slug("my-pod-123").is_ok());
    }

    #[test]
    fn rejects_uppercase_and_short_slugs() {
        assert!(validate_slug("A").is_err());
        assert!(validate_slug("x").is_err());
        assert!(validate_slug("Has-Upper").is_err());
    }

    #[test]
    fn tiers_are_totally_ordered_by_price() {
        assert!(Tier::DevSmall < Tier::DevMedium);
        assert!(Tier::DevMedium < Tier::DevLarge);
        assert!(Tier::DevLarge < Tier::ProSmall);
        assert!(Tier::ProSmall < Tier::ProLarge);
    }

    #[test]
    fn tier_tag_round_trips() {
        for tier in [Tier::DevSmall, Tier::DevMedium, Tier::DevLarge, Tier::ProSmall, Tier::ProLarge] {
            assert_eq!(Tier::from_tag(tier.tag()).unwrap(), tier);
        }
    }

    #[test]
    fn volume_and_network_names_are_canonical() {
        let id = PodId::new();
        assert_eq!(volume_name(&id, "workspace"), format!("pinacle-vol-{id}-workspace"));
        assert_eq!(network_name(&id), format!("pinacle-net-{id}"));
        assert_eq!(container_name(&id), format!("pinacle-pod-{id}"));
    }

    fn sample_pod(status: PodStatus, host: Option<&str>, container: Option<&str>) -> Pod {
        let now = Utc::now();
        Pod {
            id: PodId::new(),
            name: "demo".into(),
            slug: "demo-pod".into(),
            owner_user_id: "user_1".into(),
            owner_team_id: "team_1".into(),
            host_id: host.map(String::from),
            container_id: container.map(String::from),
            template: "nodejs-blank".into(),
            tier: Tier::DevSmall,
            config: PodConfig::default(),
            ports: vec![],
            status,
            last_error_message: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn running_without_host_or_container_is_an_invariant_violation() {
        let pod = sample_pod(PodStatus::Running, None, None);
        assert!(pod.check_running_invariant().is_err());
    }

    #[test]
    fn running_with_host_and_container_is_fine() {
        let pod = sample_pod(PodStatus::Running, Some("server_x"), Some("container_x"));
        assert!(pod.check_running_invariant().is_ok());
    }

    #[test]
    fn creating_without_host_is_fine() {
        let pod = sample_pod(PodStatus::Creating, None, None);
        assert!(pod.check_running_invariant().is_ok());
    }
}
