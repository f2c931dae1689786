//! The `Server` entity (spec §3): a physical or local-VM host in the fleet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ServerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Online,
    Offline,
}

/// SSH coordinates for a remote host. Unused when the host is a local VM.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub id: ServerId,
    pub hostname: String,
    pub ip_address: String,
    pub cpu_cores: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
    pub ssh: SshEndpoint,
    /// Set when this host is a developer VM rather than a bare/remote host.
    pub local_vm_name: Option<String>,
    pub status: ServerStatus,
    pub last_heartbeat_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Server {
    /// Invariant (spec §3): `status=online ⇔ lastHeartbeatAt` within the
    /// stale threshold. Call this after loading a row to recompute the
    /// derived status rather than trusting a possibly-stale column.
    pub fn recompute_status(&mut self, now: DateTime<Utc>, stale_threshold: chrono::Duration) {
        self.status = if now.signed_duration_since(self.last_heartbeat_at) <= stale_threshold {
            ServerStatus::Online
        } else {
            ServerStatus::Offline
        };
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_threshold: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_heartbeat_at) > stale_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_with_heartbeat(age_secs: i64) -> Server {
        let now = Utc::now();
        Server {
            id: ServerId::new(),
            hostname: "host-a".into(),
            ip_address: "10.0.0.5".into(),
            cpu_cores: 8,
            memory_mb: 16384,
            disk_gb: 200,
            ssh: SshEndpoint {
                host: "10.0.0.5".into(),
                port: 22,
                user: "pinacle".into(),
            },
            local_vm_name: None,
            status: ServerStatus::Online,
            last_heartbeat_at: now - chrono::Duration::seconds(age_secs),
            created_at: now - chrono::Duration::days(1),
        }
    }

    #[test]
    fn recomputes_offline_after_stale_threshold() {
        let mut server = server_with_heartbeat(120);
        server.recompute_status(Utc::now(), chrono::Duration::seconds(60));
        assert_eq!(server.status, ServerStatus::Offline);
    }

    #[test]
    fn recomputes_online_within_threshold() {
        let mut server = server_with_heartbeat(10);
        server.recompute_status(Utc::now(), chrono::Duration::seconds(60));
        assert_eq!(server.status, ServerStatus::Online);
    }
}
