//! Host-agent process configuration (spec §6): a persisted stable
//! `serverId` plus everything sourced from the environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerIdentity {
    #[serde(rename = "serverId")]
    pub server_id: String,
}

/// Read the persisted identity file, creating one with a fresh
/// `server_<ulid>` id if it doesn't exist yet. The id must survive agent
/// restarts so `Register` is idempotent from the control plane's point of
/// view.
pub fn load_or_create_identity(path: &Path) -> Result<ServerIdentity> {
    if let Ok(contents) = std::fs::read_to_string(path) {
        let identity: ServerIdentity = serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        return Ok(identity);
    }

    let identity = ServerIdentity { server_id: format!("server_{}", ulid::Ulid::new()) };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    std::fs::write(path, serde_json::to_string_pretty(&identity)?).with_context(|| format!("writing {}", path.display()))?;
    Ok(identity)
}

pub struct DualTarget {
    pub api_url: String,
    pub api_key: String,
}

pub struct AgentConfig {
    pub identity_path: PathBuf,
    pub api_url: String,
    pub api_key: String,
    pub dev_target: Option<DualTarget>,
    pub hostname: String,
    pub ip_address: String,
    pub ssh_host: String,
    pub ssh_port: u16,
    pub ssh_user: String,
    pub heartbeat_interval_ms: u64,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let api_url = env_var("API_URL").context("API_URL must be set")?;
        let api_key = env_var("API_KEY").context("API_KEY must be set")?;

        let dev_target = match (env_var("DEV_API_URL"), env_var("DEV_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(DualTarget { api_url, api_key }),
            _ => None,
        };

        let hostname = env_var("HOSTNAME").or_else(|| hostname_fallback()).unwrap_or_else(|| "unknown-host".to_string());
        let ssh_host = env_var("SSH_HOST").context("SSH_HOST must be set")?;
        let ip_address = env_var("IP_ADDRESS").unwrap_or_else(|| ssh_host.clone());
        let ssh_port = env_var("SSH_PORT").and_then(|v| v.parse().ok()).unwrap_or(22);
        let ssh_user = env_var("SSH_USER").unwrap_or_else(|| "pinacle".to_string());
        let heartbeat_interval_ms = env_var("HEARTBEAT_INTERVAL_MS").and_then(|v| v.parse().ok()).unwrap_or(30_000);
        let identity_path = env_var("AGENT_IDENTITY_PATH").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./.server-config.json"));

        Ok(Self {
            identity_path,
            api_url,
            api_key,
            dev_target,
            hostname,
            ip_address,
            ssh_host,
            ssh_port,
            ssh_user,
            heartbeat_interval_ms,
        })
    }
}

fn hostname_fallback() -> Option<String> {
    std::fs::read_to_string("/etc/hostname").ok().map(|s| s.trim().to_string())
}
