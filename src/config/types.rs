//! Typed, env-var-sourced settings (spec §6 "Environment variables").

use anyhow::{Context, Result};

use super::timeouts::Timeouts;

#[derive(Debug, Clone)]
pub struct DualTarget {
    pub api_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct S3StorageConfig {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Filesystem { base_path: String },
    S3(S3StorageConfig),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub api_key: String,
    pub dev_target: Option<DualTarget>,
    pub ssh_user: String,
    pub ssh_port: u16,
    pub ssh_private_key_path: String,
    pub container_cli: String,
    pub sandboxed_runtime_class: String,
    pub storage: StorageBackend,
    pub proxy_token_signing_key: String,
    pub proxy_base_domain: String,
    pub timeouts: Timeouts,
    /// Host-wide external port range (spec §4.3).
    pub port_range: std::ops::RangeInclusive<u16>,
    pub dev_mode: bool,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let api_url = env_var("API_URL").unwrap_or_else(|| "http://localhost:8080".to_string());
        let api_key = env_var("API_KEY").context("API_KEY must be set")?;

        let dev_target = match (env_var("DEV_API_URL"), env_var("DEV_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(DualTarget { api_url, api_key }),
            _ => None,
        };

        let ssh_user = env_var("SSH_USER").unwrap_or_else(|| "pinacle".to_string());
        let ssh_port = env_var("SSH_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(22);
        let ssh_private_key_path = env_var("SSH_PRIVATE_KEY_PATH").unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".ssh/id_ed25519").display().to_string())
                .unwrap_or_else(|| "/root/.ssh/id_ed25519".to_string())
        });
        let container_cli = env_var("CONTAINER_CLI").unwrap_or_else(|| "docker".to_string());
        let sandboxed_runtime_class = env_var("SANDBOXED_RUNTIME_CLASS").unwrap_or_else(|| "runsc".to_string());

        let storage = if let Some(bucket) = env_var("SNAPSHOT_S3_BUCKET") {
            StorageBackend::S3(S3StorageConfig {
                endpoint: env_var("SNAPSHOT_S3_ENDPOINT"),
                bucket,
                region: env_var("SNAPSHOT_S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key: env_var("SNAPSHOT_S3_ACCESS_KEY").context("SNAPSHOT_S3_ACCESS_KEY must be set")?,
                secret_key: env_var("SNAPSHOT_S3_SECRET_KEY").context("SNAPSHOT_S3_SECRET_KEY must be set")?,
            })
        } else {
            StorageBackend::Filesystem {
                base_path: env_var("SNAPSHOT_STORAGE_PATH").unwrap_or_else(|| "/var/lib/pinacle/snapshots".to_string()),
            }
        };

        let proxy_token_signing_key =
            env_var("PROXY_TOKEN_SIGNING_KEY").context("PROXY_TOKEN_SIGNING_KEY must be set")?;
        let proxy_base_domain = env_var("PROXY_BASE_DOMAIN").unwrap_or_else(|| "pinacle.dev".to_string());

        Ok(Self {
            api_url,
            api_key,
            dev_target,
            ssh_user,
            ssh_port,
            ssh_private_key_path,
            container_cli,
            sandboxed_runtime_class,
            storage,
            proxy_token_signing_key,
            proxy_base_domain,
            timeouts: Timeouts::from_env(),
            port_range: 20_000..=59_999,
            dev_mode: env_var("PINACLE_DEV").is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch
    // them so they don't interleave with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn falls_back_to_filesystem_storage_without_s3_bucket() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("SNAPSHOT_S3_BUCKET");
        std::env::set_var("API_KEY", "test-key");
        std::env::set_var("PROXY_TOKEN_SIGNING_KEY", "test-signing-key");
        let settings = Settings::from_env().unwrap();
        assert!(matches!(settings.storage, StorageBackend::Filesystem { .. }));
        std::env::remove_var("API_KEY");
        std::env::remove_var("PROXY_TOKEN_SIGNING_KEY");
    }

    #[test]
    fn picks_s3_storage_when_bucket_is_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("API_KEY", "test-key");
        std::env::set_var("PROXY_TOKEN_SIGNING_KEY", "test-signing-key");
        std::env::set_var("SNAPSHOT_S3_BUCKET", "pinacle-snapshots");
        std::env::set_var("SNAPSHOT_S3_ACCESS_KEY", "ak");
        std::env::set_var("SNAPSHOT_S3_SECRET_KEY", "sk");
        let settings = Settings::from_env().unwrap();
        assert!(matches!(settings.storage, StorageBackend::S3(_)));
        for key in [
            "API_KEY",
            "PROXY_TOKEN_SIGNING_KEY",
            "SNAPSHOT_S3_BUCKET",
            "SNAPSHOT_S3_ACCESS_KEY",
            "SNAPSHOT_S3_SECRET_KEY",
        ] {
            std::env::remove_var(key);
        }
    }
}
