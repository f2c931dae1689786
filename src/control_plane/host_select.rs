//! `SelectHost()` (spec §4.5): first-fit by creation order among hosts that
//! are online and whose heartbeat is not stale. No load balancing in the
//! core — the policy is intentionally pluggable, not optimized.

use chrono::Utc;

use crate::error::{CoreError, CoreResult};
use crate::model::{Server, ServerStatus};
use crate::store::Store;

pub async fn select_host(store: &dyn Store, stale_threshold: chrono::Duration) -> CoreResult<Server> {
    let now = Utc::now();
    let mut servers = store.list_servers().await?;
    servers.sort_by_key(|s| s.created_at);

    servers
        .into_iter()
        .find(|s| s.status == ServerStatus::Online && !s.is_stale(now, stale_threshold))
        .ok_or_else(|| CoreError::ResourceExhausted("no online host satisfies the heartbeat freshness requirement".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SshEndpoint;
    use crate::store::sqlite::SqliteStore;
    use crate::store::Store as _;

    fn server(created_offset_secs: i64, heartbeat_age_secs: i64, status: ServerStatus) -> Server {
        let now = Utc::now();
        Server {
            id: crate::model::ServerId::new(),
            hostname: "host".into(),
            ip_address: "10.0.0.1".into(),
            cpu_cores: 4,
            memory_mb: 8192,
            disk_gb: 100,
            ssh: SshEndpoint { host: "10.0.0.1".into(), port: 22, user: "pinacle".into() },
            local_vm_name: None,
            status,
            last_heartbeat_at: now - chrono::Duration::seconds(heartbeat_age_secs),
            created_at: now - chrono::Duration::seconds(created_offset_secs),
        }
    }

    #[tokio::test]
    async fn picks_earliest_created_online_host() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let older = server(100, 5, ServerStatus::Online);
        let newer = server(50, 5, ServerStatus::Online);
        store.upsert_server(&older).await.unwrap();
        store.upsert_server(&newer).await.unwrap();

        let selected = select_host(&store, chrono::Duration::seconds(90)).await.unwrap();
        assert_eq!(selected.id, older.id);
    }

    #[tokio::test]
    async fn skips_stale_and_offline_hosts() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let stale = server(100, 9999, ServerStatus::Online);
        let offline = server(90, 5, ServerStatus::Offline);
        let healthy = server(80, 5, ServerStatus::Online);
        store.upsert_server(&stale).await.unwrap();
        store.upsert_server(&offline).await.unwrap();
        store.upsert_server(&healthy).await.unwrap();

        let selected = select_host(&store, chrono::Duration::seconds(90)).await.unwrap();
        assert_eq!(selected.id, healthy.id);
    }

    #[tokio::test]
    async fn errors_when_no_host_qualifies() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        store.upsert_server(&server(100, 9999, ServerStatus::Offline)).await.unwrap();
        assert!(select_host(&store, chrono::Duration::seconds(90)).await.is_err());
    }
}
