//! SQLite-backed `Store` (spec §4.8). Timestamps are stored as RFC3339
//! text; JSON-shaped columns (`config`, `ports`) are stored as serialized
//! text rather than normalized tables, matching how the orchestrator reads
//! and writes them as whole values.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::model::pod::{PodConfig, PodStatus, PortMapping, Tier};
use crate::model::snapshot::SnapshotStatus;
use crate::model::{Pod, PodId, PodLog, PodMetricsSample, Server, ServerId, ServerMetricsSample, ServerStatus, SnapshotId, SnapshotRecord, SshEndpoint};

use super::{HeldPort, Store};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> CoreResult<Self> {
        // A bare `sqlite::memory:` URL gives each pooled connection its own
        // anonymous database, so pin the pool to one connection in that case.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 8 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_ts(raw: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::Other(e.into()))
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_server(&self, server: &Server) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO servers (id, hostname, ip_address, cpu_cores, memory_mb, disk_gb, ssh_host, ssh_port, ssh_user, local_vm_name, status, last_heartbeat_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                hostname = excluded.hostname,
                ip_address = excluded.ip_address,
                cpu_cores = excluded.cpu_cores,
                memory_mb = excluded.memory_mb,
                disk_gb = excluded.disk_gb,
                ssh_host = excluded.ssh_host,
                ssh_port = excluded.ssh_port,
                ssh_user = excluded.ssh_user,
                local_vm_name = excluded.local_vm_name,
                status = excluded.status,
                last_heartbeat_at = excluded.last_heartbeat_at
            "#,
        )
        .bind(server.id.to_string())
        .bind(&server.hostname)
        .bind(&server.ip_address)
        .bind(server.cpu_cores)
        .bind(server.memory_mb as i64)
        .bind(server.disk_gb as i64)
        .bind(&server.ssh.host)
        .bind(server.ssh.port as i64)
        .bind(&server.ssh.user)
        .bind(&server.local_vm_name)
        .bind(if server.status == ServerStatus::Online { "online" } else { "offline" })
        .bind(ts(server.last_heartbeat_at))
        .bind(ts(server.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Other(e.into()))?;
        Ok(())
    }

    async fn get_server(&self, id: &ServerId) -> CoreResult<Option<Server>> {
        let row = sqlx::query("SELECT * FROM servers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        row.map(|r| row_to_server(&r)).transpose()
    }

    async fn list_servers(&self) -> CoreResult<Vec<Server>> {
        let rows = sqlx::query("SELECT * FROM servers ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        rows.iter().map(row_to_server).collect()
    }

    async fn touch_heartbeat(&self, id: &ServerId, at: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query("UPDATE servers SET last_heartbeat_at = ?, status = 'online' WHERE id = ?")
            .bind(ts(at))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        Ok(())
    }

    async fn mark_offline_if_stale(&self, stale_threshold: chrono::Duration) -> CoreResult<Vec<ServerId>> {
        let cutoff = ts(Utc::now() - stale_threshold);
        let rows = sqlx::query("SELECT id FROM servers WHERE last_heartbeat_at < ? AND status = 'online'")
            .bind(&cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        let ids: Vec<ServerId> = rows
            .iter()
            .map(|r| ServerId::from_str(r.get::<String, _>("id").as_str()))
            .collect::<Result<_, _>>()
            .map_err(|e| CoreError::Other(e.into()))?;

        sqlx::query("UPDATE servers SET status = 'offline' WHERE last_heartbeat_at < ? AND status = 'online'")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        Ok(ids)
    }

    async fn insert_pod(&self, pod: &Pod) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pods (id, name, slug, owner_user_id, owner_team_id, host_id, container_id, template, tier, config_json, ports_json, status, last_error_message, archived_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(pod.id.to_string())
        .bind(&pod.name)
        .bind(&pod.slug)
        .bind(&pod.owner_user_id)
        .bind(&pod.owner_team_id)
        .bind(&pod.host_id)
        .bind(&pod.container_id)
        .bind(&pod.template)
        .bind(pod.tier.tag())
        .bind(serde_json::to_string(&pod.config).map_err(|e| CoreError::Other(e.into()))?)
        .bind(serde_json::to_string(&pod.ports).map_err(|e| CoreError::Other(e.into()))?)
        .bind(pod.status.as_str())
        .bind(&pod.last_error_message)
        .bind(pod.archived_at.map(ts))
        .bind(ts(pod.created_at))
        .bind(ts(pod.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Other(e.into()))?;
        Ok(())
    }

    async fn get_pod(&self, id: &PodId) -> CoreResult<Option<Pod>> {
        let row = sqlx::query("SELECT * FROM pods WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        row.map(|r| row_to_pod(&r)).transpose()
    }

    async fn get_pod_by_slug(&self, slug: &str) -> CoreResult<Option<Pod>> {
        let row = sqlx::query("SELECT * FROM pods WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        row.map(|r| row_to_pod(&r)).transpose()
    }

    async fn update_pod(&self, pod: &Pod, expected_updated_at: DateTime<Utc>) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE pods SET
                name = ?, host_id = ?, container_id = ?, tier = ?, config_json = ?, ports_json = ?,
                status = ?, last_error_message = ?, archived_at = ?, updated_at = ?
            WHERE id = ? AND updated_at = ?
            "#,
        )
        .bind(&pod.name)
        .bind(&pod.host_id)
        .bind(&pod.container_id)
        .bind(pod.tier.tag())
        .bind(serde_json::to_string(&pod.config).map_err(|e| CoreError::Other(e.into()))?)
        .bind(serde_json::to_string(&pod.ports).map_err(|e| CoreError::Other(e.into()))?)
        .bind(pod.status.as_str())
        .bind(&pod.last_error_message)
        .bind(pod.archived_at.map(ts))
        .bind(ts(pod.updated_at))
        .bind(pod.id.to_string())
        .bind(ts(expected_updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::Conflict(format!(
                "pod {} was modified concurrently (expected updated_at {expected_updated_at})",
                pod.id
            )));
        }
        Ok(())
    }

    async fn delete_pod(&self, id: &PodId) -> CoreResult<()> {
        sqlx::query("DELETE FROM pods WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        Ok(())
    }

    async fn list_pods_on_host(&self, host_id: &str, include_archived: bool) -> CoreResult<Vec<Pod>> {
        let rows = if include_archived {
            sqlx::query("SELECT * FROM pods WHERE host_id = ?")
                .bind(host_id)
                .fetch_all(&self.pool)
                .await
        } else {
            sqlx::query("SELECT * FROM pods WHERE host_id = ? AND archived_at IS NULL")
                .bind(host_id)
                .fetch_all(&self.pool)
                .await
        }
        .map_err(|e| CoreError::Other(e.into()))?;
        rows.iter().map(row_to_pod).collect()
    }

    async fn held_ports_on_host(&self, host_id: &str) -> CoreResult<Vec<HeldPort>> {
        let pods = self.list_pods_on_host(host_id, false).await?;
        Ok(pods
            .iter()
            .flat_map(|p| p.ports.iter().map(|port| HeldPort { external: port.external }))
            .collect())
    }

    async fn append_pod_log(&self, log: &PodLog) -> CoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO pod_logs (pod_id, timestamp, label, command, container_command, stdout, stderr, exit_code, duration_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.pod_id.to_string())
        .bind(ts(log.timestamp))
        .bind(&log.label)
        .bind(&log.command)
        .bind(&log.container_command)
        .bind(&log.stdout)
        .bind(&log.stderr)
        .bind(log.exit_code)
        .bind(log.duration_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Other(e.into()))?;
        Ok(result.last_insert_rowid())
    }

    async fn update_pod_log(&self, id: i64, stdout: Option<&str>, stderr: Option<&str>, exit_code: Option<i32>, duration_ms: Option<i64>) -> CoreResult<()> {
        sqlx::query("UPDATE pod_logs SET stdout = ?, stderr = ?, exit_code = ?, duration_ms = ? WHERE id = ?")
            .bind(stdout)
            .bind(stderr)
            .bind(exit_code)
            .bind(duration_ms)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        Ok(())
    }

    async fn pod_logs_after(&self, pod_id: &PodId, after_id: i64) -> CoreResult<Vec<PodLog>> {
        let rows = sqlx::query("SELECT * FROM pod_logs WHERE pod_id = ? AND id > ? ORDER BY id ASC")
            .bind(pod_id.to_string())
            .bind(after_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        rows.iter().map(row_to_pod_log).collect()
    }

    async fn insert_snapshot(&self, snapshot: &SnapshotRecord) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (id, pod_id, created_at, status, storage_path, size_bytes, manifest_version)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.id.to_string())
        .bind(snapshot.pod_id.to_string())
        .bind(ts(snapshot.created_at))
        .bind(snapshot_status_str(snapshot.status))
        .bind(&snapshot.storage_path)
        .bind(snapshot.size_bytes as i64)
        .bind(&snapshot.manifest_version)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Other(e.into()))?;
        Ok(())
    }

    async fn update_snapshot_status(&self, id: &SnapshotId, status: SnapshotStatus, size_bytes: Option<u64>) -> CoreResult<()> {
        sqlx::query("UPDATE snapshots SET status = ?, size_bytes = COALESCE(?, size_bytes) WHERE id = ?")
            .bind(snapshot_status_str(status))
            .bind(size_bytes.map(|b| b as i64))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        Ok(())
    }

    async fn get_snapshot(&self, id: &SnapshotId) -> CoreResult<Option<SnapshotRecord>> {
        let row = sqlx::query("SELECT * FROM snapshots WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        row.map(|r| row_to_snapshot(&r)).transpose()
    }

    async fn list_snapshots_for_pod(&self, pod_id: &PodId) -> CoreResult<Vec<SnapshotRecord>> {
        let rows = sqlx::query("SELECT * FROM snapshots WHERE pod_id = ? ORDER BY created_at DESC")
            .bind(pod_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        rows.iter().map(row_to_snapshot).collect()
    }

    async fn delete_snapshots_for_pod(&self, pod_id: &PodId) -> CoreResult<()> {
        sqlx::query("DELETE FROM snapshots WHERE pod_id = ?")
            .bind(pod_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        Ok(())
    }

    async fn record_server_metrics(&self, sample: &ServerMetricsSample) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO server_metrics (server_id, cpu_usage_percent, memory_usage_mb, disk_usage_gb, active_pods_count, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sample.server_id.to_string())
        .bind(sample.cpu_usage_percent)
        .bind(sample.memory_usage_mb)
        .bind(sample.disk_usage_gb)
        .bind(sample.active_pods_count)
        .bind(ts(sample.recorded_at))
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Other(e.into()))?;
        Ok(())
    }

    async fn record_pod_metrics(&self, sample: &PodMetricsSample) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pod_metrics (pod_id, container_id, cpu_usage_percent, memory_usage_mb, disk_usage_mb, network_rx_bytes, network_tx_bytes, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sample.pod_id.to_string())
        .bind(&sample.container_id)
        .bind(sample.cpu_usage_percent)
        .bind(sample.memory_usage_mb)
        .bind(sample.disk_usage_mb)
        .bind(sample.network_rx_bytes as i64)
        .bind(sample.network_tx_bytes as i64)
        .bind(ts(sample.recorded_at))
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Other(e.into()))?;
        Ok(())
    }

    async fn prune_metrics_older_than(&self, cutoff: DateTime<Utc>) -> CoreResult<()> {
        let cutoff = ts(cutoff);
        sqlx::query("DELETE FROM server_metrics WHERE recorded_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        sqlx::query("DELETE FROM pod_metrics WHERE recorded_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        Ok(())
    }
}

fn snapshot_status_str(status: SnapshotStatus) -> &'static str {
    match status {
        SnapshotStatus::Creating => "creating",
        SnapshotStatus::Ready => "ready",
        SnapshotStatus::Failed => "failed",
    }
}

fn row_to_server(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Server> {
    let status: String = row.get("status");
    Ok(Server {
        id: ServerId::from_str(row.get::<String, _>("id").as_str()).map_err(|e| CoreError::Other(e.into()))?,
        hostname: row.get("hostname"),
        ip_address: row.get("ip_address"),
        cpu_cores: row.get::<i64, _>("cpu_cores") as u32,
        memory_mb: row.get::<i64, _>("memory_mb") as u64,
        disk_gb: row.get::<i64, _>("disk_gb") as u64,
        ssh: SshEndpoint {
            host: row.get("ssh_host"),
            port: row.get::<i64, _>("ssh_port") as u16,
            user: row.get("ssh_user"),
        },
        local_vm_name: row.get("local_vm_name"),
        status: if status == "online" { ServerStatus::Online } else { ServerStatus::Offline },
        last_heartbeat_at: parse_ts(&row.get::<String, _>("last_heartbeat_at"))?,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

fn row_to_pod(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Pod> {
    let config_json: String = row.get("config_json");
    let ports_json: String = row.get("ports_json");
    let status: String = row.get("status");
    let tier: String = row.get("tier");
    let archived_at: Option<String> = row.get("archived_at");

    Ok(Pod {
        id: PodId::from_str(row.get::<String, _>("id").as_str()).map_err(|e| CoreError::Other(e.into()))?,
        name: row.get("name"),
        slug: row.get("slug"),
        owner_user_id: row.get("owner_user_id"),
        owner_team_id: row.get("owner_team_id"),
        host_id: row.get("host_id"),
        container_id: row.get("container_id"),
        template: row.get("template"),
        tier: Tier::from_tag(&tier)?,
        config: serde_json::from_str::<PodConfig>(&config_json).map_err(|e| CoreError::Other(e.into()))?,
        ports: serde_json::from_str::<Vec<PortMapping>>(&ports_json).map_err(|e| CoreError::Other(e.into()))?,
        status: parse_pod_status(&status)?,
        last_error_message: row.get("last_error_message"),
        archived_at: archived_at.map(|s| parse_ts(&s)).transpose()?,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
    })
}

fn parse_pod_status(raw: &str) -> CoreResult<PodStatus> {
    match raw {
        "creating" => Ok(PodStatus::Creating),
        "provisioning" => Ok(PodStatus::Provisioning),
        "running" => Ok(PodStatus::Running),
        "stopping" => Ok(PodStatus::Stopping),
        "stopped" => Ok(PodStatus::Stopped),
        "deleting" => Ok(PodStatus::Deleting),
        "error" => Ok(PodStatus::Error),
        other => Err(CoreError::Invariant(format!("unknown pod status {other:?}"))),
    }
}

fn row_to_pod_log(row: &sqlx::sqlite::SqliteRow) -> CoreResult<PodLog> {
    Ok(PodLog {
        id: row.get("id"),
        pod_id: PodId::from_str(row.get::<String, _>("pod_id").as_str()).map_err(|e| CoreError::Other(e.into()))?,
        timestamp: parse_ts(&row.get::<String, _>("timestamp"))?,
        label: row.get("label"),
        command: row.get("command"),
        container_command: row.get("container_command"),
        stdout: row.get("stdout"),
        stderr: row.get("stderr"),
        exit_code: row.get("exit_code"),
        duration_ms: row.get("duration_ms"),
    })
}

fn row_to_snapshot(row: &sqlx::sqlite::SqliteRow) -> CoreResult<SnapshotRecord> {
    let status: String = row.get("status");
    Ok(SnapshotRecord {
        id: SnapshotId::from_str(row.get::<String, _>("id").as_str()).map_err(|e| CoreError::Other(e.into()))?,
        pod_id: PodId::from_str(row.get::<String, _>("pod_id").as_str()).map_err(|e| CoreError::Other(e.into()))?,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        status: match status.as_str() {
            "creating" => SnapshotStatus::Creating,
            "ready" => SnapshotStatus::Ready,
            "failed" => SnapshotStatus::Failed,
            other => return Err(CoreError::Invariant(format!("unknown snapshot status {other:?}"))),
        },
        storage_path: row.get("storage_path"),
        size_bytes: row.get::<i64, _>("size_bytes") as u64,
        manifest_version: row.get("manifest_version"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::pod::PodConfig;

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    fn sample_server() -> Server {
        let now = Utc::now();
        Server {
            id: ServerId::new(),
            hostname: "host-a".into(),
            ip_address: "10.0.0.5".into(),
            cpu_cores: 8,
            memory_mb: 16384,
            disk_gb: 200,
            ssh: SshEndpoint { host: "10.0.0.5".into(), port: 22, user: "pinacle".into() },
            local_vm_name: None,
            status: ServerStatus::Online,
            last_heartbeat_at: now,
            created_at: now,
        }
    }

    fn sample_pod(host_id: Option<&str>) -> Pod {
        let now = Utc::now();
        Pod {
            id: PodId::new(),
            name: "demo".into(),
            slug: format!("demo-{}", PodId::new()),
            owner_user_id: "user_1".into(),
            owner_team_id: "team_1".into(),
            host_id: host_id.map(String::from),
            container_id: None,
            template: "nodejs-blank".into(),
            tier: Tier::DevSmall,
            config: PodConfig::default(),
            ports: vec![],
            status: PodStatus::Creating,
            last_error_message: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn round_trips_server() {
        let store = memory_store().await;
        let server = sample_server();
        store.upsert_server(&server).await.unwrap();
        let loaded = store.get_server(&server.id).await.unwrap().unwrap();
        assert_eq!(loaded.hostname, server.hostname);
        assert_eq!(loaded.status, ServerStatus::Online);
    }

    #[tokio::test]
    async fn update_pod_rejects_stale_version() {
        let store = memory_store().await;
        sqlx::query("INSERT INTO users (id) VALUES ('user_1')").execute(&store.pool).await.unwrap();
        let mut pod = sample_pod(Some("server_x"));
        store.insert_pod(&pod).await.unwrap();

        let stale_updated_at = pod.updated_at;
        pod.status = PodStatus::Provisioning;
        pod.updated_at = Utc::now() + chrono::Duration::seconds(1);
        store.update_pod(&pod, stale_updated_at).await.unwrap();

        // Second writer still thinks `stale_updated_at` is current — conflict.
        pod.status = PodStatus::Error;
        let result = store.update_pod(&pod, stale_updated_at).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn pod_logs_are_returned_strictly_after_the_given_id() {
        let store = memory_store().await;
        sqlx::query("INSERT INTO users (id) VALUES ('user_1')").execute(&store.pool).await.unwrap();
        let pod = sample_pod(None);
        store.insert_pod(&pod).await.unwrap();

        let log = |command: &str| PodLog {
            id: 0,
            pod_id: pod.id.clone(),
            timestamp: Utc::now(),
            label: Some(command.to_string()),
            command: command.to_string(),
            container_command: None,
            stdout: None,
            stderr: None,
            exit_code: Some(0),
            duration_ms: Some(1),
        };

        let first_id = store.append_pod_log(&log("step-1")).await.unwrap();
        store.append_pod_log(&log("step-2")).await.unwrap();

        let after = store.pod_logs_after(&pod.id, first_id).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].command, "step-2");
    }

    #[tokio::test]
    async fn held_ports_excludes_archived_pods() {
        let store = memory_store().await;
        sqlx::query("INSERT INTO users (id) VALUES ('user_1')").execute(&store.pool).await.unwrap();

        let mut pod = sample_pod(Some("server_x"));
        pod.ports = vec![PortMapping { name: "nginx-proxy".into(), internal: 80, external: 21000 }];
        store.insert_pod(&pod).await.unwrap();

        let held = store.held_ports_on_host("server_x").await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].external, 21000);
    }
}
