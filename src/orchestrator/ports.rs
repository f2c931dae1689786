//! Host-local port allocator (spec §4.3 "Port allocation", §5 "Host-local
//! port range"). The persisted `Pod.ports` of every non-archived pod on a
//! host is authoritative; this is a thin first-fit scan over that view, not
//! an independent source of truth.

use std::ops::RangeInclusive;

use crate::error::{CoreError, CoreResult};
use crate::store::Store;

pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 20000..=59999;

#[derive(Clone)]
pub struct PortAllocator {
    range: RangeInclusive<u16>,
}

impl PortAllocator {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self { range }
    }

    /// First-fit with wrap-around starting just after `start_after`
    /// (spec §4.3), skipping ports held by any non-archived pod on `host_id`.
    pub async fn allocate(&self, store: &dyn Store, host_id: &str, start_after: Option<u16>) -> CoreResult<u16> {
        let held = store.held_ports_on_host(host_id).await?;
        let held: std::collections::HashSet<u16> = held.into_iter().map(|p| p.external).collect();

        let start = start_after.unwrap_or(*self.range.start());
        let span: Vec<u16> = self.range.clone().collect();
        let start_idx = span.iter().position(|p| *p == start).unwrap_or(0);

        for offset in 0..span.len() {
            let candidate = span[(start_idx + offset) % span.len()];
            if !held.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(CoreError::ResourceExhausted(format!(
            "no free port in {}..={} on host {host_id}",
            self.range.start(),
            self.range.end()
        )))
    }

    /// Allocate `count` distinct ports in one pass (e.g. `nginx-proxy` plus
    /// template-declared ports), so two concurrent allocations on the same
    /// host cannot collide against a read taken at different times.
    pub async fn allocate_many(&self, store: &dyn Store, host_id: &str, count: usize) -> CoreResult<Vec<u16>> {
        let held = store.held_ports_on_host(host_id).await?;
        let mut held: std::collections::HashSet<u16> = held.into_iter().map(|p| p.external).collect();
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let mut found = None;
            for candidate in self.range.clone() {
                if !held.contains(&candidate) {
                    found = Some(candidate);
                    break;
                }
            }
            let candidate = found.ok_or_else(|| {
                CoreError::ResourceExhausted(format!(
                    "no free port in {}..={} on host {host_id}",
                    self.range.start(),
                    self.range.end()
                ))
            })?;
            held.insert(candidate);
            out.push(candidate);
        }
        Ok(out)
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_RANGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Pod, PodConfig, PodStatus, PortMapping, Tier};
    use crate::store::{SqliteStore, Store};

    #[tokio::test]
    async fn allocates_first_free_port_when_nothing_is_held() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let allocator = PortAllocator::new(20000..=20005);
        let port = allocator.allocate(&store, "server_x", None).await.unwrap();
        assert_eq!(port, 20000);
    }

    #[tokio::test]
    async fn allocate_many_returns_distinct_ports() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let allocator = PortAllocator::new(20000..=20005);
        let ports = allocator.allocate_many(&store, "server_x", 3).await.unwrap();
        assert_eq!(ports.len(), 3);
        let unique: std::collections::HashSet<_> = ports.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[tokio::test]
    async fn allocation_fails_when_range_is_exhausted() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();

        let host_id = "server_full";
        for port in 20000u16..=20002 {
            let now = chrono::Utc::now();
            let pod = Pod {
                id: crate::model::PodId::new(),
                name: "p".into(),
                slug: format!("p-{port}"),
                owner_user_id: "user_1".into(),
                owner_team_id: "team_1".into(),
                host_id: Some(host_id.to_string()),
                container_id: None,
                template: "t".into(),
                tier: Tier::DevSmall,
                config: PodConfig::default(),
                ports: vec![PortMapping { name: "nginx-proxy".into(), internal: 80, external: port }],
                status: PodStatus::Running,
                last_error_message: None,
                archived_at: None,
                created_at: now,
                updated_at: now,
            };
            store.insert_pod(&pod).await.unwrap();
        }

        let allocator = PortAllocator::new(20000..=20002);
        let result = allocator.allocate(&store, host_id, None).await;
        assert!(result.is_err());
    }
}
