//! Upstream pool (spec §4.7 "Upstream pool"): a process-wide cache from
//! `(podId, targetPort)` to a resolved upstream, TTL 30s, single-flight per
//! key so concurrent requests that miss the cache coalesce onto one
//! resolution instead of racing.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::CoreResult;
use crate::model::PodId;

#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    pub base_url: String,
    /// Canonical in-pod `Host` header value (spec §4.7 "Upstream
    /// resolution").
    pub host_header: String,
}

struct CacheEntry {
    target: UpstreamTarget,
    created_at: Instant,
}

pub struct UpstreamPool {
    entries: DashMap<(PodId, u16), Arc<Mutex<Option<CacheEntry>>>>,
    ttl: Duration,
}

impl UpstreamPool {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    /// Return the cached upstream for `(pod_id, target_port)` if still
    /// within TTL, otherwise call `resolve` to build a fresh one. Holding
    /// the per-key lock across `resolve`'s await point is what makes
    /// concurrent misses coalesce onto a single resolution.
    pub async fn get_or_resolve<F, Fut>(&self, pod_id: PodId, target_port: u16, resolve: F) -> CoreResult<UpstreamTarget>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoreResult<UpstreamTarget>>,
    {
        let slot = self
            .entries
            .entry((pod_id, target_port))
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref() {
            if entry.created_at.elapsed() < self.ttl {
                return Ok(entry.target.clone());
            }
        }

        let target = resolve().await?;
        *guard = Some(CacheEntry { target: target.clone(), created_at: Instant::now() });
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn caches_within_ttl() {
        let pool = UpstreamPool::new(Duration::from_secs(30));
        let calls = AtomicU32::new(0);
        let pod_id = PodId::new();

        for _ in 0..3 {
            pool.get_or_resolve(pod_id, 3000, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(UpstreamTarget { base_url: "http://10.0.0.1:40000".into(), host_header: "h".into() })
            })
            .await
            .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recreates_after_ttl_expiry() {
        let pool = UpstreamPool::new(Duration::from_millis(10));
        let calls = AtomicU32::new(0);
        let pod_id = PodId::new();

        pool.get_or_resolve(pod_id, 3000, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(UpstreamTarget { base_url: "http://a".into(), host_header: "h".into() })
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.get_or_resolve(pod_id, 3000, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(UpstreamTarget { base_url: "http://b".into(), host_header: "h".into() })
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn distinct_ports_get_distinct_entries() {
        let pool = UpstreamPool::new(Duration::from_secs(30));
        let calls = AtomicU32::new(0);
        let pod_id = PodId::new();

        for port in [3000, 3001] {
            pool.get_or_resolve(pod_id, port, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(UpstreamTarget { base_url: "http://a".into(), host_header: "h".into() })
            })
            .await
            .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
