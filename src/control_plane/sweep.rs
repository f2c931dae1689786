//! Background sweep marking hosts offline once their heartbeat goes stale
//! (spec §4.5 `SelectHost` depends on an accurate `status` column).

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::store::Store;

pub async fn run(store: Arc<dyn Store>, stale_threshold: chrono::Duration, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match store.mark_offline_if_stale(stale_threshold).await {
            Ok(marked) if !marked.is_empty() => info!(count = marked.len(), "marked hosts offline due to stale heartbeat"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "stale-host sweep failed"),
        }
    }
}
