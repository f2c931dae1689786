//! Scoped Proxy Token claims (spec §3, §4.7, §6).

use serde::{Deserialize, Serialize};

use super::ids::PodId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyClaims {
    pub user_id: String,
    pub pod_id: PodId,
    pub pod_slug: String,
    pub target_port: u16,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds. Caller must enforce `exp <= iat + 15 * 60`.
    pub exp: i64,
}

/// Hard cap on token lifetime (spec §3: "expiry ≤ 15 min").
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 15 * 60;
