//! Proxy hostname grammar (spec §4.7): `localhost-<port>.pod-<slug>.<base-
//! domain>[:<port>]`. Anything else is not a proxy hostname and should pass
//! through to the application's own router unmodified.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHostname {
    pub target_port: u16,
    pub pod_slug: String,
}

static HOSTNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^localhost-(?P<port>[0-9]{1,5})\.pod-(?P<slug>[a-z0-9][a-z0-9-]{1,62})\.(?P<base>.+)$").unwrap());

impl ProxyHostname {
    /// Parse the `Host` header (with any `:<listenPort>` suffix already
    /// stripped by the caller) against a configured base domain. Returns
    /// `None` for any hostname that does not match the grammar, including
    /// one that matches syntactically but was issued for a different base
    /// domain — both cases mean "not a proxy request".
    pub fn parse(host: &str, base_domain: &str) -> Option<Self> {
        let host = host.split(':').next().unwrap_or(host);
        let captures = HOSTNAME_RE.captures(host)?;

        if &captures["base"] != base_domain {
            return None;
        }

        let target_port: u16 = captures["port"].parse().ok()?;
        if target_port == 0 {
            return None;
        }

        Some(Self {
            target_port,
            pod_slug: captures["slug"].to_string(),
        })
    }

    /// The canonical in-pod `Host` header the upstream nginx expects (spec
    /// §4.7 "Upstream resolution").
    pub fn canonical_host(&self, base_domain: &str) -> String {
        format!("localhost-{}.pod-{}.{base_domain}", self.target_port, self.pod_slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_hostname() {
        let parsed = ProxyHostname::parse("localhost-3000.pod-my-app.pinacle.dev", "pinacle.dev").unwrap();
        assert_eq!(parsed.target_port, 3000);
        assert_eq!(parsed.pod_slug, "my-app");
    }

    #[test]
    fn strips_listen_port_suffix() {
        let parsed = ProxyHostname::parse("localhost-3000.pod-my-app.pinacle.dev:8443", "pinacle.dev").unwrap();
        assert_eq!(parsed.target_port, 3000);
    }

    #[test]
    fn rejects_wrong_base_domain() {
        assert!(ProxyHostname::parse("localhost-3000.pod-my-app.other.dev", "pinacle.dev").is_none());
    }

    #[test]
    fn passes_through_unrelated_hostnames() {
        assert!(ProxyHostname::parse("www.pinacle.dev", "pinacle.dev").is_none());
        assert!(ProxyHostname::parse("api.pinacle.dev", "pinacle.dev").is_none());
    }

    #[test]
    fn rejects_port_zero() {
        assert!(ProxyHostname::parse("localhost-0.pod-my-app.pinacle.dev", "pinacle.dev").is_none());
    }

    #[test]
    fn canonical_host_round_trips() {
        let parsed = ProxyHostname::parse("localhost-3000.pod-my-app.pinacle.dev", "pinacle.dev").unwrap();
        assert_eq!(parsed.canonical_host("pinacle.dev"), "localhost-3000.pod-my-app.pinacle.dev");
    }
}
