// ── Runtime gateway configuration ──
//
// These types describe *which* backends the gateway bridges and how the
// per-session machinery behaves. They carry credential data and tuning,
// but never touch disk: `hashilink-config` builds a `GatewayConfig` and
// hands it in, and it is immutable from then on.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

/// The two upstream systems the gateway bridges.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    /// Job orchestration (multi-region).
    Nomad,
    /// Service discovery and KV (one datacenter per gateway).
    Consul,
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (`skip_verify`).
    DangerAcceptInvalid,
}

/// Client certificate and key for mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Configuration for one enabled backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Agent URL (e.g., `http://127.0.0.1:4646`).
    pub address: Url,
    pub tls: TlsVerification,
    pub client_cert: Option<ClientCertificate>,
    pub acl_token: Option<SecretString>,
    /// Reject every mutating command.
    pub read_only: bool,
    /// Known regions (Nomad) or the single datacenter (Consul). The first
    /// entry is the primary region used when a connection names none.
    pub regions: Vec<String>,
    /// Resource types watched automatically when a session opens.
    pub default_watches: Vec<String>,
    /// Strip task `Env` maps from job and allocation payloads (Nomad).
    pub hide_env_data: bool,
    /// Ask the agent for `/v1/regions` at startup (Nomad).
    pub discover_regions: bool,
    /// Timeout for non-blocking requests.
    pub timeout: Duration,
}

impl BackendConfig {
    /// A backend with defaults for everything but kind and address.
    pub fn new(kind: BackendKind, address: Url) -> Self {
        let region = match kind {
            BackendKind::Nomad => "global",
            BackendKind::Consul => "dc1",
        };
        Self {
            kind,
            address,
            tls: TlsVerification::default(),
            client_cert: None,
            acl_token: None,
            read_only: false,
            regions: vec![region.into()],
            default_watches: Vec::new(),
            hide_env_data: false,
            discover_regions: false,
            timeout: Duration::from_secs(30),
        }
    }

    /// The region used when a connection does not name one.
    pub fn primary_region(&self) -> &str {
        self.regions.first().map_or("global", String::as_str)
    }
}

/// Tuning for subscription pollers.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Server-side wait for each blocking query.
    pub wait: Duration,
    /// Delay before the first retry after a transient failure.
    pub initial_backoff: Duration,
    /// Upper bound on the retry delay.
    pub max_backoff: Duration,
    /// Consecutive transient failures before the poller gives up.
    pub max_consecutive_failures: u32,
    /// Re-fetch period for resources without blocking support.
    pub interval: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(60),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_consecutive_failures: 8,
            interval: Duration::from_secs(10),
        }
    }
}

/// Tuning for connection sessions.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// How long teardown waits for pollers to acknowledge cancellation.
    pub teardown_grace: Duration,
    /// Capacity of the outbound event queue shared by a session's pollers.
    pub outbound_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            teardown_grace: Duration::from_secs(2),
            outbound_buffer: 256,
        }
    }
}

/// Everything the core needs, resolved once at startup.
///
/// A backend that is `None` is disabled.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub nomad: Option<BackendConfig>,
    pub consul: Option<BackendConfig>,
    pub poller: PollerSettings,
    pub session: SessionSettings,
}

impl GatewayConfig {
    /// Enabled backends, Nomad first.
    pub fn backends(&self) -> impl Iterator<Item = &BackendConfig> {
        self.nomad.iter().chain(self.consul.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_round_trips_through_strings() {
        assert_eq!("nomad".parse::<BackendKind>().unwrap(), BackendKind::Nomad);
        assert_eq!(BackendKind::Consul.to_string(), "consul");
        assert!("vault".parse::<BackendKind>().is_err());
    }

    #[test]
    fn primary_region_defaults_per_kind() {
        let url: Url = "http://127.0.0.1:8500".parse().unwrap();
        assert_eq!(BackendConfig::new(BackendKind::Consul, url.clone()).primary_region(), "dc1");
        assert_eq!(BackendConfig::new(BackendKind::Nomad, url).primary_region(), "global");
    }
}
