//! Configuration for the hashilink gateway.
//!
//! TOML file + `HASHILINK_` environment variables, validated and
//! translated into the immutable `hashilink_core::GatewayConfig` the
//! server runs on.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hashilink_core::{
    BackendConfig, BackendKind, ClientCertificate, GatewayConfig, PollerSettings, SessionSettings,
    TlsVerification, capability,
};

const ENV_PREFIX: &str = "HASHILINK_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no backend enabled; set nomad.enable or consul.enable")]
    NoBackend,

    #[error("{field} points to a missing file: {}", path.display())]
    MissingFile { field: String, path: PathBuf },

    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to render config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Socket address the HTTP/WebSocket server binds to.
    pub listen_address: String,

    /// Public base URL the UI is served under (e.g. behind a reverse
    /// proxy). Empty means the server root.
    pub proxy_address: String,

    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,

    pub log_format: LogFormat,

    pub nomad: BackendSection,
    pub consul: BackendSection,

    #[serde(default)]
    pub poller: PollerSection,

    #[serde(default)]
    pub session: SessionSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:3000".into(),
            proxy_address: String::new(),
            log_level: "info".into(),
            log_format: LogFormat::Pretty,
            nomad: BackendSection::with_address("http://127.0.0.1:4646"),
            consul: BackendSection::with_address("http://127.0.0.1:8500"),
            poller: PollerSection::default(),
            session: SessionSection::default(),
        }
    }
}

/// `[nomad]` / `[consul]`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendSection {
    pub enable: bool,

    /// Agent HTTP address.
    pub address: String,

    /// Reject every mutating command.
    pub read_only: bool,

    /// CA certificate (PEM) for verifying the agent.
    pub ca_cert: Option<PathBuf>,

    /// Client certificate (PEM) for mutual TLS. Requires `client_key`.
    pub client_cert: Option<PathBuf>,

    pub client_key: Option<PathBuf>,

    /// Accept any server certificate. Overrides `ca_cert`.
    pub skip_verify: bool,

    /// ACL token (plaintext; prefer `HASHILINK_NOMAD__ACL_TOKEN`).
    pub acl_token: Option<String>,

    /// Nomad regions. The first entry is the default for connections
    /// that do not name one.
    pub regions: Vec<String>,

    /// Consul datacenter.
    pub datacenter: Option<String>,

    /// Resource types watched as soon as a connection opens.
    pub default_watches: Vec<String>,

    /// Strip task `Env` maps from job and allocation payloads (Nomad).
    pub hide_env_data: bool,

    /// Merge `/v1/regions` into `regions` at startup (Nomad).
    pub discover_regions: bool,

    /// Timeout for non-blocking requests.
    pub timeout_secs: Option<u64>,
}

impl BackendSection {
    fn with_address(address: &str) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}

/// `[poller]`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollerSection {
    pub wait_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_secs: u64,
    pub max_consecutive_failures: u32,
    pub interval_secs: u64,
}

impl Default for PollerSection {
    fn default() -> Self {
        let d = PollerSettings::default();
        Self {
            wait_secs: d.wait.as_secs(),
            initial_backoff_ms: u64::try_from(d.initial_backoff.as_millis()).unwrap_or(500),
            max_backoff_secs: d.max_backoff.as_secs(),
            max_consecutive_failures: d.max_consecutive_failures,
            interval_secs: d.interval.as_secs(),
        }
    }
}

/// `[session]`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSection {
    pub teardown_grace_ms: u64,
    pub outbound_buffer: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        let d = SessionSettings::default();
        Self {
            teardown_grace_ms: u64::try_from(d.teardown_grace.as_millis()).unwrap_or(2000),
            outbound_buffer: d.outbound_buffer,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "hashilink", "hashilink").map_or_else(
        || PathBuf::from("hashilink.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file, then `HASHILINK_*` variables
/// (`__` separates nesting: `HASHILINK_NOMAD__READ_ONLY=true`).
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load the configuration.
///
/// An explicit `path` must exist; without one the platform config file
/// is used if present.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) if !p.exists() => return Err(ConfigError::NotFound(p.to_path_buf())),
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };
    Ok(figment(&path).extract()?)
}

impl Config {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_address
            .parse()
            .map_err(|e| invalid("listen_address", format!("{e}: {}", self.listen_address)))
    }

    /// Render the effective configuration as TOML, tokens masked.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let mut masked = self.clone();
        for section in [&mut masked.nomad, &mut masked.consul] {
            if section.acl_token.is_some() {
                section.acl_token = Some("<redacted>".into());
            }
        }
        Ok(toml::to_string_pretty(&masked)?)
    }

    /// Validate and build the runtime configuration.
    pub fn to_gateway_config(&self) -> Result<GatewayConfig, ConfigError> {
        self.listen_addr()?;

        let nomad = self
            .nomad
            .enable
            .then(|| backend_config(BackendKind::Nomad, &self.nomad))
            .transpose()?;
        let consul = self
            .consul
            .enable
            .then(|| backend_config(BackendKind::Consul, &self.consul))
            .transpose()?;
        if nomad.is_none() && consul.is_none() {
            return Err(ConfigError::NoBackend);
        }

        Ok(GatewayConfig {
            nomad,
            consul,
            poller: poller_settings(&self.poller)?,
            session: session_settings(&self.session)?,
        })
    }
}

// ── Translation ─────────────────────────────────────────────────────

fn backend_config(kind: BackendKind, section: &BackendSection) -> Result<BackendConfig, ConfigError> {
    let field = |name: &str| format!("{kind}.{name}");

    let address: url::Url = section
        .address
        .parse()
        .map_err(|_| invalid(field("address"), format!("invalid URL: {}", section.address)))?;
    if !matches!(address.scheme(), "http" | "https") {
        return Err(invalid(field("address"), "scheme must be http or https"));
    }

    let mut config = BackendConfig::new(kind, address);

    config.tls = if section.skip_verify {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ca) = &section.ca_cert {
        require_file(&field("ca_cert"), ca)?;
        TlsVerification::CustomCa(ca.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    config.client_cert = match (&section.client_cert, &section.client_key) {
        (Some(cert), Some(key)) => {
            require_file(&field("client_cert"), cert)?;
            require_file(&field("client_key"), key)?;
            Some(ClientCertificate {
                cert: cert.clone(),
                key: key.clone(),
            })
        }
        (None, None) => None,
        (Some(_), None) => return Err(invalid(field("client_key"), "required with client_cert")),
        (None, Some(_)) => return Err(invalid(field("client_cert"), "required with client_key")),
    };

    config.acl_token = section
        .acl_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(|t| SecretString::from(t.to_owned()));
    config.read_only = section.read_only;

    match kind {
        BackendKind::Nomad => {
            if !section.regions.is_empty() {
                config.regions.clone_from(&section.regions);
            }
            config.hide_env_data = section.hide_env_data;
            config.discover_regions = section.discover_regions;
        }
        BackendKind::Consul => {
            if let Some(dc) = section.datacenter.as_deref().filter(|dc| !dc.is_empty()) {
                config.regions = vec![dc.to_owned()];
            }
        }
    }
    if config.regions.iter().any(String::is_empty) {
        return Err(invalid(field("regions"), "region names must not be empty"));
    }

    for resource in &section.default_watches {
        match capability::lookup(kind, resource) {
            Some(c) if c.id == capability::IdRule::Required => {
                return Err(invalid(
                    field("default_watches"),
                    format!("'{resource}' needs an id and cannot be watched by default"),
                ));
            }
            Some(_) => {}
            None => {
                return Err(invalid(
                    field("default_watches"),
                    format!("unknown resource type '{resource}'"),
                ));
            }
        }
    }
    config.default_watches.clone_from(&section.default_watches);

    if let Some(secs) = section.timeout_secs {
        if secs == 0 {
            return Err(invalid(field("timeout_secs"), "must be greater than zero"));
        }
        config.timeout = Duration::from_secs(secs);
    }

    Ok(config)
}

fn require_file(field: &str, path: &Path) -> Result<(), ConfigError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConfigError::MissingFile {
            field: field.into(),
            path: path.to_path_buf(),
        })
    }
}

fn poller_settings(section: &PollerSection) -> Result<PollerSettings, ConfigError> {
    if section.wait_secs == 0 {
        return Err(invalid("poller.wait_secs", "must be greater than zero"));
    }
    if section.max_consecutive_failures == 0 {
        return Err(invalid("poller.max_consecutive_failures", "must be at least 1"));
    }
    if section.interval_secs == 0 {
        return Err(invalid("poller.interval_secs", "must be greater than zero"));
    }
    let initial_backoff = Duration::from_millis(section.initial_backoff_ms);
    let max_backoff = Duration::from_secs(section.max_backoff_secs);
    if max_backoff < initial_backoff {
        return Err(invalid("poller.max_backoff_secs", "must not be below initial_backoff_ms"));
    }
    Ok(PollerSettings {
        wait: Duration::from_secs(section.wait_secs),
        initial_backoff,
        max_backoff,
        max_consecutive_failures: section.max_consecutive_failures,
        interval: Duration::from_secs(section.interval_secs),
    })
}

fn session_settings(section: &SessionSection) -> Result<SessionSettings, ConfigError> {
    if section.outbound_buffer == 0 {
        return Err(invalid("session.outbound_buffer", "must be at least 1"));
    }
    Ok(SessionSettings {
        teardown_grace: Duration::from_millis(section.teardown_grace_ms),
        outbound_buffer: section.outbound_buffer,
    })
}
