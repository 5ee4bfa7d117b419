// Shared transport configuration for building reqwest::Client instances.
//
// Nomad and Consul clients share TLS, mTLS, timeout, and ACL token
// settings through this module. Everything here is applied once at
// construction; a built client never changes its TLS posture.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

const USER_AGENT: &str = concat!("hashilink/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (`skip_verify`).
    DangerAcceptInvalid,
}

/// Client certificate and key for mutual TLS.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub identity: Option<ClientIdentity>,
    /// Timeout for non-blocking requests. Blocking queries derive their
    /// own per-request timeout from the wait time.
    pub timeout: Duration,
    pub acl_token: Option<SecretString>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            identity: None,
            timeout: Duration::from_secs(30),
            acl_token: None,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// `token_header` names the header the ACL token travels in
    /// (`X-Nomad-Token` or `X-Consul-Token`).
    pub fn build_client(&self, token_header: &'static str) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(self.default_headers(token_header)?);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        if let Some(ref identity) = self.identity {
            builder = builder.identity(load_identity(identity)?);
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    fn default_headers(&self, token_header: &'static str) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        if let Some(ref token) = self.acl_token {
            let mut value = HeaderValue::from_str(token.expose_secret())
                .map_err(|e| Error::InvalidToken(e.to_string()))?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static(token_header), value);
        }
        Ok(headers)
    }
}

/// Read a PEM certificate and key into one buffer, the shape rustls expects.
fn load_identity(identity: &ClientIdentity) -> Result<reqwest::Identity, Error> {
    let mut pem = std::fs::read(&identity.cert)
        .map_err(|e| Error::Tls(format!("failed to read client cert: {e}")))?;
    let key = std::fs::read(&identity.key)
        .map_err(|e| Error::Tls(format!("failed to read client key: {e}")))?;
    pem.push(b'\n');
    pem.extend_from_slice(&key);
    reqwest::Identity::from_pem(&pem).map_err(|e| Error::Tls(format!("invalid client identity: {e}")))
}
