// HTTP adapters: `Upstream` implementations backed by `hashilink-api`.

mod consul;
mod nomad;

use std::sync::Arc;

use hashilink_api::{ClientIdentity, TlsMode, TransportConfig};

pub use consul::ConsulUpstream;
pub use nomad::NomadUpstream;

use crate::config::{BackendConfig, BackendKind, PollerSettings, TlsVerification};
use crate::error::CoreError;
use crate::upstream::Upstream;

/// Translate backend TLS/auth settings into the transport layer's terms.
pub fn transport_config(config: &BackendConfig) -> TransportConfig {
    let tls = match &config.tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    };
    TransportConfig {
        tls,
        identity: config.client_cert.as_ref().map(|c| ClientIdentity {
            cert: c.cert.clone(),
            key: c.key.clone(),
        }),
        timeout: config.timeout,
        acl_token: config.acl_token.clone(),
    }
}

/// Build the HTTP adapter for a backend.
pub fn build(config: &BackendConfig, poller: &PollerSettings) -> Result<Arc<dyn Upstream>, CoreError> {
    let transport = transport_config(config);
    let upstream: Arc<dyn Upstream> = match config.kind {
        BackendKind::Nomad => Arc::new(NomadUpstream::new(
            hashilink_api::NomadClient::new(config.address.clone(), &transport)?,
            poller.wait,
            config.hide_env_data,
        )),
        BackendKind::Consul => Arc::new(ConsulUpstream::new(
            hashilink_api::ConsulClient::new(config.address.clone(), &transport)?,
            poller.wait,
        )),
    };
    Ok(upstream)
}

/// Ask a Nomad agent which regions it federates with.
pub async fn discover_regions(config: &BackendConfig) -> Result<Vec<String>, CoreError> {
    let client = hashilink_api::NomadClient::new(config.address.clone(), &transport_config(config))?;
    Ok(client.regions().await?)
}
