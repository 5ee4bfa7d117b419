use url::Url;

use crate::client::{Flavor, HttpClient};
use crate::error::Error;
use crate::transport::TransportConfig;

/// HTTP client for a Consul agent.
#[derive(Debug, Clone)]
pub struct ConsulClient {
    pub(crate) inner: HttpClient,
}

impl ConsulClient {
    /// Create a client for the agent at `base_url` (e.g. `http://127.0.0.1:8500`).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            inner: HttpClient::new(base_url, Flavor::Consul, transport)?,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let url = Url::parse(base_url)?;
        Ok(Self {
            inner: HttpClient::with_client(http, url, Flavor::Consul),
        })
    }

    /// The agent base URL.
    pub fn base_url(&self) -> &Url {
        self.inner.base_url()
    }
}
