use url::Url;

use crate::client::{Flavor, HttpClient};
use crate::error::Error;
use crate::transport::TransportConfig;

/// HTTP client for a Nomad agent.
///
/// Cheap to clone; the inner `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct NomadClient {
    pub(crate) inner: HttpClient,
}

impl NomadClient {
    /// Create a client for the agent at `base_url` (e.g. `http://127.0.0.1:4646`).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            inner: HttpClient::new(base_url, Flavor::Nomad, transport)?,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let url = Url::parse(base_url)?;
        Ok(Self {
            inner: HttpClient::with_client(http, url, Flavor::Nomad),
        })
    }

    /// The agent base URL.
    pub fn base_url(&self) -> &Url {
        self.inner.base_url()
    }
}
