// Shared HTTP plumbing for the Nomad and Consul clients.
//
// Wraps `reqwest::Client` with path-segment URL construction, blocking
// query parameters, index-header parsing, and status mapping. The
// per-backend clients add their endpoints as inherent methods in
// separate files so this module stays focused on transport mechanics.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Slack added on top of the server-side wait before the client gives up.
const BLOCKING_SLACK: Duration = Duration::from_secs(5);

// ── Flavor ───────────────────────────────────────────────────────────

/// Which agent API a client talks to. Decides header and parameter names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Nomad,
    Consul,
}

impl Flavor {
    pub fn name(self) -> &'static str {
        match self {
            Self::Nomad => "nomad",
            Self::Consul => "consul",
        }
    }

    pub(crate) fn index_header(self) -> &'static str {
        match self {
            Self::Nomad => "x-nomad-index",
            Self::Consul => "x-consul-index",
        }
    }

    pub(crate) fn token_header(self) -> &'static str {
        match self {
            Self::Nomad => "x-nomad-token",
            Self::Consul => "x-consul-token",
        }
    }

    /// Query parameter that selects the region (Nomad) or datacenter (Consul).
    pub(crate) fn region_param(self) -> &'static str {
        match self {
            Self::Nomad => "region",
            Self::Consul => "dc",
        }
    }
}

// ── Blocking query types ─────────────────────────────────────────────

/// Parameters for one blocking query.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Region (Nomad) or datacenter (Consul). `None` uses the agent's own.
    pub region: Option<String>,
    /// Last index observed. `0` asks for the current state without waiting.
    pub index: u64,
    /// Upper bound on how long the agent holds the request open.
    pub wait: Duration,
}

impl QueryOptions {
    pub fn new(region: Option<String>, index: u64, wait: Duration) -> Self {
        Self {
            region,
            index,
            wait,
        }
    }

    /// Client-side timeout for this query: the wait plus the jitter the
    /// agents add (up to wait/16) plus a fixed slack.
    pub fn request_timeout(&self) -> Duration {
        self.wait + self.wait / 16 + BLOCKING_SLACK
    }
}

/// Result of a blocking query.
///
/// `data` is `None` when the agent answered 404: the queried object does
/// not exist (any more) as of `index`.
#[derive(Debug, Clone, PartialEq)]
pub struct Blocking<T> {
    pub index: u64,
    pub data: Option<T>,
}

// ── HttpClient ───────────────────────────────────────────────────────

/// Raw HTTP client shared by [`NomadClient`](crate::NomadClient) and
/// [`ConsulClient`](crate::ConsulClient).
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    flavor: Flavor,
}

impl HttpClient {
    pub fn new(base_url: Url, flavor: Flavor, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client(flavor.token_header())?;
        Ok(Self {
            http,
            base_url,
            flavor,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, flavor: Flavor) -> Self {
        Self {
            http,
            base_url,
            flavor,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/v1/{segments...}`, percent-encoding every segment.
    ///
    /// Segments may contain `/` (Consul KV keys); those are split so the
    /// slashes survive as path separators.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            path.pop_if_empty().push("v1");
            for segment in segments {
                path.extend(segment.split('/'));
            }
        }
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn with_region(&self, req: RequestBuilder, region: Option<&str>) -> RequestBuilder {
        match region {
            Some(region) => req.query(&[(self.flavor.region_param(), region)]),
            None => req,
        }
    }

    /// Issue a blocking GET and return the body with the new index.
    pub(crate) async fn get_blocking(
        &self,
        url: Url,
        opts: &QueryOptions,
        params: &[(&str, &str)],
    ) -> Result<Blocking<Value>, Error> {
        trace!(%url, index = opts.index, "blocking GET");

        let mut req = self.http.get(url).query(params);
        req = self.with_region(req, opts.region.as_deref());
        if opts.index > 0 {
            req = req
                .query(&[("index", opts.index.to_string())])
                .query(&[("wait", format!("{}s", opts.wait.as_secs().max(1)))]);
        }

        let resp = req
            .timeout(opts.request_timeout())
            .send()
            .await
            .map_err(|e| self.map_send_error(e, opts.request_timeout()))?;

        let index = self.parse_index(&resp)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Blocking { index, data: None });
        }

        let data = self.parse_json(resp).await?;
        Ok(Blocking {
            index,
            data: Some(data),
        })
    }

    /// Plain GET for endpoints that do not support blocking.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        region: Option<&str>,
    ) -> Result<T, Error> {
        debug!("GET {}", url);

        let req = self.with_region(self.http.get(url), region);
        let resp = req.send().await.map_err(Error::Transport)?;
        self.parse_json(resp).await
    }

    /// Send a mutating request with an optional JSON body.
    ///
    /// Empty response bodies come back as `Value::Null`.
    pub(crate) async fn send(
        &self,
        method: Method,
        url: Url,
        region: Option<&str>,
        body: Option<&(impl Serialize + Sync)>,
    ) -> Result<Value, Error> {
        debug!("{} {}", method, url);

        let mut req = self.with_region(self.http.request(method, url), region);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(Error::Transport)?;
        self.parse_json(resp).await
    }

    /// Send a PUT with a raw (non-JSON) body, used for Consul KV values.
    pub(crate) async fn put_raw(
        &self,
        url: Url,
        region: Option<&str>,
        body: String,
    ) -> Result<Value, Error> {
        debug!("PUT {}", url);

        let req = self.with_region(self.http.put(url), region).body(body);
        let resp = req.send().await.map_err(Error::Transport)?;
        self.parse_json(resp).await
    }

    // ── Response parsing ─────────────────────────────────────────────

    fn parse_index(&self, resp: &Response) -> Result<u64, Error> {
        let header = self.flavor.index_header();
        let Some(raw) = resp.headers().get(header) else {
            return Ok(0);
        };
        let text = raw.to_str().unwrap_or_default();
        text.parse().map_err(|_| Error::InvalidIndex {
            header,
            value: text.to_owned(),
        })
    }

    async fn parse_json<T: DeserializeOwned>(&self, resp: Response) -> Result<T, Error> {
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(Error::Api {
                backend: self.flavor.name(),
                status: status.as_u16(),
                message: body.trim().to_owned(),
            });
        }

        let body = if body.trim().is_empty() { "null".to_owned() } else { body };
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    fn map_send_error(&self, err: reqwest::Error, timeout: Duration) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpClient {
        HttpClient::with_client(reqwest::Client::new(), base.parse().unwrap(), Flavor::Consul)
    }

    #[test]
    fn endpoint_keeps_kv_slashes_and_encodes_segments() {
        let c = client("http://127.0.0.1:8500");
        let url = c.endpoint(&["kv", "app/config/db url"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8500/v1/kv/app/config/db%20url");
    }

    #[test]
    fn endpoint_preserves_trailing_prefix_slash() {
        let c = client("http://127.0.0.1:8500/");
        let url = c.endpoint(&["kv", "app/"]).unwrap();
        assert_eq!(url.path(), "/v1/kv/app/");
    }

    #[test]
    fn endpoint_respects_base_path() {
        let c = client("https://gateway.internal/consul");
        let url = c.endpoint(&["health", "service", "web"]).unwrap();
        assert_eq!(url.path(), "/consul/v1/health/service/web");
    }

    #[test]
    fn request_timeout_exceeds_wait() {
        let opts = QueryOptions::new(None, 10, Duration::from_secs(32));
        assert_eq!(opts.request_timeout(), Duration::from_secs(39));
    }
}
