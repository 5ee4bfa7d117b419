// Consul KV endpoints
//
// Keys are hierarchical: `/` inside a key is a path separator and is
// preserved in the URL, everything else is percent-encoded.

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use super::ConsulClient;
use crate::client::{Blocking, QueryOptions};
use crate::error::Error;

impl ConsulClient {
    /// List the keys one level below `prefix`.
    ///
    /// `GET /v1/kv/{prefix}?keys&separator=/`. A missing prefix is a 404,
    /// reported as `data: None`.
    pub async fn kv_keys(&self, prefix: &str, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = self.inner.endpoint(&["kv", prefix])?;
        self.inner
            .get_blocking(url, opts, &[("keys", ""), ("separator", "/")])
            .await
    }

    /// Read one key. Values come back base64-encoded, as Consul sends them.
    ///
    /// `GET /v1/kv/{key}`
    pub async fn kv_get(&self, key: &str, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = self.inner.endpoint(&["kv", key])?;
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// Write a raw value. Consul answers `true` or `false`.
    ///
    /// `PUT /v1/kv/{key}`
    pub async fn kv_put(&self, key: &str, value: String, dc: Option<&str>) -> Result<Value, Error> {
        debug!(key, bytes = value.len(), "writing key");
        let url = self.inner.endpoint(&["kv", key])?;
        self.inner.put_raw(url, dc, value).await
    }

    /// Delete a key, or with `recurse` every key under the prefix.
    ///
    /// `DELETE /v1/kv/{key}[?recurse]`
    pub async fn kv_delete(&self, key: &str, recurse: bool, dc: Option<&str>) -> Result<Value, Error> {
        debug!(key, recurse, "deleting key");
        let mut url = self.inner.endpoint(&["kv", key])?;
        if recurse {
            url.query_pairs_mut().append_pair("recurse", "true");
        }
        self.inner.send(Method::DELETE, url, dc, None::<&Value>).await
    }
}
