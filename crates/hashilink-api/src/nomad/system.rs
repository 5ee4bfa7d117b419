// Nomad agent and system endpoints

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use super::NomadClient;
use crate::error::Error;

impl NomadClient {
    /// List the regions known to the cluster.
    ///
    /// `GET /v1/regions` (no blocking support)
    pub async fn regions(&self) -> Result<Vec<String>, Error> {
        let url = self.inner.endpoint(&["regions"])?;
        self.inner.get(url, None).await
    }

    /// List the server members of the gossip pool.
    ///
    /// `GET /v1/agent/members` (no blocking support)
    pub async fn members(&self, region: Option<&str>) -> Result<Value, Error> {
        let url = self.inner.endpoint(&["agent", "members"])?;
        self.inner.get(url, region).await
    }

    /// Trigger a cluster-wide garbage collection.
    ///
    /// `PUT /v1/system/gc`
    pub async fn force_gc(&self, region: Option<&str>) -> Result<Value, Error> {
        debug!("forcing garbage collection");
        let url = self.inner.endpoint(&["system", "gc"])?;
        self.inner.send(Method::PUT, url, region, None::<&Value>).await
    }
}
