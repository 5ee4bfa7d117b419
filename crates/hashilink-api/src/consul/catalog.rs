// Consul catalog and health endpoints

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::ConsulClient;
use crate::client::{Blocking, QueryOptions};
use crate::error::Error;

/// Body for `PUT /v1/catalog/deregister`.
#[derive(Debug, Serialize)]
struct DeregisterRequest<'a> {
    #[serde(rename = "Node")]
    node: &'a str,
    #[serde(rename = "ServiceID", skip_serializing_if = "Option::is_none")]
    service_id: Option<&'a str>,
    #[serde(rename = "CheckID", skip_serializing_if = "Option::is_none")]
    check_id: Option<&'a str>,
}

impl ConsulClient {
    /// Service summary with health counts.
    ///
    /// `GET /v1/internal/ui/services`
    pub async fn services(&self, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = self.inner.endpoint(&["internal", "ui", "services"])?;
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// Instances of one service with their node and checks.
    ///
    /// `GET /v1/health/service/{name}`
    pub async fn service_health(
        &self,
        name: &str,
        opts: &QueryOptions,
    ) -> Result<Blocking<Value>, Error> {
        let mut url = self.inner.endpoint(&["health", "service"])?;
        push(&mut url, name);
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// `GET /v1/internal/ui/nodes`
    pub async fn nodes(&self, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = self.inner.endpoint(&["internal", "ui", "nodes"])?;
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// `GET /v1/internal/ui/node/{name}`
    pub async fn node(&self, name: &str, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let mut url = self.inner.endpoint(&["internal", "ui", "node"])?;
        push(&mut url, name);
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// Remove a service instance from the catalog.
    pub async fn deregister_service(
        &self,
        node: &str,
        service_id: &str,
        dc: Option<&str>,
    ) -> Result<Value, Error> {
        debug!(node, service_id, "deregistering service");
        let body = DeregisterRequest {
            node,
            service_id: Some(service_id),
            check_id: None,
        };
        self.deregister(&body, dc).await
    }

    /// Remove a single health check from the catalog.
    pub async fn deregister_check(
        &self,
        node: &str,
        check_id: &str,
        dc: Option<&str>,
    ) -> Result<Value, Error> {
        debug!(node, check_id, "deregistering check");
        let body = DeregisterRequest {
            node,
            service_id: None,
            check_id: Some(check_id),
        };
        self.deregister(&body, dc).await
    }

    async fn deregister(&self, body: &DeregisterRequest<'_>, dc: Option<&str>) -> Result<Value, Error> {
        let url = self.inner.endpoint(&["catalog", "deregister"])?;
        self.inner.send(Method::PUT, url, dc, Some(body)).await
    }
}

/// Append one encoded segment; service and node names never contain `/`.
fn push(url: &mut url::Url, segment: &str) {
    if let Ok(mut path) = url.path_segments_mut() {
        path.push(segment);
    }
}
