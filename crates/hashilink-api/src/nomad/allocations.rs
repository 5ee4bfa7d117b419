// Nomad allocation, evaluation, and deployment endpoints

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::NomadClient;
use super::jobs::push_segment;
use crate::client::{Blocking, QueryOptions};
use crate::error::Error;

/// Body shared by the deployment promote/fail/pause endpoints.
#[derive(Debug, Serialize)]
struct DeploymentRequest<'a> {
    #[serde(rename = "DeploymentID")]
    deployment_id: &'a str,
    #[serde(rename = "All", skip_serializing_if = "Option::is_none")]
    all: Option<bool>,
    #[serde(rename = "Groups", skip_serializing_if = "Option::is_none")]
    groups: Option<&'a [String]>,
    #[serde(rename = "Pause", skip_serializing_if = "Option::is_none")]
    pause: Option<bool>,
}

impl<'a> DeploymentRequest<'a> {
    fn new(deployment_id: &'a str) -> Self {
        Self {
            deployment_id,
            all: None,
            groups: None,
            pause: None,
        }
    }
}

impl NomadClient {
    // ── Allocations ──────────────────────────────────────────────────

    /// `GET /v1/allocations`
    pub async fn allocations(&self, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = self.inner.endpoint(&["allocations"])?;
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// `GET /v1/allocation/{id}`
    pub async fn allocation(&self, id: &str, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = push_segment(self.inner.endpoint(&["allocation"])?, id);
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// Stop a single allocation; the scheduler places a replacement.
    ///
    /// `POST /v1/allocation/{id}/stop`
    pub async fn stop_allocation(&self, id: &str, region: Option<&str>) -> Result<Value, Error> {
        debug!(alloc = id, "stopping allocation");
        let url = push_segment(push_segment(self.inner.endpoint(&["allocation"])?, id), "stop");
        self.inner.send(Method::POST, url, region, None::<&Value>).await
    }

    // ── Evaluations ──────────────────────────────────────────────────

    /// `GET /v1/evaluations`
    pub async fn evaluations(&self, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = self.inner.endpoint(&["evaluations"])?;
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// `GET /v1/evaluation/{id}`
    pub async fn evaluation(&self, id: &str, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = push_segment(self.inner.endpoint(&["evaluation"])?, id);
        self.inner.get_blocking(url, opts, &[]).await
    }

    // ── Deployments ──────────────────────────────────────────────────

    /// `GET /v1/deployments`
    pub async fn deployments(&self, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = self.inner.endpoint(&["deployments"])?;
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// `GET /v1/deployment/{id}`
    pub async fn deployment(&self, id: &str, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = push_segment(self.inner.endpoint(&["deployment"])?, id);
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// Promote canaries. An empty `groups` promotes every group.
    ///
    /// `POST /v1/deployment/promote/{id}`
    pub async fn promote_deployment(
        &self,
        id: &str,
        groups: &[String],
        region: Option<&str>,
    ) -> Result<Value, Error> {
        debug!(deployment = id, ?groups, "promoting deployment");
        let url = push_segment(self.inner.endpoint(&["deployment", "promote"])?, id);
        let mut body = DeploymentRequest::new(id);
        if groups.is_empty() {
            body.all = Some(true);
        } else {
            body.groups = Some(groups);
        }
        self.inner.send(Method::POST, url, region, Some(&body)).await
    }

    /// Mark a deployment as failed.
    ///
    /// `POST /v1/deployment/fail/{id}`
    pub async fn fail_deployment(&self, id: &str, region: Option<&str>) -> Result<Value, Error> {
        debug!(deployment = id, "failing deployment");
        let url = push_segment(self.inner.endpoint(&["deployment", "fail"])?, id);
        self.inner
            .send(Method::POST, url, region, Some(&DeploymentRequest::new(id)))
            .await
    }

    /// Pause or resume a deployment.
    ///
    /// `POST /v1/deployment/pause/{id}`
    pub async fn pause_deployment(
        &self,
        id: &str,
        pause: bool,
        region: Option<&str>,
    ) -> Result<Value, Error> {
        debug!(deployment = id, pause, "pausing deployment");
        let url = push_segment(self.inner.endpoint(&["deployment", "pause"])?, id);
        let mut body = DeploymentRequest::new(id);
        body.pause = Some(pause);
        self.inner.send(Method::POST, url, region, Some(&body)).await
    }
}
