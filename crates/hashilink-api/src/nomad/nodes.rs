// Nomad node endpoints
//
// Client node listing and detail, plus drain, scheduling eligibility,
// and forced node evaluation.

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::NomadClient;
use super::jobs::push_segment;
use crate::client::{Blocking, QueryOptions};
use crate::error::Error;

/// Body for `POST /v1/node/{id}/drain`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DrainRequest {
    drain_spec: Option<DrainSpec>,
    mark_eligible: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DrainSpec {
    /// Nanoseconds; `-1` forces an immediate drain, `0` waits forever.
    deadline: i64,
    ignore_system_jobs: bool,
}

/// Body for `POST /v1/node/{id}/eligibility`.
#[derive(Debug, Serialize)]
struct EligibilityRequest<'a> {
    #[serde(rename = "NodeID")]
    node_id: &'a str,
    #[serde(rename = "Eligibility")]
    eligibility: &'static str,
}

impl NomadClient {
    /// `GET /v1/nodes`
    pub async fn nodes(&self, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = self.inner.endpoint(&["nodes"])?;
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// `GET /v1/node/{id}`
    pub async fn node(&self, id: &str, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = push_segment(self.inner.endpoint(&["node"])?, id);
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// `GET /v1/node/{id}/allocations`
    pub async fn node_allocations(
        &self,
        id: &str,
        opts: &QueryOptions,
    ) -> Result<Blocking<Value>, Error> {
        let url = push_segment(push_segment(self.inner.endpoint(&["node"])?, id), "allocations");
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// Enable or disable draining.
    ///
    /// With `enable`, `deadline` bounds the drain (`None` drains
    /// immediately). Disabling also marks the node eligible again.
    pub async fn drain_node(
        &self,
        id: &str,
        enable: bool,
        deadline: Option<Duration>,
        region: Option<&str>,
    ) -> Result<Value, Error> {
        debug!(node = id, enable, ?deadline, "updating node drain");
        let url = push_segment(push_segment(self.inner.endpoint(&["node"])?, id), "drain");
        let body = DrainRequest {
            drain_spec: enable.then(|| DrainSpec {
                deadline: deadline.map_or(-1, |d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)),
                ignore_system_jobs: false,
            }),
            mark_eligible: !enable,
        };
        self.inner.send(Method::POST, url, region, Some(&body)).await
    }

    /// Toggle scheduling eligibility.
    ///
    /// `POST /v1/node/{id}/eligibility`
    pub async fn set_node_eligibility(
        &self,
        id: &str,
        eligible: bool,
        region: Option<&str>,
    ) -> Result<Value, Error> {
        debug!(node = id, eligible, "updating node eligibility");
        let url = push_segment(push_segment(self.inner.endpoint(&["node"])?, id), "eligibility");
        let body = EligibilityRequest {
            node_id: id,
            eligibility: if eligible { "eligible" } else { "ineligible" },
        };
        self.inner.send(Method::POST, url, region, Some(&body)).await
    }

    /// Force re-evaluation of every allocation on a node.
    ///
    /// `POST /v1/node/{id}/evaluate`
    pub async fn evaluate_node(&self, id: &str, region: Option<&str>) -> Result<Value, Error> {
        debug!(node = id, "evaluating node");
        let url = push_segment(push_segment(self.inner.endpoint(&["node"])?, id), "evaluate");
        self.inner.send(Method::POST, url, region, None::<&Value>).await
    }
}
