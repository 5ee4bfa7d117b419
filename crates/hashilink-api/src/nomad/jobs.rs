// Nomad job endpoints
//
// Blocking reads over /v1/jobs and /v1/job/{id}/..., and the job-level
// write operations: stop, evaluate, scale, register, revert.

use reqwest::Method;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use super::NomadClient;
use crate::client::{Blocking, QueryOptions};
use crate::error::Error;

/// Body for `POST /v1/job/{id}/scale`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ScaleRequest<'a> {
    count: u64,
    target: ScaleTarget<'a>,
    message: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ScaleTarget<'a> {
    group: &'a str,
}

/// Body for `POST /v1/job/{id}/revert`.
#[derive(Debug, Serialize)]
struct RevertRequest<'a> {
    #[serde(rename = "JobID")]
    job_id: &'a str,
    #[serde(rename = "JobVersion")]
    job_version: u64,
}

impl NomadClient {
    // ── Blocking reads ───────────────────────────────────────────────

    /// `GET /v1/jobs`
    pub async fn jobs(&self, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = self.inner.endpoint(&["jobs"])?;
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// `GET /v1/job/{id}`
    pub async fn job(&self, id: &str, opts: &QueryOptions) -> Result<Blocking<Value>, Error> {
        let url = self.inner.endpoint(&["job"])?;
        let url = push_segment(url, id);
        self.inner.get_blocking(url, opts, &[]).await
    }

    /// `GET /v1/job/{id}/versions`
    pub async fn job_versions(
        &self,
        id: &str,
        opts: &QueryOptions,
    ) -> Result<Blocking<Value>, Error> {
        self.job_child(id, "versions", opts).await
    }

    /// `GET /v1/job/{id}/allocations`
    pub async fn job_allocations(
        &self,
        id: &str,
        opts: &QueryOptions,
    ) -> Result<Blocking<Value>, Error> {
        self.job_child(id, "allocations", opts).await
    }

    /// `GET /v1/job/{id}/evaluations`
    pub async fn job_evaluations(
        &self,
        id: &str,
        opts: &QueryOptions,
    ) -> Result<Blocking<Value>, Error> {
        self.job_child(id, "evaluations", opts).await
    }

    /// `GET /v1/job/{id}/deployments`
    pub async fn job_deployments(
        &self,
        id: &str,
        opts: &QueryOptions,
    ) -> Result<Blocking<Value>, Error> {
        self.job_child(id, "deployments", opts).await
    }

    async fn job_child(
        &self,
        id: &str,
        child: &str,
        opts: &QueryOptions,
    ) -> Result<Blocking<Value>, Error> {
        let url = push_segment(self.inner.endpoint(&["job"])?, id);
        let url = push_segment(url, child);
        self.inner.get_blocking(url, opts, &[]).await
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Stop (deregister) a job.
    ///
    /// `DELETE /v1/job/{id}` with `?purge=true` when `purge` is set.
    pub async fn stop_job(&self, id: &str, purge: bool, region: Option<&str>) -> Result<Value, Error> {
        debug!(job = id, purge, "stopping job");
        let mut url = push_segment(self.inner.endpoint(&["job"])?, id);
        if purge {
            url.query_pairs_mut().append_pair("purge", "true");
        }
        self.inner.send(Method::DELETE, url, region, None::<&Value>).await
    }

    /// Force a new evaluation of a job.
    ///
    /// `POST /v1/job/{id}/evaluate`
    pub async fn evaluate_job(&self, id: &str, region: Option<&str>) -> Result<Value, Error> {
        debug!(job = id, "evaluating job");
        let url = push_segment(push_segment(self.inner.endpoint(&["job"])?, id), "evaluate");
        self.inner
            .send(Method::POST, url, region, Some(&json!({ "JobID": id })))
            .await
    }

    /// Change the count of one task group.
    ///
    /// `POST /v1/job/{id}/scale`
    pub async fn scale_task_group(
        &self,
        id: &str,
        group: &str,
        count: u64,
        region: Option<&str>,
    ) -> Result<Value, Error> {
        debug!(job = id, group, count, "scaling task group");
        let url = push_segment(push_segment(self.inner.endpoint(&["job"])?, id), "scale");
        let body = ScaleRequest {
            count,
            target: ScaleTarget { group },
            message: "scaled via hashilink",
        };
        self.inner.send(Method::POST, url, region, Some(&body)).await
    }

    /// Register (submit or update) a job from its JSON specification.
    ///
    /// `POST /v1/jobs` with `{"Job": ...}`
    pub async fn register_job(&self, job: &Value, region: Option<&str>) -> Result<Value, Error> {
        debug!("registering job");
        let url = self.inner.endpoint(&["jobs"])?;
        self.inner
            .send(Method::POST, url, region, Some(&json!({ "Job": job })))
            .await
    }

    /// Revert a job to an earlier version.
    ///
    /// `POST /v1/job/{id}/revert`
    pub async fn revert_job(&self, id: &str, version: u64, region: Option<&str>) -> Result<Value, Error> {
        debug!(job = id, version, "reverting job");
        let url = push_segment(push_segment(self.inner.endpoint(&["job"])?, id), "revert");
        let body = RevertRequest {
            job_id: id,
            job_version: version,
        };
        self.inner.send(Method::POST, url, region, Some(&body)).await
    }

    /// Force an evaluation of every job in the region.
    ///
    /// Lists `/v1/jobs` once and evaluates each job in turn. Returns the
    /// IDs that were evaluated.
    pub async fn evaluate_all_jobs(&self, region: Option<&str>) -> Result<Vec<String>, Error> {
        let url = self.inner.endpoint(&["jobs"])?;
        let jobs: Vec<Value> = self.inner.get(url, region).await?;

        let mut evaluated = Vec::with_capacity(jobs.len());
        for job in jobs {
            let Some(id) = job.get("ID").and_then(Value::as_str) else {
                continue;
            };
            self.evaluate_job(id, region).await?;
            evaluated.push(id.to_owned());
        }
        debug!(count = evaluated.len(), "evaluated all jobs");
        Ok(evaluated)
    }
}

/// Append one percent-encoded path segment (job IDs may contain `/`).
pub(crate) fn push_segment(mut url: url::Url, segment: &str) -> url::Url {
    if let Ok(mut path) = url.path_segments_mut() {
        path.push(segment);
    }
    url
}

/// Strip `Env` maps from every task found in a job, allocation, or list
/// payload. Used when the operator hides environment data from clients.
pub fn redact_env(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(tasks)) = map.get_mut("Tasks") {
                for task in tasks {
                    if let Value::Object(task) = task {
                        task.remove("Env");
                    }
                }
            }
            for (_, child) in map.iter_mut() {
                redact_env(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_env),
        _ => {}
    }
}
