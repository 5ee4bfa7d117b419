// Nomad adapter: maps resource types and mutations onto `NomadClient`.

use std::time::Duration;

use async_trait::async_trait;
use hashilink_api::{Blocking, NomadClient, QueryOptions, redact_env};
use serde_json::{Value, json};
use tracing::debug;

use crate::command::Mutation;
use crate::config::BackendKind;
use crate::error::UpstreamError;
use crate::upstream::{FetchOutcome, SubscriptionKey, Upstream};

pub struct NomadUpstream {
    client: NomadClient,
    wait: Duration,
    hide_env: bool,
}

impl NomadUpstream {
    pub fn new(client: NomadClient, wait: Duration, hide_env: bool) -> Self {
        Self {
            client,
            wait,
            hide_env,
        }
    }

    async fn blocking(&self, key: &SubscriptionKey, opts: &QueryOptions) -> Result<Blocking<Value>, UpstreamError> {
        let c = &self.client;
        let id = key.id.as_deref().unwrap_or_default();
        let result = match key.resource {
            "jobs" => c.jobs(opts).await,
            "job" => c.job(id, opts).await,
            "job-versions" => c.job_versions(id, opts).await,
            "job-allocations" => c.job_allocations(id, opts).await,
            "job-evaluations" => c.job_evaluations(id, opts).await,
            "job-deployments" => c.job_deployments(id, opts).await,
            "allocations" => c.allocations(opts).await,
            "allocation" => c.allocation(id, opts).await,
            "evaluations" => c.evaluations(opts).await,
            "evaluation" => c.evaluation(id, opts).await,
            "deployments" => c.deployments(opts).await,
            "deployment" => c.deployment(id, opts).await,
            "nodes" => c.nodes(opts).await,
            "node" => c.node(id, opts).await,
            "node-allocations" => c.node_allocations(id, opts).await,
            "members" => {
                // No index on the members endpoint; the poller re-fetches
                // on its interval.
                let data = c.members(opts.region.as_deref()).await?;
                Ok(Blocking {
                    index: 0,
                    data: Some(data),
                })
            }
            other => {
                return Err(UpstreamError::Rejected {
                    status: None,
                    message: format!("nomad has no resource '{other}'"),
                });
            }
        };
        Ok(result?)
    }

    /// Jobs, versions and every allocation listing embed task
    /// definitions, so redaction applies to all payloads.
    fn scrub(&self, payload: &mut Value) {
        if self.hide_env {
            redact_env(payload);
        }
    }
}

#[async_trait]
impl Upstream for NomadUpstream {
    fn backend(&self) -> BackendKind {
        BackendKind::Nomad
    }

    async fn fetch(&self, key: &SubscriptionKey, last_index: u64) -> Result<FetchOutcome, UpstreamError> {
        let opts = QueryOptions::new(Some(key.region.clone()), last_index, self.wait);
        debug!(resource = key.resource, id = ?key.id, region = %key.region, last_index, "nomad fetch");
        let mut outcome = FetchOutcome::from_blocking(self.blocking(key, &opts).await?, last_index);
        if let FetchOutcome::Changed { payload, .. } = &mut outcome {
            self.scrub(payload);
        }
        Ok(outcome)
    }

    async fn mutate(&self, mutation: &Mutation, region: &str) -> Result<Value, UpstreamError> {
        let c = &self.client;
        let r = Some(region);
        let result = match mutation {
            Mutation::StopJob { job, purge } => c.stop_job(job, *purge, r).await,
            Mutation::EvaluateJob { job } => c.evaluate_job(job, r).await,
            Mutation::ScaleTaskGroup { job, group, count } => c.scale_task_group(job, group, *count, r).await,
            Mutation::SubmitJob { job } => c.register_job(job, r).await,
            Mutation::EvaluateAllJobs => c
                .evaluate_all_jobs(r)
                .await
                .map(|ids| json!({ "evaluated": ids })),
            Mutation::ForceGc => c.force_gc(r).await,
            Mutation::RevertJob { job, version } => c.revert_job(job, *version, r).await,
            Mutation::StopAllocation { alloc } => c.stop_allocation(alloc, r).await,
            Mutation::PromoteDeployment { deployment, groups } => {
                c.promote_deployment(deployment, groups, r).await
            }
            Mutation::FailDeployment { deployment } => c.fail_deployment(deployment, r).await,
            Mutation::PauseDeployment { deployment, pause } => c.pause_deployment(deployment, *pause, r).await,
            Mutation::DrainNode {
                node,
                enable,
                deadline,
            } => c.drain_node(node, *enable, *deadline, r).await,
            Mutation::SetNodeEligibility { node, eligible } => c.set_node_eligibility(node, *eligible, r).await,
            Mutation::EvaluateNode { node } => c.evaluate_node(node, r).await,
            other => {
                return Err(UpstreamError::Rejected {
                    status: None,
                    message: format!("'{}' is not a nomad action", other.action()),
                });
            }
        };
        Ok(result?)
    }
}
