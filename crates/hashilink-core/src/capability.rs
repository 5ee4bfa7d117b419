// ── Resource capability table ──
//
// Static description of every resource type a client may watch, per
// backend: whether it takes an id, how it is polled, and which mutating
// actions may be issued against it. The session and command router both
// consult this table; nothing else decides what is watchable.

use crate::config::BackendKind;

/// Whether a resource type is addressed by an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRule {
    /// Collection resource; an id is refused.
    None,
    /// Single-object resource; an id must be given.
    Required,
    /// An id narrows the resource (e.g. a KV prefix) but may be omitted.
    Optional,
}

impl IdRule {
    pub fn accepts(self, id: Option<&str>) -> bool {
        match (self, id) {
            (Self::None, None) | (Self::Optional, _) => true,
            (Self::Required, Some(id)) => !id.is_empty(),
            _ => false,
        }
    }
}

/// How a poller observes changes on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Long-poll with `?index=N&wait=Ns`.
    Blocking,
    /// Re-fetch on a fixed period; the endpoint has no index.
    Interval,
}

/// A mutating action a client may request.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Action {
    // Nomad jobs
    StopJob,
    EvaluateJob,
    ScaleTaskGroup,
    SubmitJob,
    EvaluateAllJobs,
    ForceGc,
    RevertJob,
    // Nomad allocations / deployments / nodes
    StopAllocation,
    PromoteDeployment,
    FailDeployment,
    PauseDeployment,
    DrainNode,
    SetNodeEligibility,
    EvaluateNode,
    // Consul
    WriteKey,
    DeleteKey,
    DeleteKeyTree,
    DeregisterService,
    DeregisterCheck,
}

/// One row of the capability table.
#[derive(Debug, Clone, Copy)]
pub struct Capability {
    pub backend: BackendKind,
    pub resource: &'static str,
    pub id: IdRule,
    pub mode: QueryMode,
    pub actions: &'static [Action],
}

impl Capability {
    pub fn supports(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

const fn row(
    backend: BackendKind,
    resource: &'static str,
    id: IdRule,
    mode: QueryMode,
    actions: &'static [Action],
) -> Capability {
    Capability {
        backend,
        resource,
        id,
        mode,
        actions,
    }
}

use Action as A;
use BackendKind::{Consul, Nomad};
use IdRule::{None as NoId, Optional, Required};
use QueryMode::{Blocking, Interval};

pub static CAPABILITIES: &[Capability] = &[
    // ── Nomad ────────────────────────────────────────────────────────
    row(Nomad, "jobs", NoId, Blocking, &[A::SubmitJob, A::EvaluateAllJobs, A::ForceGc]),
    row(Nomad, "job", Required, Blocking, &[A::StopJob, A::EvaluateJob, A::ScaleTaskGroup]),
    row(Nomad, "job-versions", Required, Blocking, &[A::RevertJob]),
    row(Nomad, "job-allocations", Required, Blocking, &[]),
    row(Nomad, "job-evaluations", Required, Blocking, &[]),
    row(Nomad, "job-deployments", Required, Blocking, &[]),
    row(Nomad, "allocations", NoId, Blocking, &[]),
    row(Nomad, "allocation", Required, Blocking, &[A::StopAllocation]),
    row(Nomad, "evaluations", NoId, Blocking, &[]),
    row(Nomad, "evaluation", Required, Blocking, &[]),
    row(Nomad, "deployments", NoId, Blocking, &[]),
    row(
        Nomad,
        "deployment",
        Required,
        Blocking,
        &[A::PromoteDeployment, A::FailDeployment, A::PauseDeployment],
    ),
    row(Nomad, "nodes", NoId, Blocking, &[]),
    row(
        Nomad,
        "node",
        Required,
        Blocking,
        &[A::DrainNode, A::SetNodeEligibility, A::EvaluateNode],
    ),
    row(Nomad, "node-allocations", Required, Blocking, &[]),
    row(Nomad, "members", NoId, Interval, &[]),
    // ── Consul ───────────────────────────────────────────────────────
    row(Consul, "services", NoId, Blocking, &[]),
    row(Consul, "service", Required, Blocking, &[A::DeregisterService]),
    row(Consul, "nodes", NoId, Blocking, &[]),
    row(Consul, "node", Required, Blocking, &[A::DeregisterCheck]),
    row(Consul, "keys", Optional, Blocking, &[A::WriteKey, A::DeleteKey, A::DeleteKeyTree]),
    row(Consul, "key", Required, Blocking, &[A::WriteKey, A::DeleteKey]),
];

/// Find the capability row for a resource type on a backend.
pub fn lookup(backend: BackendKind, resource: &str) -> Option<&'static Capability> {
    CAPABILITIES
        .iter()
        .find(|c| c.backend == backend && c.resource == resource)
}

/// Resource types available on a backend, in table order.
pub fn resources(backend: BackendKind) -> impl Iterator<Item = &'static str> {
    CAPABILITIES
        .iter()
        .filter(move |c| c.backend == backend)
        .map(|c| c.resource)
}
