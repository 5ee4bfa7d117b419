// ── Typed mutations ──
//
// Converts a loosely-typed `(action, id, payload)` triple from the wire
// into a `Mutation` the adapters can execute without further checks.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::capability::Action;
use crate::error::CoreError;

/// A validated mutating command.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    // ── Nomad ────────────────────────────────────────────────────────
    StopJob { job: String, purge: bool },
    EvaluateJob { job: String },
    ScaleTaskGroup { job: String, group: String, count: u64 },
    SubmitJob { job: Value },
    EvaluateAllJobs,
    ForceGc,
    RevertJob { job: String, version: u64 },
    StopAllocation { alloc: String },
    PromoteDeployment { deployment: String, groups: Vec<String> },
    FailDeployment { deployment: String },
    PauseDeployment { deployment: String, pause: bool },
    DrainNode { node: String, enable: bool, deadline: Option<Duration> },
    SetNodeEligibility { node: String, eligible: bool },
    EvaluateNode { node: String },

    // ── Consul ───────────────────────────────────────────────────────
    WriteKey { key: String, value: String },
    DeleteKey { key: String },
    DeleteKeyTree { prefix: String },
    DeregisterService { node: String, service_id: String },
    DeregisterCheck { node: String, check_id: String },
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct StopJobPayload {
    purge: bool,
}

#[derive(Deserialize)]
struct ScalePayload {
    group: String,
    count: u64,
}

#[derive(Deserialize)]
struct SubmitPayload {
    job: Value,
}

#[derive(Deserialize)]
struct RevertPayload {
    version: u64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PromotePayload {
    groups: Vec<String>,
}

#[derive(Deserialize)]
struct PausePayload {
    pause: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DrainPayload {
    enable: bool,
    #[serde(default)]
    deadline_secs: Option<i64>,
}

#[derive(Deserialize)]
struct EligibilityPayload {
    eligible: bool,
}

#[derive(Deserialize)]
struct WriteKeyPayload {
    value: String,
}

#[derive(Deserialize)]
struct DeregisterServicePayload {
    node: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeregisterCheckPayload {
    check_id: String,
}

impl Mutation {
    /// Build a mutation from its wire form.
    ///
    /// A `null` payload is treated as `{}` so actions without required
    /// fields may omit it.
    pub fn parse(action: Action, id: Option<&str>, payload: &Value) -> Result<Self, CoreError> {
        let empty = Value::Object(serde_json::Map::new());
        let payload = if payload.is_null() { &empty } else { payload };
        let id = || required_id(action, id);

        let mutation = match action {
            Action::StopJob => {
                let p: StopJobPayload = decode(action, payload)?;
                Self::StopJob {
                    job: id()?,
                    purge: p.purge,
                }
            }
            Action::EvaluateJob => Self::EvaluateJob { job: id()? },
            Action::ScaleTaskGroup => {
                let p: ScalePayload = decode(action, payload)?;
                Self::ScaleTaskGroup {
                    job: id()?,
                    group: p.group,
                    count: p.count,
                }
            }
            Action::SubmitJob => {
                let p: SubmitPayload = decode(action, payload)?;
                if !p.job.is_object() {
                    return Err(invalid(action, "'job' must be an object"));
                }
                Self::SubmitJob { job: p.job }
            }
            Action::EvaluateAllJobs => Self::EvaluateAllJobs,
            Action::ForceGc => Self::ForceGc,
            Action::RevertJob => {
                let p: RevertPayload = decode(action, payload)?;
                Self::RevertJob {
                    job: id()?,
                    version: p.version,
                }
            }
            Action::StopAllocation => Self::StopAllocation { alloc: id()? },
            Action::PromoteDeployment => {
                let p: PromotePayload = decode(action, payload)?;
                Self::PromoteDeployment {
                    deployment: id()?,
                    groups: p.groups,
                }
            }
            Action::FailDeployment => Self::FailDeployment { deployment: id()? },
            Action::PauseDeployment => {
                let p: PausePayload = decode(action, payload)?;
                Self::PauseDeployment {
                    deployment: id()?,
                    pause: p.pause,
                }
            }
            Action::DrainNode => {
                let p: DrainPayload = decode(action, payload)?;
                let deadline = match p.deadline_secs {
                    Some(secs) if secs < 0 => {
                        return Err(invalid(action, "'deadlineSecs' must not be negative"));
                    }
                    Some(secs) => Some(Duration::from_secs(secs.unsigned_abs())),
                    None => None,
                };
                Self::DrainNode {
                    node: id()?,
                    enable: p.enable,
                    deadline,
                }
            }
            Action::SetNodeEligibility => {
                let p: EligibilityPayload = decode(action, payload)?;
                Self::SetNodeEligibility {
                    node: id()?,
                    eligible: p.eligible,
                }
            }
            Action::EvaluateNode => Self::EvaluateNode { node: id()? },
            Action::WriteKey => {
                let p: WriteKeyPayload = decode(action, payload)?;
                Self::WriteKey {
                    key: id()?,
                    value: p.value,
                }
            }
            Action::DeleteKey => Self::DeleteKey { key: id()? },
            Action::DeleteKeyTree => Self::DeleteKeyTree { prefix: id()? },
            Action::DeregisterService => {
                let p: DeregisterServicePayload = decode(action, payload)?;
                Self::DeregisterService {
                    node: p.node,
                    service_id: id()?,
                }
            }
            Action::DeregisterCheck => {
                let p: DeregisterCheckPayload = decode(action, payload)?;
                Self::DeregisterCheck {
                    node: id()?,
                    check_id: p.check_id,
                }
            }
        };
        Ok(mutation)
    }

    pub fn action(&self) -> Action {
        match self {
            Self::StopJob { .. } => Action::StopJob,
            Self::EvaluateJob { .. } => Action::EvaluateJob,
            Self::ScaleTaskGroup { .. } => Action::ScaleTaskGroup,
            Self::SubmitJob { .. } => Action::SubmitJob,
            Self::EvaluateAllJobs => Action::EvaluateAllJobs,
            Self::ForceGc => Action::ForceGc,
            Self::RevertJob { .. } => Action::RevertJob,
            Self::StopAllocation { .. } => Action::StopAllocation,
            Self::PromoteDeployment { .. } => Action::PromoteDeployment,
            Self::FailDeployment { .. } => Action::FailDeployment,
            Self::PauseDeployment { .. } => Action::PauseDeployment,
            Self::DrainNode { .. } => Action::DrainNode,
            Self::SetNodeEligibility { .. } => Action::SetNodeEligibility,
            Self::EvaluateNode { .. } => Action::EvaluateNode,
            Self::WriteKey { .. } => Action::WriteKey,
            Self::DeleteKey { .. } => Action::DeleteKey,
            Self::DeleteKeyTree { .. } => Action::DeleteKeyTree,
            Self::DeregisterService { .. } => Action::DeregisterService,
            Self::DeregisterCheck { .. } => Action::DeregisterCheck,
        }
    }
}

fn required_id(action: Action, id: Option<&str>) -> Result<String, CoreError> {
    match id {
        Some(id) if !id.is_empty() => Ok(id.to_owned()),
        _ => Err(invalid(action, "an id is required")),
    }
}

fn decode<T: DeserializeOwned>(action: Action, payload: &Value) -> Result<T, CoreError> {
    T::deserialize(payload).map_err(|e| invalid(action, e.to_string()))
}

fn invalid(action: Action, reason: impl Into<String>) -> CoreError {
    CoreError::InvalidPayload {
        action: action.to_string(),
        reason: reason.into(),
    }
}
