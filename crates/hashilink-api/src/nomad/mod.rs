// Nomad API client modules
//
// Blocking reads over jobs, allocations, evaluations, deployments and
// nodes, plus the write endpoints the gateway relays. Payloads are kept
// as `serde_json::Value`: the gateway forwards them without interpreting
// most fields.

mod allocations;
mod client;
mod jobs;
mod nodes;
mod system;

pub use client::NomadClient;
pub use jobs::redact_env;
