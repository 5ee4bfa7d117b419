// ── Command router ──
//
// Validates client commands and relays them to the backend adapter.
// Checks run in a fixed order: read-only policy, capability, payload.
// A rejected command never reaches the adapter. Mutations do not touch
// any local state; the pollers observe their effect on the next
// blocking-query cycle.

use tracing::{info, warn};

use crate::capability;
use crate::command::Mutation;
use crate::error::CoreError;
use crate::protocol::{CommandRequest, OutboundEvent};
use crate::resolver::Target;

/// A command that passed validation and is ready to execute.
#[derive(Debug, Clone)]
pub struct PreparedCommand {
    pub request: CommandRequest,
    pub mutation: Mutation,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct CommandRouter {
    target: Target,
}

impl CommandRouter {
    pub fn new(target: Target) -> Self {
        Self { target }
    }

    /// Validate a command without any upstream I/O.
    pub fn prepare(&self, request: &CommandRequest) -> Result<PreparedCommand, CoreError> {
        let backend = &self.target.backend;

        if backend.read_only() {
            return Err(CoreError::ReadOnly {
                backend: backend.kind(),
                action: request.action.to_string(),
            });
        }

        let capability = capability::lookup(backend.kind(), &request.resource_type).ok_or_else(|| {
            CoreError::UnknownResource {
                backend: backend.kind(),
                resource_type: request.resource_type.clone(),
            }
        })?;
        if !capability.supports(request.action) {
            return Err(CoreError::UnsupportedAction {
                backend: backend.kind(),
                action: request.action.to_string(),
                resource_type: request.resource_type.clone(),
            });
        }

        let mutation = Mutation::parse(request.action, request.id.as_deref(), &request.payload)?;
        let region = match request.region.as_deref() {
            Some(r) => backend.resolve_region(Some(r))?,
            None => self.target.region.clone(),
        };

        Ok(PreparedCommand {
            request: request.clone(),
            mutation,
            region,
        })
    }

    /// Run a prepared command against the adapter and report the outcome.
    pub async fn execute(&self, prepared: PreparedCommand) -> OutboundEvent {
        let PreparedCommand {
            request,
            mutation,
            region,
        } = prepared;
        let action = request.action;
        info!(%action, resource = %request.resource_type, id = ?request.id, %region, "relaying command");

        match self.target.backend.upstream().mutate(&mutation, &region).await {
            Ok(result) => OutboundEvent::command_result(&request, Ok(result)),
            Err(e) => {
                warn!(%action, error = %e, "command failed upstream");
                OutboundEvent::command_result(&request, Err(&CoreError::Upstream(e)))
            }
        }
    }
}
