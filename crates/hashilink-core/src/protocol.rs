// ── Wire protocol ──
//
// JSON envelopes exchanged over the WebSocket. Both directions share the
// shape `{type, resourceType, id?, region?, payload, correlationToken?}`;
// outbound events additionally carry the blocking-query `index`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::Action;
use crate::error::{CoreError, ErrorKind};

// ── Outbound ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Snapshot,
    Update,
    Delete,
    Error,
    CommandResult,
}

/// A server-to-client message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
}

impl OutboundEvent {
    fn state(kind: EventKind, resource: &str, id: Option<&str>, region: &str, index: u64, payload: Value) -> Self {
        Self {
            kind,
            resource_type: resource.to_owned(),
            id: id.map(str::to_owned),
            region: Some(region.to_owned()),
            payload,
            correlation_token: None,
            index: Some(index),
        }
    }

    pub fn snapshot(resource: &str, id: Option<&str>, region: &str, index: u64, payload: Value) -> Self {
        Self::state(EventKind::Snapshot, resource, id, region, index, payload)
    }

    pub fn update(resource: &str, id: Option<&str>, region: &str, index: u64, payload: Value) -> Self {
        Self::state(EventKind::Update, resource, id, region, index, payload)
    }

    pub fn delete(resource: &str, id: Option<&str>, region: &str, index: u64) -> Self {
        Self::state(EventKind::Delete, resource, id, region, index, Value::Null)
    }

    /// An `error` event with payload `{kind, message}`.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            resource_type: String::new(),
            id: None,
            region: None,
            payload: serde_json::json!({ "kind": kind, "message": message.into() }),
            correlation_token: None,
            index: None,
        }
    }

    /// Attach the subscription or command this event refers to.
    #[must_use]
    pub fn about(mut self, resource: &str, id: Option<&str>, region: Option<&str>) -> Self {
        resource.clone_into(&mut self.resource_type);
        self.id = id.map(str::to_owned);
        self.region = region.map(str::to_owned);
        self
    }

    #[must_use]
    pub fn correlated(mut self, token: Option<String>) -> Self {
        self.correlation_token = token;
        self
    }

    /// A `commandResult` event. Success carries `{ok: true, result}`,
    /// failure `{ok: false, error: {kind, message}}`.
    pub fn command_result(request: &CommandRequest, outcome: Result<Value, &CoreError>) -> Self {
        let payload = match outcome {
            Ok(result) => serde_json::json!({ "ok": true, "result": result }),
            Err(err) => serde_json::json!({
                "ok": false,
                "error": { "kind": err.kind(), "message": err.to_string() },
            }),
        };
        Self {
            kind: EventKind::CommandResult,
            resource_type: request.resource_type.clone(),
            id: request.id.clone(),
            region: request.region.clone(),
            payload,
            correlation_token: request.correlation_token.clone(),
            index: None,
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing a struct of strings and `Value`s cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ── Inbound ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    correlation_token: Option<String>,
}

/// A `watch` or `unwatch` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    pub resource_type: String,
    pub id: Option<String>,
    pub region: Option<String>,
}

/// A mutating command, not yet validated against policy or capability.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub action: Action,
    pub resource_type: String,
    pub id: Option<String>,
    pub region: Option<String>,
    pub payload: Value,
    pub correlation_token: Option<String>,
}

/// A parsed client message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Watch(WatchRequest),
    Unwatch(WatchRequest),
    Command(CommandRequest),
}

/// A message that could not be parsed. Keeps the correlation token when
/// one could be recovered so the client can match the rejection.
#[derive(Debug)]
pub struct ProtocolError {
    pub error: CoreError,
    pub correlation_token: Option<String>,
}

impl ProtocolError {
    fn new(message: impl Into<String>, correlation_token: Option<String>) -> Self {
        Self {
            error: CoreError::Protocol {
                message: message.into(),
            },
            correlation_token,
        }
    }

    pub fn into_event(self) -> OutboundEvent {
        OutboundEvent::error(self.error.kind(), self.error.to_string()).correlated(self.correlation_token)
    }
}

/// Parse one inbound text frame.
pub fn parse_inbound(text: &str) -> Result<ClientMessage, ProtocolError> {
    let raw: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::new(format!("invalid JSON: {e}"), None))?;
    let token = raw
        .get("correlationToken")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let env: InboundEnvelope = serde_json::from_value(raw)
        .map_err(|e| ProtocolError::new(format!("invalid envelope: {e}"), token.clone()))?;

    let Some(resource_type) = env.resource_type.filter(|r| !r.is_empty()) else {
        return Err(ProtocolError::new("missing resourceType", env.correlation_token));
    };

    match env.kind.as_str() {
        "watch" | "unwatch" => {
            let req = WatchRequest {
                resource_type,
                id: env.id,
                region: env.region,
            };
            Ok(if env.kind == "watch" {
                ClientMessage::Watch(req)
            } else {
                ClientMessage::Unwatch(req)
            })
        }
        other => {
            let action: Action = other.parse().map_err(|_| {
                ProtocolError::new(format!("unknown message type '{other}'"), env.correlation_token.clone())
            })?;
            Ok(ClientMessage::Command(CommandRequest {
                action,
                resource_type,
                id: env.id,
                region: env.region,
                payload: env.payload,
                correlation_token: env.correlation_token,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_envelope_shape() {
        let event = OutboundEvent::snapshot("nodes", None, "global", 5, json!([{ "ID": "n1" }]));
        insta::assert_json_snapshot!(event, @r#"
        {
          "type": "snapshot",
          "resourceType": "nodes",
          "region": "global",
          "payload": [
            {
              "ID": "n1"
            }
          ],
          "index": 5
        }
        "#);
    }

    #[test]
    fn command_result_failure_shape() {
        let request = CommandRequest {
            action: Action::StopJob,
            resource_type: "job".into(),
            id: Some("batch-42".into()),
            region: None,
            payload: Value::Null,
            correlation_token: Some("c-1".into()),
        };
        let err = CoreError::ReadOnly {
            backend: crate::BackendKind::Nomad,
            action: "stop-job".into(),
        };
        let event = OutboundEvent::command_result(&request, Err(&err));
        insta::assert_json_snapshot!(event, @r#"
        {
          "type": "commandResult",
          "resourceType": "job",
          "id": "batch-42",
          "payload": {
            "error": {
              "kind": "policy-violation",
              "message": "nomad is read-only: 'stop-job' rejected"
            },
            "ok": false
          },
          "correlationToken": "c-1"
        }
        "#);
    }

    #[test]
    fn parses_watch() {
        let msg = parse_inbound(r#"{"type":"watch","resourceType":"job","id":"web"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Watch(WatchRequest {
                resource_type: "job".into(),
                id: Some("web".into()),
                region: None,
            })
        );
    }

    #[test]
    fn parses_command_with_token() {
        let msg = parse_inbound(
            r#"{"type":"scale-task-group","resourceType":"job","id":"web","payload":{"group":"fe","count":3},"correlationToken":"t9"}"#,
        )
        .unwrap();
        let ClientMessage::Command(cmd) = msg else {
            panic!("expected command");
        };
        assert_eq!(cmd.action, Action::ScaleTaskGroup);
        assert_eq!(cmd.payload["count"], 3);
        assert_eq!(cmd.correlation_token.as_deref(), Some("t9"));
    }

    #[test]
    fn unknown_type_keeps_correlation_token() {
        let err = parse_inbound(r#"{"type":"reboot","resourceType":"node","correlationToken":"x"}"#)
            .unwrap_err();
        assert_eq!(err.correlation_token.as_deref(), Some("x"));
        assert_eq!(err.error.kind(), ErrorKind::ProtocolViolation);
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        let err = parse_inbound("not json").unwrap_err();
        let event = err.into_event();
        assert_eq!(event.kind, EventKind::Error);
        assert_eq!(event.payload["kind"], "protocol-violation");
    }

    #[test]
    fn missing_resource_type_is_rejected() {
        assert!(parse_inbound(r#"{"type":"watch"}"#).is_err());
    }
}
