// ── Core error types ──
//
// User-facing errors from hashilink-core. Clients never see reqwest
// errors or raw status codes directly: `From<hashilink_api::Error>`
// folds transport failures into the upstream classification, and every
// variant maps onto one wire-level `ErrorKind`.

use serde::Serialize;
use thiserror::Error;

use crate::config::BackendKind;

/// Classification sent to clients in `error` and `commandResult` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    TransientNetwork,
    UpstreamRejected,
    BackendUnreachable,
    PolicyViolation,
    ProtocolViolation,
    ResolutionFailure,
}

/// Failure of a single upstream call, as seen by pollers and the router.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// Worth retrying: timeouts, refused connections, 429/502/503/504.
    #[error("upstream temporarily unavailable: {0}")]
    Transient(String),

    /// The agent gave a definitive answer. Retrying will not help.
    #[error("upstream rejected the request{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Rejected { status: Option<u16>, message: String },

    /// Retries are exhausted; the backend is considered down.
    #[error("backend unreachable after {attempts} attempts: {last_error}")]
    Unreachable { attempts: u32, last_error: String },
}

impl UpstreamError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) => ErrorKind::TransientNetwork,
            Self::Rejected { .. } => ErrorKind::UpstreamRejected,
            Self::Unreachable { .. } => ErrorKind::BackendUnreachable,
        }
    }
}

impl From<hashilink_api::Error> for UpstreamError {
    fn from(err: hashilink_api::Error) -> Self {
        if err.is_transient() {
            Self::Transient(err.to_string())
        } else {
            Self::Rejected {
                status: err.status(),
                message: err.to_string(),
            }
        }
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Resolution ───────────────────────────────────────────────────
    #[error("Unknown backend: {name}")]
    UnknownBackend { name: String },

    #[error("Backend {backend} is not enabled")]
    BackendDisabled { backend: BackendKind },

    #[error("Unknown region '{region}' for {backend}")]
    UnknownRegion { backend: BackendKind, region: String },

    // ── Policy ───────────────────────────────────────────────────────
    #[error("{backend} is read-only: '{action}' rejected")]
    ReadOnly { backend: BackendKind, action: String },

    #[error("Action '{action}' is not supported on {backend} resource '{resource_type}'")]
    UnsupportedAction {
        backend: BackendKind,
        action: String,
        resource_type: String,
    },

    // ── Protocol ─────────────────────────────────────────────────────
    #[error("Invalid payload for '{action}': {reason}")]
    InvalidPayload { action: String, reason: String },

    #[error("Unknown resource type '{resource_type}' for {backend}")]
    UnknownResource {
        backend: BackendKind,
        resource_type: String,
    },

    #[error("Malformed message: {message}")]
    Protocol { message: String },

    // ── Upstream ─────────────────────────────────────────────────────
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Wire-level classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownBackend { .. }
            | Self::BackendDisabled { .. }
            | Self::UnknownRegion { .. }
            | Self::Config { .. } => ErrorKind::ResolutionFailure,
            Self::ReadOnly { .. } | Self::UnsupportedAction { .. } => ErrorKind::PolicyViolation,
            Self::InvalidPayload { .. } | Self::UnknownResource { .. } | Self::Protocol { .. } => {
                ErrorKind::ProtocolViolation
            }
            Self::Upstream(e) => e.kind(),
        }
    }
}

impl From<hashilink_api::Error> for CoreError {
    fn from(err: hashilink_api::Error) -> Self {
        match err {
            hashilink_api::Error::Tls(message) => CoreError::Config {
                message: format!("TLS error: {message}"),
            },
            hashilink_api::Error::InvalidToken(message) => CoreError::Config {
                message: format!("Invalid ACL token: {message}"),
            },
            hashilink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            other => CoreError::Upstream(other.into()),
        }
    }
}
