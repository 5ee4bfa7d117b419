use thiserror::Error;

/// Top-level error type for the `hashilink-api` crate.
///
/// Covers every failure mode of a single HTTP exchange with a Nomad or
/// Consul agent. `hashilink-core` folds these into its three-way
/// classification (transient, rejected, unreachable).
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS material could not be loaded or the client could not be built.
    #[error("TLS error: {0}")]
    Tls(String),

    /// ACL token contains bytes that cannot travel in an HTTP header.
    #[error("Invalid ACL token: {0}")]
    InvalidToken(String),

    // ── Upstream ────────────────────────────────────────────────────
    /// The agent answered with a non-success status.
    #[error("{backend} API error (HTTP {status}): {message}")]
    Api {
        backend: &'static str,
        status: u16,
        message: String,
    },

    /// The blocking-query index header was present but not a number.
    #[error("Invalid {header} header: {value}")]
    InvalidIndex { header: &'static str, value: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    ///
    /// Agents answer 500 while a leader election is in progress
    /// ("No cluster leader", "rpc error: ...").
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } => true,
            Self::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// HTTP status reported by the agent, if the exchange got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
