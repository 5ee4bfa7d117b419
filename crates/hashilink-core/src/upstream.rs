// ── Upstream seam ──
//
// The trait pollers and the command router talk to. The HTTP adapters in
// `adapter` implement it over `hashilink-api`; tests substitute a scripted
// fake with call counters.

use std::fmt;

use async_trait::async_trait;
use hashilink_api::Blocking;
use serde_json::Value;

use crate::command::Mutation;
use crate::config::BackendKind;
use crate::error::UpstreamError;

/// Identity of one subscription within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub resource: &'static str,
    pub id: Option<String>,
    pub region: String,
}

impl SubscriptionKey {
    pub fn new(resource: &'static str, id: Option<String>, region: impl Into<String>) -> Self {
        Self {
            resource,
            id,
            region: region.into(),
        }
    }

    /// Whether an event addressed as `resource/id@region` belongs here.
    pub fn describes(&self, resource: &str, id: Option<&str>, region: Option<&str>) -> bool {
        self.resource == resource && self.id.as_deref() == id && region == Some(self.region.as_str())
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}/{}@{}", self.resource, id, self.region),
            None => write!(f, "{}@{}", self.resource, self.region),
        }
    }
}

/// Result of one blocking-query call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The index moved (or this was the first call).
    Changed { index: u64, payload: Value },
    /// The wait elapsed with no change.
    Unchanged { index: u64 },
    /// The resource does not exist (HTTP 404).
    Gone { index: u64 },
}

impl FetchOutcome {
    /// Classify a raw blocking response against the index that was sent.
    pub fn from_blocking(response: Blocking<Value>, last_index: u64) -> Self {
        match response.data {
            None => Self::Gone {
                index: response.index,
            },
            Some(_) if last_index > 0 && response.index == last_index => Self::Unchanged {
                index: response.index,
            },
            Some(payload) => Self::Changed {
                index: response.index,
                payload,
            },
        }
    }

    pub fn index(&self) -> u64 {
        match self {
            Self::Changed { index, .. } | Self::Unchanged { index } | Self::Gone { index } => *index,
        }
    }
}

/// One backend's HTTP API, reduced to what the gateway needs.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    fn backend(&self) -> BackendKind;

    /// One blocking query for `key`, waiting on `last_index`
    /// (0 = return immediately).
    async fn fetch(&self, key: &SubscriptionKey, last_index: u64) -> Result<FetchOutcome, UpstreamError>;

    /// Apply a validated mutation in `region`.
    async fn mutate(&self, mutation: &Mutation, region: &str) -> Result<Value, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_blocking_responses() {
        let gone = FetchOutcome::from_blocking(Blocking { index: 9, data: None }, 5);
        assert_eq!(gone, FetchOutcome::Gone { index: 9 });

        let same = FetchOutcome::from_blocking(Blocking { index: 5, data: Some(json!([])) }, 5);
        assert_eq!(same, FetchOutcome::Unchanged { index: 5 });

        let first = FetchOutcome::from_blocking(Blocking { index: 5, data: Some(json!([])) }, 0);
        assert!(matches!(first, FetchOutcome::Changed { index: 5, .. }));
    }

    #[test]
    fn key_display() {
        let key = SubscriptionKey::new("job", Some("web".into()), "global");
        assert_eq!(key.to_string(), "job/web@global");
    }
}
