// Consul adapter: catalog, health and KV resources over `ConsulClient`.

use std::time::Duration;

use async_trait::async_trait;
use hashilink_api::{ConsulClient, QueryOptions};
use serde_json::Value;
use tracing::debug;

use crate::command::Mutation;
use crate::config::BackendKind;
use crate::error::UpstreamError;
use crate::upstream::{FetchOutcome, SubscriptionKey, Upstream};

pub struct ConsulUpstream {
    client: ConsulClient,
    wait: Duration,
}

impl ConsulUpstream {
    pub fn new(client: ConsulClient, wait: Duration) -> Self {
        Self { client, wait }
    }
}

#[async_trait]
impl Upstream for ConsulUpstream {
    fn backend(&self) -> BackendKind {
        BackendKind::Consul
    }

    async fn fetch(&self, key: &SubscriptionKey, last_index: u64) -> Result<FetchOutcome, UpstreamError> {
        let opts = QueryOptions::new(Some(key.region.clone()), last_index, self.wait);
        let id = key.id.as_deref().unwrap_or_default();
        debug!(resource = key.resource, id, dc = %key.region, last_index, "consul fetch");

        let c = &self.client;
        let response = match key.resource {
            "services" => c.services(&opts).await,
            "service" => c.service_health(id, &opts).await,
            "nodes" => c.nodes(&opts).await,
            "node" => c.node(id, &opts).await,
            "keys" => c.kv_keys(id, &opts).await,
            "key" => c.kv_get(id, &opts).await,
            other => {
                return Err(UpstreamError::Rejected {
                    status: None,
                    message: format!("consul has no resource '{other}'"),
                });
            }
        }?;
        Ok(FetchOutcome::from_blocking(response, last_index))
    }

    async fn mutate(&self, mutation: &Mutation, region: &str) -> Result<Value, UpstreamError> {
        let c = &self.client;
        let dc = Some(region);
        let result = match mutation {
            Mutation::WriteKey { key, value } => c.kv_put(key, value.clone(), dc).await,
            Mutation::DeleteKey { key } => c.kv_delete(key, false, dc).await,
            Mutation::DeleteKeyTree { prefix } => c.kv_delete(prefix, true, dc).await,
            Mutation::DeregisterService { node, service_id } => c.deregister_service(node, service_id, dc).await,
            Mutation::DeregisterCheck { node, check_id } => c.deregister_check(node, check_id, dc).await,
            other => {
                return Err(UpstreamError::Rejected {
                    status: None,
                    message: format!("'{}' is not a consul action", other.action()),
                });
            }
        };
        Ok(result?)
    }
}
