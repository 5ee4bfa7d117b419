// Consul API client modules
//
// Blocking reads over the catalog/health UI endpoints and the KV store,
// plus KV writes and catalog deregistration.

mod catalog;
mod client;
mod kv;

pub use client::ConsulClient;
