// hashilink-api: Async Rust clients for the Nomad and Consul HTTP APIs.
//
// Blocking queries are first class: every read takes `QueryOptions`
// (index + wait) and returns `Blocking<T>` carrying the agent's index.

pub mod client;
pub mod consul;
pub mod error;
pub mod nomad;
pub mod transport;

pub use client::{Blocking, Flavor, QueryOptions};
pub use consul::ConsulClient;
pub use error::Error;
pub use nomad::{NomadClient, redact_env};
pub use transport::{ClientIdentity, TlsMode, TransportConfig};
