// hashilink-core: Sessions, pollers and command routing between browser
// connections and the Nomad/Consul blocking-query APIs.

pub mod adapter;
pub mod capability;
pub mod command;
pub mod config;
pub mod error;
pub mod poller;
pub mod protocol;
pub mod resolver;
pub mod router;
pub mod session;
pub mod upstream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use capability::{Action, CAPABILITIES, Capability, IdRule, QueryMode};
pub use command::Mutation;
pub use config::{
    BackendConfig, BackendKind, ClientCertificate, GatewayConfig, PollerSettings, SessionSettings,
    TlsVerification,
};
pub use error::{CoreError, ErrorKind, UpstreamError};
pub use poller::{Poller, PollerHandle, PollerState};
pub use protocol::{ClientMessage, CommandRequest, EventKind, OutboundEvent, WatchRequest};
pub use resolver::{Backend, Resolver, Target};
pub use router::CommandRouter;
pub use session::Session;
pub use upstream::{FetchOutcome, SubscriptionKey, Upstream};
