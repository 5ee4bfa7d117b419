// hashilink: WebSocket gateway exposing live Nomad and Consul state.
//
// The library half holds the axum router so integration tests can serve
// it on an ephemeral port; `main.rs` adds CLI parsing, tracing setup and
// signal handling.

pub mod server;

pub use server::{AppState, router, serve};
