//! Fatal startup errors with miette diagnostics.
//!
//! Nothing after startup terminates the process; these cover the cases
//! where the gateway cannot begin serving at all.

use std::net::SocketAddr;

use miette::Diagnostic;
use thiserror::Error;

use hashilink_config::ConfigError;
use hashilink_core::CoreError;

#[derive(Debug, Error, Diagnostic)]
pub enum StartupError {
    #[error("No backend is enabled")]
    #[diagnostic(
        code(hashilink::no_backend),
        help(
            "Enable at least one backend in the config file:\n\
             [nomad]\n\
             enable = true\n\
             Or set HASHILINK_NOMAD__ENABLE=true / HASHILINK_CONSUL__ENABLE=true."
        )
    )]
    NoBackend,

    #[error("Certificate file for {field} not found: {path}")]
    #[diagnostic(
        code(hashilink::missing_certificate),
        help("Check the path and that the gateway can read it.")
    )]
    MissingFile { field: String, path: String },

    #[error(transparent)]
    #[diagnostic(
        code(hashilink::config),
        help("Run `hashilink --print-config` to see the effective configuration.")
    )]
    Config(ConfigError),

    #[error("Could not set up backend clients")]
    #[diagnostic(
        code(hashilink::bootstrap),
        help("Check the TLS settings (ca_cert, client_cert, client_key) and ACL tokens.")
    )]
    Bootstrap(#[source] CoreError),

    #[error("Could not bind {addr}")]
    #[diagnostic(
        code(hashilink::bind),
        help("Is another process listening on this address? Change it with --listen.")
    )]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error")]
    #[diagnostic(code(hashilink::server))]
    Server(#[source] std::io::Error),
}

impl From<ConfigError> for StartupError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoBackend => Self::NoBackend,
            ConfigError::MissingFile { field, path } => Self::MissingFile {
                field,
                path: path.display().to_string(),
            },
            other => Self::Config(other),
        }
    }
}

impl From<CoreError> for StartupError {
    fn from(err: CoreError) -> Self {
        Self::Bootstrap(err)
    }
}
