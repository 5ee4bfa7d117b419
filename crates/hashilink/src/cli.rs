//! Clap derive structures for the `hashilink` binary.

use std::path::PathBuf;

use clap::Parser;

/// hashilink -- live Nomad and Consul state over WebSockets
#[derive(Debug, Parser)]
#[command(
    name = "hashilink",
    version,
    about = "Stream Nomad and Consul cluster state to browsers over WebSockets",
    long_about = "Bridges Nomad and Consul blocking queries to WebSocket clients.\n\n\
        Configuration is read from a TOML file and HASHILINK_* environment\n\
        variables (use `__` for nesting, e.g. HASHILINK_NOMAD__READ_ONLY=true)."
)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "HASHILINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address (overrides `listen_address`)
    #[arg(long, short = 'l', value_name = "ADDR")]
    pub listen: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub print_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from(["hashilink", "-vv", "--listen", "127.0.0.1:4000"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.listen.as_deref(), Some("127.0.0.1:4000"));
        assert!(!cli.print_config);
    }
}
