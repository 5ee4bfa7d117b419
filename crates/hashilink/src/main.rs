mod cli;
mod error;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hashilink::AppState;
use hashilink_config::{Config, LogFormat};
use hashilink_core::Resolver;

use crate::cli::Cli;
use crate::error::StartupError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: u8, config: &Config) {
    let filter = match verbosity {
        0 => config.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match config.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .init(),
    }
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let mut config = hashilink_config::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.listen_address = listen;
    }

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_tracing(cli.verbose, &config);

    let gateway = config.to_gateway_config()?;
    let addr = config.listen_addr()?;

    let resolver = Resolver::bootstrap(&gateway).await?;
    let shutdown = CancellationToken::new();
    let state = AppState::new(resolver, &gateway, &config.proxy_address, shutdown.clone());

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    info!(%addr, version = env!("CARGO_PKG_VERSION"), "hashilink listening");

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested, closing sessions");
        shutdown.cancel();
    });

    hashilink::serve(listener, state).await.map_err(StartupError::Server)?;
    info!("hashilink stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
