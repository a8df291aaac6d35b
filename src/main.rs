//! ajp-connector binary: bind the protocol server and serve until
//! interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ajp_connector::config::AjpConfig;
use ajp_connector::lifecycle;
use ajp_connector::server::AjpServer;
use ajp_connector::servlet::{DefaultServlet, ServletRegistry};

#[derive(Parser)]
#[command(name = "ajp-connector", about = "AJP13 servlet-container connector")]
struct Cli {
    /// Config file path; falls back to the AJP_CONFIG env var.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Override the configured port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ajp_connector=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = AjpConfig::new();
    match &cli.config {
        Some(path) => config.start_with_file(Some(path.as_path()))?,
        None => config.start()?,
    }
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let mut servlets = ServletRegistry::new();
    servlets.register("", Arc::new(DefaultServlet));
    servlets.load_aliases(&config.servlet_config_dir);

    // the configured thread budget sizes the runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server_thread_size)
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let server = AjpServer::new(config, servlets);
        let shutdown = server.shutdown_handle();
        tokio::spawn(async move {
            lifecycle::wait_for_signal().await;
            tracing::info!("interrupt received");
            shutdown.trigger();
        });
        server.run().await
    })?;

    tracing::info!("shutdown complete");
    Ok(())
}
