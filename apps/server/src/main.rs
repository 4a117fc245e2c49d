mod config;
mod dispatch;
mod monitoring;
mod relay;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::monitoring::Gates;
use crate::relay::Relay;

/// Reachability monitoring server.
#[derive(Debug, Parser)]
#[command(name = "vigil-server", version, about)]
struct Args {
    /// Config file (created with defaults when missing)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured control channel port
    #[arg(long)]
    control_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vigil_logger::init();
    let args = Args::parse();

    let mut config = Config::from_config(args.config.as_ref()).context("loading configuration")?;
    if let Some(port) = args.control_port {
        config.control.port = port;
    }
    debug!("{config}");

    let ctx = zmq::Context::new();

    // relay bind failure is fatal: without it no status ever reaches a client
    let relay = Relay::bind(&ctx, &config.relay.bind, config.relay.frontend_port, config.relay.backend_port)
        .context("starting relay")?;
    let relay_frontend = format!("tcp://127.0.0.1:{}", relay.frontend_port());
    std::thread::Builder::new()
        .name("relay".into())
        .spawn(move || relay.run())
        .context("spawning relay thread")?;

    let gates = Gates::new(Duration::from_secs(config.probe.min_interval_secs));
    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();

    let dispatcher = Dispatcher::bind(
        ctx,
        &config,
        relay_frontend,
        gates,
        Handle::current(),
        tracker.clone(),
        shutdown.clone(),
    )
    .context("starting control plane")?;
    let endpoint = dispatcher.control_endpoint()?;
    info!(%endpoint, "vigil server up");

    let mut control = tokio::task::spawn_blocking(move || dispatcher.run());

    let served = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("signal received, shutting down");
            shutdown.cancel();
            (&mut control).await
        }
        exited = &mut control => {
            shutdown.cancel();
            exited
        }
    };

    // let every worker leave its loop and drop its sockets before exiting
    tracker.close();
    tracker.wait().await;

    served.context("control plane thread")??;
    info!("server stopped");
    Ok(())
}
