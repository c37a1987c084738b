use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use color_eyre::Result;
use core_sim::{load_server_config_from_env, load_world, Server, ServerConfig};
use sim_proto::PayloadShape;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PayloadArg {
    Enemies,
    World,
}

impl From<PayloadArg> for PayloadShape {
    fn from(value: PayloadArg) -> Self {
        match value {
            PayloadArg::Enemies => PayloadShape::Enemies,
            PayloadArg::World => PayloadShape::World,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Enemy stream broadcast server", long_about = None)]
struct Cli {
    /// JSON config file. Falls back to $SERVER_CONFIG_PATH, then defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Address to listen on.
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// Initial world file.
    #[arg(long)]
    world: Option<PathBuf>,
    /// Directory of static assets served next to the stream endpoint.
    #[arg(long)]
    static_dir: Option<PathBuf>,
    /// Milliseconds between ticks.
    #[arg(long)]
    tick_ms: Option<u64>,
    /// Send the latest snapshot to new subscribers right away.
    #[arg(long)]
    snapshot_on_connect: bool,
    /// Wire payload shape.
    #[arg(long, value_enum)]
    payload: Option<PayloadArg>,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(world) = &self.world {
            config.world_path = world.clone();
        }
        if let Some(dir) = &self.static_dir {
            config.static_dir = Some(dir.clone());
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_interval_ms = tick_ms;
        }
        if self.snapshot_on_connect {
            config.snapshot_on_connect = true;
        }
        if let Some(payload) = self.payload {
            config.payload = payload.into();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => load_server_config_from_env(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let world = load_world(&config.world_path)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!(target: "enemy_stream::server", "server.interrupt_received"),
            Err(err) => warn!(
                target: "enemy_stream::server",
                error = %err,
                "server.signal_listener_failed"
            ),
        }
        let _ = shutdown_tx.send(true);
    });

    Server::bind(config, world).await?.run(shutdown_rx).await?;
    Ok(())
}
