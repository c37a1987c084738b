use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use futures_util::StreamExt;
use sim_proto::{decode_frame_json, SnapshotFrame};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, trace, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Enemy stream CLI inspector", long_about = None)]
struct Cli {
    /// Stream endpoint of the broadcast server.
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
    endpoint: String,
    /// Stop after this many frames.
    #[arg(long)]
    frames: Option<u64>,
    /// Print every decoded frame as pretty JSON.
    #[arg(long)]
    dump: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    info!("Connecting to enemy stream at {}", cli.endpoint);

    let mut seen = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Inspector requested shutdown");
                break;
            }
            outcome = pump_frames(&cli, &mut seen) => match outcome {
                Ok(()) => break,
                Err(err) => {
                    warn!("Connection error: {}", err);
                    info!("Reconnecting in 2 seconds...");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }

    info!(frames = seen, "inspector.stopped");
    Ok(())
}

/// Stream frames until the frame limit is reached. Any error ends the
/// connection and is handed back to the reconnect loop.
async fn pump_frames(cli: &Cli, seen: &mut u64) -> Result<()> {
    let (mut stream, _response) = tokio_tungstenite::connect_async(cli.endpoint.as_str()).await?;
    info!("Connected. Streaming snapshots. Press Ctrl+C to exit.");

    while let Some(message) = stream.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(frame) => {
                return Err(eyre!("server closed the stream: {:?}", frame));
            }
            _ => continue,
        };

        let frame = decode_frame_json(text.as_str())?;
        *seen += 1;
        summarize(*seen, &frame);
        if cli.dump {
            let pretty = serde_json::to_string_pretty(&serde_json::from_str::<serde_json::Value>(
                text.as_str(),
            )?)?;
            info!("{}", pretty);
        }
        if cli.frames.is_some_and(|limit| *seen >= limit) {
            return Ok(());
        }
    }
    Err(eyre!("stream ended"))
}

fn summarize(index: u64, frame: &SnapshotFrame) {
    let enemies = frame.enemies();
    let alive = enemies.iter().filter(|enemy| enemy.status.is_alive()).count();
    let heads: Vec<_> = enemies
        .iter()
        .filter_map(|enemy| enemy.geometry.first())
        .take(4)
        .collect();
    info!(
        frame = index,
        enemies = enemies.len(),
        alive,
        bounds = ?frame.bounds(),
        heads = ?heads,
        "snapshot.received"
    );
    trace!(frame = index, ?enemies, "snapshot.detail");
}
