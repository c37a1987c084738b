//! Helpers for driving a live server over real sockets.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use core_sim::{
    Server, ServerConfig, ServerError, ServerMetrics, SubscriberRegistry, World, WorldStore,
};
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct RunningServer {
    pub addr: SocketAddr,
    pub world: Arc<WorldStore>,
    pub registry: Arc<SubscriberRegistry>,
    pub metrics: Arc<ServerMetrics>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    pub async fn start(mut config: ServerConfig, world: World) -> Result<Self> {
        config.bind = "127.0.0.1:0".parse()?;
        let server = Server::bind(config, world).await?;
        let addr = server.local_addr()?;
        let world = server.world();
        let registry = server.registry();
        let metrics = server.metrics();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(server.run(shutdown_rx));
        Ok(Self {
            addr,
            world,
            registry,
            metrics,
            shutdown,
            handle,
        })
    }

    pub async fn connect(&self) -> Result<Client> {
        let (client, _response) =
            tokio_tungstenite::connect_async(format!("ws://{}/ws", self.addr)).await?;
        Ok(client)
    }

    /// Poll until the registry holds `count` members.
    pub async fn wait_for_subscribers(&self, count: usize) -> Result<()> {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.registry.len() != count {
            if tokio::time::Instant::now() > deadline {
                bail!(
                    "expected {count} subscribers, registry holds {}",
                    self.registry.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(())
    }

    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        tokio::time::timeout(WAIT, self.handle)
            .await
            .context("server did not stop in time")???;
        Ok(())
    }
}

/// Next text frame from the stream, skipping control frames.
pub async fn next_text(client: &mut Client) -> Result<String> {
    tokio::time::timeout(WAIT, read_text(client))
        .await
        .context("timed out waiting for a frame")?
}

async fn read_text(client: &mut Client) -> Result<String> {
    while let Some(message) = client.next().await {
        match message? {
            Message::Text(text) => return Ok(text.as_str().to_owned()),
            Message::Close(_) => bail!("server closed the stream"),
            _ => {}
        }
    }
    Err(anyhow!("stream ended"))
}

/// Issue a bare HTTP/1.1 GET and return the raw response.
pub async fn http_get(addr: SocketAddr, path: &str) -> Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;
    let mut response = Vec::new();
    tokio::time::timeout(WAIT, stream.read_to_end(&mut response))
        .await
        .context("timed out reading HTTP response")??;
    Ok(String::from_utf8_lossy(&response).into_owned())
}
