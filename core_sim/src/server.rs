use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::connection::{serve_socket, StreamContext};
use crate::metrics::ServerMetrics;
use crate::movement::MovementConfigError;
use crate::registry::SubscriberRegistry;
use crate::scheduler::TickScheduler;
use crate::world::{World, WorldStore};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("invalid movement config: {0}")]
    Movement(#[from] MovementConfigError),
    #[error("server stopped with an I/O error: {0}")]
    Serve(#[from] io::Error),
}

/// Build the HTTP surface: the stream endpoint plus optional static files.
pub fn router(config: &ServerConfig, context: StreamContext) -> Router {
    let router = Router::new()
        .route(&config.stream_path, get(stream_upgrade))
        .with_state(context);
    match &config.static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

async fn stream_upgrade(
    State(context): State<StreamContext>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            warn!(
                target: "enemy_stream::server",
                %peer,
                error = %rejection,
                "stream.upgrade_rejected"
            );
            return rejection.into_response();
        }
    };

    upgrade
        .on_failed_upgrade(move |err| {
            warn!(
                target: "enemy_stream::server",
                %peer,
                error = %err,
                "stream.upgrade_failed"
            );
        })
        .on_upgrade(move |socket| serve_socket(socket, peer, context))
}

/// A bound server that has not started ticking yet.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    world: Arc<WorldStore>,
    registry: Arc<SubscriberRegistry>,
    metrics: Arc<ServerMetrics>,
}

impl Server {
    pub async fn bind(config: ServerConfig, world: World) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind,
                source,
            })?;
        let registry = Arc::new(SubscriberRegistry::new(config.subscriber_queue_depth));
        Ok(Self {
            listener,
            world: Arc::new(WorldStore::new(world)),
            registry,
            metrics: Arc::new(ServerMetrics::default()),
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn world(&self) -> Arc<WorldStore> {
        Arc::clone(&self.world)
    }

    pub fn registry(&self) -> Arc<SubscriberRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Start the tick loop and serve connections until `shutdown` fires.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        let Server {
            listener,
            config,
            world,
            registry,
            metrics,
        } = self;

        let scheduler = TickScheduler::new(
            world,
            Arc::clone(&registry),
            Arc::clone(&metrics),
            config.tick_interval(),
        )
        .with_movement(config.movement)?
        .with_payload(config.payload);
        let ticker = tokio::spawn(scheduler.run(shutdown.clone()));

        let mut context = StreamContext::new(Arc::clone(&registry), Arc::clone(&metrics));
        context.snapshot_on_connect = config.snapshot_on_connect;
        let app = router(&config, context);

        info!(
            target: "enemy_stream::server",
            bind = %listener.local_addr()?,
            stream_path = %config.stream_path,
            static_dir = ?config.static_dir,
            tick_interval_ms = config.tick_interval_ms,
            "server.ready"
        );

        let mut stop = shutdown;
        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown({
            let registry = Arc::clone(&registry);
            async move {
                let _ = stop.wait_for(|flag| *flag).await;
                let closed = registry.close_all();
                info!(
                    target: "enemy_stream::server",
                    closed,
                    "server.shutting_down"
                );
            }
        })
        .await;

        if let Err(err) = ticker.await {
            warn!(
                target: "enemy_stream::server",
                error = %err,
                "tick.scheduler_join_failed"
            );
        }
        served?;
        Ok(())
    }
}
