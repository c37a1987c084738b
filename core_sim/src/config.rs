use std::{
    env, fs, io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use sim_proto::PayloadShape;
use thiserror::Error;

use crate::movement::{MovementConfig, MovementConfigError};

/// Environment variable naming a JSON config file to load at startup.
pub const SERVER_CONFIG_PATH_ENV: &str = "SERVER_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub world_path: PathBuf,
    /// Directory served for any path other than the stream endpoint.
    pub static_dir: Option<PathBuf>,
    pub stream_path: String,
    pub tick_interval_ms: u64,
    pub movement: MovementConfig,
    pub payload: PayloadShape,
    pub subscriber_queue_depth: usize,
    pub snapshot_on_connect: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080),
            world_path: PathBuf::from("test_logs_2.json"),
            static_dir: None,
            stream_path: "/ws".to_string(),
            tick_interval_ms: 500,
            movement: MovementConfig::default(),
            payload: PayloadShape::Enemies,
            subscriber_queue_depth: 32,
            snapshot_on_connect: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("failed to parse server config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read server config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("tick_interval_ms must be greater than zero")]
    ZeroTickInterval,
    #[error("subscriber_queue_depth must be greater than zero")]
    ZeroQueueDepth,
    #[error(transparent)]
    Movement(#[from] MovementConfigError),
    #[error("stream_path must start with '/', got {0:?}")]
    InvalidStreamPath(String),
}

impl ServerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ServerConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ServerConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let config = ServerConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ServerConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ServerConfigError::ZeroTickInterval);
        }
        if self.subscriber_queue_depth == 0 {
            return Err(ServerConfigError::ZeroQueueDepth);
        }
        self.movement.validate()?;
        if !self.stream_path.starts_with('/') {
            return Err(ServerConfigError::InvalidStreamPath(
                self.stream_path.clone(),
            ));
        }
        Ok(())
    }
}

/// Load the config named by `SERVER_CONFIG_PATH`, falling back to defaults
/// when the variable is unset or the file cannot be used.
pub fn load_server_config_from_env() -> ServerConfig {
    let Some(path) = env::var(SERVER_CONFIG_PATH_ENV).ok().map(PathBuf::from) else {
        tracing::info!(
            target: "enemy_stream::config",
            "server_config.loaded=builtin"
        );
        return ServerConfig::default();
    };

    match ServerConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "enemy_stream::config",
                path = %path.display(),
                "server_config.loaded=file"
            );
            config
        }
        Err(err) => {
            tracing::warn!(
                target: "enemy_stream::config",
                path = %path.display(),
                error = %err,
                "server_config.load_failed"
            );
            tracing::info!(
                target: "enemy_stream::config",
                "server_config.loaded=builtin"
            );
            ServerConfig::default()
        }
    }
}
