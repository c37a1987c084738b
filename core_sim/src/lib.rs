//! Real-time enemy broadcast server.
//!
//! Holds a small world of snake-like enemies, advances them on a fixed
//! cadence, and pushes every resulting snapshot to all connected stream
//! subscribers. The world store and the subscriber registry are separate
//! lock domains; the tick scheduler never holds both at once.

pub mod config;
pub mod connection;
pub mod load;
pub mod metrics;
pub mod movement;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod world;

pub use config::{load_server_config_from_env, ServerConfig, ServerConfigError};
pub use connection::{Connection, ConnectionState, StreamContext};
pub use load::{load_world, world_from_json_str, WorldLoadError};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use movement::{advance_enemy, simulate, Axis, MovementConfig, MovementConfigError};
pub use registry::{
    BroadcastReport, EvictReason, Frame, Subscriber, SubscriberId, SubscriberOutlet,
    SubscriberRegistry,
};
pub use scheduler::{TickError, TickReport, TickScheduler};
pub use server::{router, Server, ServerError};
pub use world::{Enemy, World, WorldBounds, WorldStore, DEFAULT_BOUNDS};
