//! Fixed-cadence tick loop: sleep, simulate, snapshot, encode, broadcast.
//!
//! The scheduler is the only writer of the world. It holds the world lock
//! for simulate and snapshot, and releases it before touching the registry.

use std::sync::Arc;
use std::time::Duration;

use sim_proto::{encode_snapshot_json, PayloadShape};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::metrics::ServerMetrics;
use crate::movement::{simulate, MovementConfig, MovementConfigError};
use crate::registry::{BroadcastReport, Frame, SubscriberRegistry};
use crate::world::WorldStore;

#[derive(Debug, Error)]
pub enum TickError {
    #[error("failed to encode snapshot for tick {tick}: {source}")]
    Encode {
        tick: u64,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub enemies: usize,
    pub moved: usize,
    pub broadcast: BroadcastReport,
}

pub struct TickScheduler {
    world: Arc<WorldStore>,
    registry: Arc<SubscriberRegistry>,
    metrics: Arc<ServerMetrics>,
    movement: MovementConfig,
    payload: PayloadShape,
    interval: Duration,
    tick: u64,
}

impl TickScheduler {
    pub fn new(
        world: Arc<WorldStore>,
        registry: Arc<SubscriberRegistry>,
        metrics: Arc<ServerMetrics>,
        interval: Duration,
    ) -> Self {
        Self {
            world,
            registry,
            metrics,
            movement: MovementConfig::default(),
            payload: PayloadShape::default(),
            interval,
            tick: 0,
        }
    }

    pub fn with_movement(
        mut self,
        movement: MovementConfig,
    ) -> Result<Self, MovementConfigError> {
        movement.validate()?;
        self.movement = movement;
        Ok(self)
    }

    pub fn with_payload(mut self, payload: PayloadShape) -> Self {
        self.payload = payload;
        self
    }

    /// Ticks completed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Run one simulate + broadcast cycle.
    ///
    /// The world advances even when encoding fails; only the broadcast for
    /// that tick is skipped.
    pub fn tick_once(&mut self) -> Result<TickReport, TickError> {
        let movement = self.movement;
        let (moved, snapshot) = self.world.with_lock(|world| {
            let moved = simulate(world, &movement);
            (moved, world.snapshot())
        });
        self.tick += 1;
        self.metrics.record_tick();

        let encoded = encode_snapshot_json(&snapshot, self.payload);
        let broadcast = self.publish(encoded)?;
        Ok(TickReport {
            tick: self.tick,
            enemies: snapshot.enemies.len(),
            moved,
            broadcast,
        })
    }

    fn publish(
        &self,
        encoded: serde_json::Result<String>,
    ) -> Result<BroadcastReport, TickError> {
        let text = encoded.map_err(|source| {
            self.metrics.record_encode_failure();
            TickError::Encode {
                tick: self.tick,
                source,
            }
        })?;
        let report = self.registry.broadcast_all(&Frame::from(text));
        self.metrics
            .record_broadcast(report.delivered, report.evicted.len());
        Ok(report)
    }

    /// Tick until `shutdown` flips to `true` or its sender goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            target: "enemy_stream::tick",
            interval_ms = self.interval.as_millis() as u64,
            "tick.scheduler_started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }

            match self.tick_once() {
                Ok(report) => {
                    let metrics = self.metrics.snapshot();
                    debug!(
                        target: "enemy_stream::tick",
                        tick = report.tick,
                        enemies = report.enemies,
                        moved = report.moved,
                        attempted = report.broadcast.attempted,
                        delivered = report.broadcast.delivered,
                        evicted = report.broadcast.evicted.len(),
                        broadcast_evictions = metrics.broadcast_evictions,
                        live_connections = metrics.live_connections(),
                        "tick.completed"
                    );
                }
                Err(err) => {
                    error!(
                        target: "enemy_stream::tick",
                        error = %err,
                        "tick.broadcast_skipped"
                    );
                }
            }
        }
        info!(
            target: "enemy_stream::tick",
            ticks = self.tick,
            "tick.scheduler_stopped"
        );
    }
}
