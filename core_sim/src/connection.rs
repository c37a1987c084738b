//! Per-connection lifecycle: `Connecting -> Registered -> Closed`.
//!
//! The connection task only touches the subscriber registry. Inbound frames
//! are read for liveness and discarded; the stream is push-only.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use tracing::{debug, info, warn};

use crate::metrics::ServerMetrics;
use crate::registry::{EvictReason, Subscriber, SubscriberId, SubscriberOutlet, SubscriberRegistry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Registered,
    Closed,
}

/// Shared handles every connection task needs.
#[derive(Clone, Debug)]
pub struct StreamContext {
    pub registry: Arc<SubscriberRegistry>,
    pub metrics: Arc<ServerMetrics>,
    /// Queue the most recent frame for a subscriber as soon as it joins.
    pub snapshot_on_connect: bool,
}

impl StreamContext {
    pub fn new(registry: Arc<SubscriberRegistry>, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            registry,
            metrics,
            snapshot_on_connect: false,
        }
    }
}

#[derive(Debug)]
pub struct Connection {
    subscriber: Subscriber,
    context: StreamContext,
    state: ConnectionState,
}

impl Connection {
    pub fn open(context: StreamContext) -> (Self, SubscriberOutlet) {
        let (subscriber, outlet) = context.registry.open_subscriber();
        (
            Self {
                subscriber,
                context,
                state: ConnectionState::Connecting,
            },
            outlet,
        )
    }

    pub fn id(&self) -> SubscriberId {
        self.subscriber.id()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Join the registry. Returns `false` unless the connection was still
    /// `Connecting`.
    pub fn register(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }
        if self.context.snapshot_on_connect {
            if let Some(frame) = self.context.registry.latest_frame() {
                // Fresh queue with depth >= 1, so this cannot be rejected.
                let _ = self.subscriber.try_deliver(frame);
            }
        }
        self.context.registry.add(self.subscriber.clone());
        self.context.metrics.record_connection_accepted();
        self.state = ConnectionState::Registered;
        true
    }

    /// Leave the registry. Returns `true` if this call removed the
    /// subscriber; `false` if the broadcaster got there first or the
    /// connection was already closed.
    pub fn close(&mut self, reason: EvictReason) -> bool {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Closed);
        match previous {
            ConnectionState::Closed => false,
            ConnectionState::Connecting => {
                self.subscriber.close();
                false
            }
            ConnectionState::Registered => {
                self.context.metrics.record_connection_closed();
                let removed = self.context.registry.evict(self.id(), reason);
                // Already evicted by a broadcast; make sure the signal is set.
                self.subscriber.close();
                removed
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close(EvictReason::Shutdown);
    }
}

enum PumpExit {
    /// The connection side noticed the failure.
    Local(EvictReason),
    /// The registry closed this subscriber.
    Evicted,
}

/// Drive one upgraded socket until either side ends it.
pub async fn serve_socket(mut socket: WebSocket, peer: SocketAddr, context: StreamContext) {
    let (mut connection, mut outlet) = Connection::open(context);
    connection.register();
    info!(
        target: "enemy_stream::connection",
        subscriber = %connection.id(),
        %peer,
        "connection.registered"
    );

    match pump(&mut socket, &mut outlet).await {
        PumpExit::Local(reason) => {
            connection.close(reason);
            info!(
                target: "enemy_stream::connection",
                subscriber = %connection.id(),
                %peer,
                %reason,
                "connection.closed"
            );
        }
        PumpExit::Evicted => {
            connection.close(EvictReason::QueueRejected);
            if let Err(err) = socket.send(Message::Close(None)).await {
                debug!(
                    target: "enemy_stream::connection",
                    subscriber = %connection.id(),
                    error = %err,
                    "connection.close_frame_failed"
                );
            }
            info!(
                target: "enemy_stream::connection",
                subscriber = %connection.id(),
                %peer,
                "connection.closed=evicted"
            );
        }
    }
}

async fn pump(socket: &mut WebSocket, outlet: &mut SubscriberOutlet) -> PumpExit {
    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Close(_))) | None => {
                    return PumpExit::Local(EvictReason::PeerClosed);
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(
                        target: "enemy_stream::connection",
                        error = %err,
                        "connection.read_failed"
                    );
                    return PumpExit::Local(EvictReason::ReadFailed);
                }
            },
            frame = outlet.frames.recv() => match frame {
                Some(frame) => {
                    if let Err(err) = socket.send(Message::Text(frame)).await {
                        warn!(
                            target: "enemy_stream::connection",
                            error = %err,
                            "connection.write_failed"
                        );
                        return PumpExit::Local(EvictReason::WriteFailed);
                    }
                }
                None => return PumpExit::Local(EvictReason::Shutdown),
            },
            // The watch guard must not outlive this arm; the send above awaits.
            _ = async { outlet.closed.wait_for(|closed| *closed).await.is_ok() } => {
                return PumpExit::Evicted;
            }
        }
    }
}
