//! Live subscriber set and the fan-out broadcast.
//!
//! Membership is guarded by its own mutex, separate from the world lock.
//! Broadcast copies membership, releases the lock, enqueues the frame on
//! every copy, and then sweeps the failures out under a fresh acquisition.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// One serialized snapshot, shared by every subscriber.
pub type Frame = Utf8Bytes;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a subscriber left the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictReason {
    /// The outbound queue was full or its reader had gone away.
    QueueRejected,
    /// Writing to the socket failed.
    WriteFailed,
    /// Reading from the socket failed.
    ReadFailed,
    /// The peer sent a close frame or hung up.
    PeerClosed,
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for EvictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EvictReason::QueueRejected => "queue_rejected",
            EvictReason::WriteFailed => "write_failed",
            EvictReason::ReadFailed => "read_failed",
            EvictReason::PeerClosed => "peer_closed",
            EvictReason::Shutdown => "shutdown",
        };
        f.write_str(text)
    }
}

/// Writable handle to a live connection.
#[derive(Clone, Debug)]
pub struct Subscriber {
    id: SubscriberId,
    frames: mpsc::Sender<Frame>,
    closed: Arc<watch::Sender<bool>>,
}

/// Receiving half of a [`Subscriber`], owned by the connection task.
#[derive(Debug)]
pub struct SubscriberOutlet {
    pub frames: mpsc::Receiver<Frame>,
    pub closed: watch::Receiver<bool>,
}

impl Subscriber {
    pub fn channel(id: SubscriberId, depth: usize) -> (Self, SubscriberOutlet) {
        let (frames_tx, frames_rx) = mpsc::channel(depth.max(1));
        let (closed_tx, closed_rx) = watch::channel(false);
        (
            Self {
                id,
                frames: frames_tx,
                closed: Arc::new(closed_tx),
            },
            SubscriberOutlet {
                frames: frames_rx,
                closed: closed_rx,
            },
        )
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Queue a frame without waiting.
    pub fn try_deliver(&self, frame: Frame) -> Result<(), mpsc::error::TrySendError<Frame>> {
        self.frames.try_send(frame)
    }

    /// Signal the connection task to shut the socket. Only the first call
    /// returns `true`.
    pub fn close(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Outcome of one [`SubscriberRegistry::broadcast_all`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub evicted: Vec<SubscriberId>,
}

#[derive(Debug)]
pub struct SubscriberRegistry {
    members: Mutex<HashMap<SubscriberId, Subscriber>>,
    latest_frame: Mutex<Option<Frame>>,
    next_id: AtomicU64,
    queue_depth: usize,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(32)
    }
}

impl SubscriberRegistry {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
            latest_frame: Mutex::new(None),
            next_id: AtomicU64::new(1),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Allocate a fresh subscriber. It is not a member until [`add`](Self::add).
    pub fn open_subscriber(&self) -> (Subscriber, SubscriberOutlet) {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Subscriber::channel(id, self.queue_depth)
    }

    /// Insert a subscriber. Returns `false` if it was already present.
    pub fn add(&self, subscriber: Subscriber) -> bool {
        let mut members = self.members();
        if members.contains_key(&subscriber.id) {
            return false;
        }
        members.insert(subscriber.id, subscriber);
        true
    }

    /// Remove a subscriber if present. Concurrent callers see exactly one
    /// `Some`.
    pub fn remove(&self, id: SubscriberId) -> Option<Subscriber> {
        self.members().remove(&id)
    }

    /// Remove and close a subscriber. Returns `true` only for the caller
    /// that performed the removal.
    pub fn evict(&self, id: SubscriberId, reason: EvictReason) -> bool {
        let Some(subscriber) = self.remove(id) else {
            return false;
        };
        subscriber.close();
        info!(
            target: "enemy_stream::registry",
            subscriber = %id,
            %reason,
            "subscriber.evicted"
        );
        true
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.members().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }

    /// Last frame passed to [`broadcast_all`](Self::broadcast_all).
    pub fn latest_frame(&self) -> Option<Frame> {
        self.latest_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Enqueue `frame` on every member. Members whose queue rejects the
    /// frame are evicted; the rest still receive it.
    pub fn broadcast_all(&self, frame: &Frame) -> BroadcastReport {
        *self
            .latest_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(frame.clone());

        let targets: Vec<Subscriber> = self.members().values().cloned().collect();

        let mut report = BroadcastReport {
            attempted: targets.len(),
            ..BroadcastReport::default()
        };
        let mut failed = Vec::new();
        for subscriber in &targets {
            match subscriber.try_deliver(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    debug!(
                        target: "enemy_stream::registry",
                        subscriber = %subscriber.id,
                        error = %err,
                        "subscriber.delivery_failed"
                    );
                    failed.push(subscriber.id);
                }
            }
        }

        for id in failed {
            if self.evict(id, EvictReason::QueueRejected) {
                report.evicted.push(id);
            }
        }
        report
    }

    /// Close every member. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Subscriber> = self.members().drain().map(|(_, sub)| sub).collect();
        for subscriber in &drained {
            subscriber.close();
        }
        drained.len()
    }

    fn members(&self) -> MutexGuard<'_, HashMap<SubscriberId, Subscriber>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn frame(text: &str) -> Frame {
        Frame::from(text.to_string())
    }

    #[test]
    fn add_is_a_no_op_for_existing_members() {
        let registry = SubscriberRegistry::new(4);
        let (subscriber, _outlet) = registry.open_subscriber();
        assert!(registry.add(subscriber.clone()));
        assert!(!registry.add(subscriber));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_tolerates_absent_members() {
        let registry = SubscriberRegistry::new(4);
        let (subscriber, _outlet) = registry.open_subscriber();
        registry.add(subscriber.clone());
        assert!(registry.remove(subscriber.id()).is_some());
        assert!(registry.remove(subscriber.id()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn broadcast_reaches_every_member_with_the_same_frame() {
        let registry = SubscriberRegistry::new(4);
        let mut outlets = Vec::new();
        for _ in 0..5 {
            let (subscriber, outlet) = registry.open_subscriber();
            registry.add(subscriber);
            outlets.push(outlet);
        }

        let report = registry.broadcast_all(&frame("[1]"));
        assert_eq!(report.attempted, 5);
        assert_eq!(report.delivered, 5);
        assert!(report.evicted.is_empty());
        for outlet in &mut outlets {
            assert_eq!(outlet.frames.try_recv().unwrap().as_str(), "[1]");
        }
    }

    #[test]
    fn failed_member_is_evicted_and_others_still_served() {
        let registry = SubscriberRegistry::new(1);
        let (healthy, mut healthy_outlet) = registry.open_subscriber();
        let (gone, gone_outlet) = registry.open_subscriber();
        registry.add(healthy.clone());
        registry.add(gone.clone());
        drop(gone_outlet);

        let report = registry.broadcast_all(&frame("a"));
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.evicted, vec![gone.id()]);
        assert!(gone.is_closed());
        assert!(!registry.contains(gone.id()));

        assert_eq!(healthy_outlet.frames.try_recv().unwrap().as_str(), "a");
        let next = registry.broadcast_all(&frame("b"));
        assert_eq!(next.attempted, 1);
        assert_eq!(next.delivered, 1);
    }

    #[test]
    fn full_queue_counts_as_a_failed_write() {
        let registry = SubscriberRegistry::new(1);
        let (slow, _outlet) = registry.open_subscriber();
        registry.add(slow.clone());

        assert_eq!(registry.broadcast_all(&frame("1")).delivered, 1);
        let report = registry.broadcast_all(&frame("2"));
        assert_eq!(report.evicted, vec![slow.id()]);
        assert!(registry.is_empty());
    }

    #[test]
    fn close_reports_only_the_first_call() {
        let (subscriber, outlet) = Subscriber::channel(SubscriberId(9), 1);
        assert!(!*outlet.closed.borrow());
        assert!(subscriber.close());
        assert!(!subscriber.close());
        assert!(*outlet.closed.borrow());
    }

    #[test]
    fn concurrent_eviction_removes_once() {
        for _ in 0..64 {
            let registry = Arc::new(SubscriberRegistry::new(1));
            let (subscriber, _outlet) = registry.open_subscriber();
            let id = subscriber.id();
            registry.add(subscriber);

            let handles: Vec<_> = [EvictReason::ReadFailed, EvictReason::QueueRejected]
                .into_iter()
                .map(|reason| {
                    let registry = Arc::clone(&registry);
                    thread::spawn(move || registry.evict(id, reason))
                })
                .collect();
            let wins = handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(wins, 1);
            assert!(!registry.contains(id));
        }
    }

    #[test]
    fn latest_frame_tracks_last_broadcast() {
        let registry = SubscriberRegistry::default();
        assert!(registry.latest_frame().is_none());
        registry.broadcast_all(&frame("x"));
        registry.broadcast_all(&frame("y"));
        assert_eq!(registry.latest_frame().unwrap().as_str(), "y");
    }

    #[test]
    fn close_all_empties_and_signals() {
        let registry = SubscriberRegistry::new(2);
        let (a, _oa) = registry.open_subscriber();
        let (b, _ob) = registry.open_subscriber();
        registry.add(a.clone());
        registry.add(b.clone());
        assert_eq!(registry.close_all(), 2);
        assert!(a.is_closed() && b.is_closed());
        assert!(registry.is_empty());
    }
}
