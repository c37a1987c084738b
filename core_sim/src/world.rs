use std::sync::{Mutex, MutexGuard, PoisonError};

use sim_proto::{Coord, EnemyState, EnemyStatus, WorldSnapshot};

/// Bounds used when a world file does not specify its own.
pub const DEFAULT_BOUNDS: WorldBounds = WorldBounds([180, 180, 60]);

/// Per-axis wrap limits. Every component is positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldBounds(pub Coord);

impl WorldBounds {
    pub fn axis(&self, index: usize) -> i32 {
        self.0[index]
    }

    pub fn contains(&self, coord: &Coord) -> bool {
        coord
            .iter()
            .zip(self.0.iter())
            .all(|(value, bound)| (0..*bound).contains(value))
    }
}

/// A moving entity. The body length never changes after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enemy {
    body: Vec<Coord>,
    pub status: EnemyStatus,
    pub kills: u32,
}

impl Enemy {
    pub fn new(body: Vec<Coord>) -> Self {
        Self {
            body,
            status: EnemyStatus::Alive,
            kills: 0,
        }
    }

    pub fn with_status(mut self, status: EnemyStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_kills(mut self, kills: u32) -> Self {
        self.kills = kills;
        self
    }

    pub fn head(&self) -> Option<Coord> {
        self.body.first().copied()
    }

    pub fn body(&self) -> &[Coord] {
        &self.body
    }

    /// Mutable view of the segments. The slice cannot grow or shrink.
    pub(crate) fn body_mut(&mut self) -> &mut [Coord] {
        &mut self.body
    }

    fn state(&self) -> EnemyState {
        EnemyState {
            geometry: self.body.clone(),
            status: self.status,
            kills: self.kills,
        }
    }
}

/// The entity collection together with its bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct World {
    pub bounds: WorldBounds,
    pub enemies: Vec<Enemy>,
}

impl World {
    pub fn new(bounds: WorldBounds, enemies: Vec<Enemy>) -> Self {
        Self { bounds, enemies }
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            bounds: self.bounds.0,
            enemies: self.enemies.iter().map(Enemy::state).collect(),
        }
    }
}

/// Mutex-guarded owner of the [`World`].
///
/// Nothing reads or writes an enemy without holding the lock, so a snapshot
/// never mixes enemies from two different ticks.
#[derive(Debug)]
pub struct WorldStore {
    inner: Mutex<World>,
}

impl WorldStore {
    pub fn new(world: World) -> Self {
        Self {
            inner: Mutex::new(world),
        }
    }

    pub fn with_lock<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.with_lock(|world| world.snapshot())
    }

    pub fn bounds(&self) -> WorldBounds {
        self.with_lock(|world| world.bounds)
    }

    pub fn enemy_count(&self) -> usize {
        self.with_lock(|world| world.enemies.len())
    }

    fn lock(&self) -> MutexGuard<'_, World> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
