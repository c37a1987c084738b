//! Wire types for the enemy stream.
//!
//! Every broadcast is one text frame holding a JSON snapshot of the world.
//! The payload carries no version or message-type tag; its shape is chosen
//! once per server through [`PayloadShape`].

use serde::{Deserialize, Serialize};

/// A single body segment, `[x, y, z]`.
pub type Coord = [i32; 3];

/// Life-cycle tag of an enemy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnemyStatus {
    #[default]
    Alive,
    Dead,
}

impl EnemyStatus {
    pub fn is_alive(self) -> bool {
        matches!(self, EnemyStatus::Alive)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyState {
    /// Body segments, head first.
    pub geometry: Vec<Coord>,
    #[serde(default)]
    pub status: EnemyStatus,
    #[serde(default)]
    pub kills: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub bounds: Coord,
    pub enemies: Vec<EnemyState>,
}

/// Which parts of a [`WorldSnapshot`] go out on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadShape {
    /// Bare array of enemies.
    #[default]
    Enemies,
    /// Object with `bounds` and `enemies`.
    World,
}

/// A decoded frame in either shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SnapshotFrame {
    World(WorldSnapshot),
    Enemies(Vec<EnemyState>),
}

impl SnapshotFrame {
    pub fn enemies(&self) -> &[EnemyState] {
        match self {
            SnapshotFrame::World(snapshot) => &snapshot.enemies,
            SnapshotFrame::Enemies(enemies) => enemies,
        }
    }

    pub fn bounds(&self) -> Option<Coord> {
        match self {
            SnapshotFrame::World(snapshot) => Some(snapshot.bounds),
            SnapshotFrame::Enemies(_) => None,
        }
    }
}

pub fn encode_snapshot_json(
    snapshot: &WorldSnapshot,
    shape: PayloadShape,
) -> serde_json::Result<String> {
    match shape {
        PayloadShape::Enemies => serde_json::to_string(&snapshot.enemies),
        PayloadShape::World => serde_json::to_string(snapshot),
    }
}

pub fn decode_frame_json(data: &str) -> serde_json::Result<SnapshotFrame> {
    serde_json::from_str(data)
}
