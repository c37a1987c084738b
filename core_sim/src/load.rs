use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use sim_proto::{Coord, EnemyState};
use thiserror::Error;

use crate::world::{Enemy, World, WorldBounds, DEFAULT_BOUNDS};

/// On-disk description of the initial world.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldFile {
    #[serde(default)]
    pub bounds: Option<Coord>,
    pub enemies: Vec<EnemyState>,
}

#[derive(Debug, Error)]
pub enum WorldLoadError {
    #[error("failed to read world file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse world file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("world bounds must be positive on every axis, got {0:?}")]
    InvalidBounds(Coord),
    #[error("enemy {index} has no body segments")]
    EmptyBody { index: usize },
    #[error("enemy {index} segment {segment} at {coord:?} lies outside bounds {bounds:?}")]
    OutOfBounds {
        index: usize,
        segment: usize,
        coord: Coord,
        bounds: Coord,
    },
}

/// Read and validate the initial world from `path`.
pub fn load_world(path: &Path) -> Result<World, WorldLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| WorldLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let world = world_from_json_str(&contents)?;
    tracing::info!(
        target: "enemy_stream::world",
        path = %path.display(),
        enemies = world.enemies.len(),
        bounds = ?world.bounds.0,
        "world.loaded"
    );
    Ok(world)
}

pub fn world_from_json_str(json: &str) -> Result<World, WorldLoadError> {
    let file: WorldFile = serde_json::from_str(json)?;
    file.into_world()
}

impl WorldFile {
    pub fn into_world(self) -> Result<World, WorldLoadError> {
        let bounds = match self.bounds {
            Some(raw) if raw.iter().all(|value| *value > 0) => WorldBounds(raw),
            Some(raw) => return Err(WorldLoadError::InvalidBounds(raw)),
            None => DEFAULT_BOUNDS,
        };

        let mut enemies = Vec::with_capacity(self.enemies.len());
        for (index, state) in self.enemies.into_iter().enumerate() {
            if state.geometry.is_empty() {
                return Err(WorldLoadError::EmptyBody { index });
            }
            if let Some((segment, coord)) = state
                .geometry
                .iter()
                .enumerate()
                .find(|(_, coord)| !bounds.contains(coord))
            {
                return Err(WorldLoadError::OutOfBounds {
                    index,
                    segment,
                    coord: *coord,
                    bounds: bounds.0,
                });
            }
            enemies.push(
                Enemy::new(state.geometry)
                    .with_status(state.status)
                    .with_kills(state.kills),
            );
        }

        Ok(World::new(bounds, enemies))
    }
}
