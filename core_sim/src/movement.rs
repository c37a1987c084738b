//! Follow-the-leader movement on a toroidal grid.
//!
//! Each tick the head of every enemy advances one step along the configured
//! axis and wraps to zero at the bound. Trailing segments take the position
//! their predecessor held before the tick.

use serde::Deserialize;
use thiserror::Error;

use crate::world::{Enemy, World, WorldBounds};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[default]
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub axis: Axis,
    pub step: i32,
    /// Whether enemies that are not alive keep moving.
    pub move_inactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MovementConfigError {
    #[error("movement step must be positive, got {0}")]
    NonPositiveStep(i32),
}

impl MovementConfig {
    pub fn validate(&self) -> Result<(), MovementConfigError> {
        if self.step <= 0 {
            return Err(MovementConfigError::NonPositiveStep(self.step));
        }
        Ok(())
    }
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            axis: Axis::X,
            step: 1,
            move_inactive: true,
        }
    }
}

/// Advance every enemy in collection order. Returns how many moved.
pub fn simulate(world: &mut World, config: &MovementConfig) -> usize {
    let bounds = world.bounds;
    let mut moved = 0;
    for enemy in world.enemies.iter_mut() {
        if !config.move_inactive && !enemy.status.is_alive() {
            continue;
        }
        if advance_enemy(enemy, bounds, config) {
            moved += 1;
        }
    }
    moved
}

/// Move a single enemy one step. Returns `false` for a bodiless enemy.
pub fn advance_enemy(enemy: &mut Enemy, bounds: WorldBounds, config: &MovementConfig) -> bool {
    let Some(mut head) = enemy.head() else {
        return false;
    };

    let axis = config.axis.index();
    let bound = bounds.axis(axis);
    head[axis] = head[axis]
        .checked_add(config.step)
        .filter(|next| (0..bound).contains(next))
        .unwrap_or(0);

    let body = enemy.body_mut();
    // Tail toward head: segment k takes the old segment k-1.
    body.rotate_right(1);
    body[0] = head;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::DEFAULT_BOUNDS;
    use sim_proto::EnemyStatus;

    fn world_with(enemies: Vec<Enemy>) -> World {
        World::new(DEFAULT_BOUNDS, enemies)
    }

    #[test]
    fn head_wraps_to_zero_at_bound() {
        let mut world = world_with(vec![Enemy::new(vec![[179, 4, 9]])]);
        simulate(&mut world, &MovementConfig::default());
        assert_eq!(world.enemies[0].head(), Some([0, 4, 9]));
    }

    #[test]
    fn body_follows_the_head() {
        let mut world = world_with(vec![Enemy::new(vec![[5, 1, 1], [4, 1, 1], [4, 2, 1]])]);
        simulate(&mut world, &MovementConfig::default());
        assert_eq!(world.enemies[0].body(), &[[6, 1, 1], [5, 1, 1], [4, 1, 1]]);
    }

    #[test]
    fn single_segment_only_moves_itself() {
        let mut enemy = Enemy::new(vec![[10, 10, 10]]);
        assert!(advance_enemy(&mut enemy, DEFAULT_BOUNDS, &MovementConfig::default()));
        assert_eq!(enemy.body(), &[[11, 10, 10]]);
    }

    #[test]
    fn empty_body_is_left_alone() {
        let mut enemy = Enemy::new(Vec::new());
        assert!(!advance_enemy(&mut enemy, DEFAULT_BOUNDS, &MovementConfig::default()));
        assert!(enemy.body().is_empty());
    }

    #[test]
    fn configured_axis_and_step_are_used() {
        let config = MovementConfig {
            axis: Axis::Z,
            step: 7,
            move_inactive: true,
        };
        let mut enemy = Enemy::new(vec![[1, 2, 50]]);
        advance_enemy(&mut enemy, DEFAULT_BOUNDS, &config);
        assert_eq!(enemy.head(), Some([1, 2, 57]));
        // 57 + 7 = 64 overshoots the bound of 60 and resets rather than carrying.
        advance_enemy(&mut enemy, DEFAULT_BOUNDS, &config);
        assert_eq!(enemy.head(), Some([1, 2, 0]));
    }

    #[test]
    fn oversized_step_resets_instead_of_overflowing() {
        let config = MovementConfig {
            step: i32::MAX,
            ..MovementConfig::default()
        };
        let mut enemy = Enemy::new(vec![[1, 0, 0]]);
        assert!(advance_enemy(&mut enemy, DEFAULT_BOUNDS, &config));
        assert_eq!(enemy.head(), Some([0, 0, 0]));
        // From zero the step still lands past the bound.
        advance_enemy(&mut enemy, DEFAULT_BOUNDS, &config);
        assert_eq!(enemy.head(), Some([0, 0, 0]));
    }

    #[test]
    fn validate_rejects_non_positive_steps() {
        for step in [0, -1, i32::MIN] {
            let config = MovementConfig {
                step,
                ..MovementConfig::default()
            };
            assert_eq!(
                config.validate(),
                Err(MovementConfigError::NonPositiveStep(step))
            );
        }
        let huge = MovementConfig {
            step: i32::MAX,
            ..MovementConfig::default()
        };
        assert!(huge.validate().is_ok());
    }

    #[test]
    fn dead_enemies_move_by_default() {
        let mut world = world_with(vec![
            Enemy::new(vec![[0, 0, 0]]).with_status(EnemyStatus::Dead)
        ]);
        assert_eq!(simulate(&mut world, &MovementConfig::default()), 1);
        assert_eq!(world.enemies[0].head(), Some([1, 0, 0]));
    }

    #[test]
    fn dead_enemies_can_be_frozen() {
        let config = MovementConfig {
            move_inactive: false,
            ..MovementConfig::default()
        };
        let mut world = world_with(vec![
            Enemy::new(vec![[0, 0, 0]]).with_status(EnemyStatus::Dead),
            Enemy::new(vec![[3, 0, 0]]),
        ]);
        assert_eq!(simulate(&mut world, &config), 1);
        assert_eq!(world.enemies[0].head(), Some([0, 0, 0]));
        assert_eq!(world.enemies[1].head(), Some([4, 0, 0]));
    }

    #[test]
    fn config_parses_from_json() {
        let config: MovementConfig =
            serde_json::from_str(r#"{"axis":"y","move_inactive":false}"#).unwrap();
        assert_eq!(config.axis, Axis::Y);
        assert_eq!(config.step, 1);
        assert!(!config.move_inactive);
    }
}
