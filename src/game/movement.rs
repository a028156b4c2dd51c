//! Player movement models and arena constraints

use std::str::FromStr;

use crate::util::time::Millis;

use super::entity::Player;
use super::grid::{Arena, Direction};

/// How player movement is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementModel {
    /// One cell per key-down event
    #[default]
    Grid,
    /// One cell per cooldown window while a key is held
    Continuous,
}

impl FromStr for MovementModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grid" => Ok(Self::Grid),
            "continuous" => Ok(Self::Continuous),
            other => Err(format!("unknown movement model '{other}'")),
        }
    }
}

/// Movement system for bounded cell steps
pub struct MovementSystem;

impl MovementSystem {
    /// Destination of a one-cell step, or None if it leaves the arena
    pub fn destination(player: &Player, direction: Direction, arena: &Arena) -> Option<(i32, i32)> {
        let (dx, dy) = direction.step();
        let (x, y) = (player.x + dx, player.y + dy);
        arena.contains(x, y).then_some((x, y))
    }

    /// Whether the continuous-model cooldown has passed
    pub fn cooldown_elapsed(now: Millis, last_move: Option<Millis>, delay: Millis) -> bool {
        match last_move {
            Some(last) => now.saturating_sub(last) > delay,
            None => true,
        }
    }
}
