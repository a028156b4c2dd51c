//! Combat system - power launch, stepping and hit detection

use uuid::Uuid;

use crate::util::time::Millis;

use super::entity::{Color, Player, Power};
use super::grid::{Direction, BLOCK_SIZE};

/// Power tuning
#[derive(Debug, Clone, Copy)]
pub struct PowerStats {
    /// Time between cell steps
    pub movement_period: Millis,
    /// Range in pixels
    pub max_distance: i32,
    /// Draw color
    pub color: Color,
}

impl PowerStats {
    pub fn new(movement_period: Millis, range_cells: i32) -> Self {
        Self {
            movement_period,
            max_distance: range_cells * BLOCK_SIZE,
            color: Color::Red,
        }
    }
}

impl Default for PowerStats {
    fn default() -> Self {
        Self::new(60, 8)
    }
}

/// Result of evaluating an active power for one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerOutcome {
    /// Period not elapsed yet
    Idle,
    /// Moved one cell
    Stepped { x: i32, y: i32, distance_travelled: i32 },
    /// Landed on a player of another color; the power is gone
    Hit { target_id: String, x: i32, y: i32 },
    /// Range used up on a previous step; the power is gone
    Expired { distance_travelled: i32 },
}

impl PowerOutcome {
    /// Whether the power must be removed
    pub fn is_terminal(&self) -> bool {
        matches!(self, PowerOutcome::Hit { .. } | PowerOutcome::Expired { .. })
    }
}

/// Combat system for launching and advancing powers
pub struct CombatSystem;

impl CombatSystem {
    /// Spawn a power on the owner's cell heading in `direction`
    pub fn launch(owner: &Player, direction: Direction, now: Millis, stats: &PowerStats) -> Power {
        Power {
            id: Uuid::new_v4(),
            x: owner.x,
            y: owner.y,
            color: stats.color,
            owner_color: owner.color,
            max_distance: stats.max_distance,
            distance_travelled: 0,
            last_movement_time: now,
            movement_period: stats.movement_period,
            direction,
        }
    }

    /// Evaluate a power once.
    ///
    /// A power that finished its range on the previous step expires now, so the final
    /// cell is drawn for one frame. A hit on the stepped-into cell wins over expiry.
    pub fn advance<'a>(
        power: &mut Power,
        now: Millis,
        targets: impl IntoIterator<Item = &'a Player>,
    ) -> PowerOutcome {
        if power.is_spent() {
            return PowerOutcome::Expired {
                distance_travelled: power.distance_travelled,
            };
        }

        if !power.is_due(now) {
            return PowerOutcome::Idle;
        }

        power.step(now);

        if let Some(target) = targets.into_iter().find(|p| power.hits(p)) {
            return PowerOutcome::Hit {
                target_id: target.id.clone(),
                x: power.x,
                y: power.y,
            };
        }

        PowerOutcome::Stepped {
            x: power.x,
            y: power.y,
            distance_travelled: power.distance_travelled,
        }
    }
}
