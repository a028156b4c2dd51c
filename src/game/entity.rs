//! Entity value types: players, powers, cursor and their drawable form

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::time::Millis;

use super::grid::{within_range, Direction, BLOCK_SIZE};

/// Palette shared by entities and the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    /// Local player
    Blue,
    /// Mirrored remote players
    Yellow,
    /// Powers
    Red,
    /// Targeting cursor
    Green,
}

impl Color {
    pub fn as_str(self) -> &'static str {
        match self {
            Color::Blue => "blue",
            Color::Yellow => "yellow",
            Color::Red => "red",
            Color::Green => "green",
        }
    }
}

/// A player occupying one grid cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub color: Color,
    /// Cursor range in cells
    pub max_range: i32,
}

impl Player {
    pub fn new(id: impl Into<String>, x: i32, y: i32, color: Color, max_range: i32) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            color,
            max_range,
        }
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn occupies(&self, x: i32, y: i32) -> bool {
        self.x == x && self.y == y
    }
}

/// A launched projectile travelling one cell per movement period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Power {
    pub id: Uuid,
    pub x: i32,
    pub y: i32,
    pub color: Color,
    /// Color of the launching player; players sharing it are never hit
    pub owner_color: Color,
    /// Range in pixels
    pub max_distance: i32,
    pub distance_travelled: i32,
    pub last_movement_time: Millis,
    pub movement_period: Millis,
    pub direction: Direction,
}

impl Power {
    /// Whether a movement period has elapsed since the last step
    pub fn is_due(&self, now: Millis) -> bool {
        now.saturating_sub(self.last_movement_time) >= self.movement_period
    }

    /// Whether the power has used up its range
    pub fn is_spent(&self) -> bool {
        self.distance_travelled >= self.max_distance
    }

    /// Advance one cell along the stored direction
    pub fn step(&mut self, now: Millis) {
        let (dx, dy) = self.direction.step();
        self.x += dx;
        self.y += dy;
        self.distance_travelled += BLOCK_SIZE;
        self.last_movement_time = now;
    }

    /// True if this power's cell coincides with a player of another color
    pub fn hits(&self, player: &Player) -> bool {
        player.color != self.owner_color && player.occupies(self.x, self.y)
    }
}

/// Local targeting reticle, never broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub x: i32,
    pub y: i32,
    pub color: Color,
}

impl Cursor {
    /// Move by (dx, dy) if the result stays within `player.max_range` cells on both axes.
    /// Each axis is checked on its own; returns whether anything moved.
    pub fn try_shift(&mut self, player: &Player, dx: i32, dy: i32) -> bool {
        let mut moved = false;
        if dx != 0 && within_range(self.x + dx, self.y, player.x, player.y, player.max_range) {
            self.x += dx;
            moved = true;
        }
        if dy != 0 && within_range(self.x, self.y + dy, player.x, player.y, player.max_range) {
            self.y += dy;
            moved = true;
        }
        moved
    }

    pub fn in_range_of(&self, player: &Player) -> bool {
        within_range(self.x, self.y, player.x, player.y, player.max_range)
    }
}

/// What a drawable represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawKind {
    LocalPlayer,
    RemotePlayer,
    Power,
    Cursor,
}

/// Renderer-facing rectangle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drawable {
    pub kind: DrawKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub color: Color,
}

impl Drawable {
    pub fn player(player: &Player, kind: DrawKind) -> Self {
        Self {
            kind,
            id: Some(player.id.clone()),
            x: player.x,
            y: player.y,
            width: BLOCK_SIZE,
            height: BLOCK_SIZE,
            color: player.color,
        }
    }

    pub fn power(power: &Power) -> Self {
        Self {
            kind: DrawKind::Power,
            id: Some(power.id.to_string()),
            x: power.x,
            y: power.y,
            width: BLOCK_SIZE,
            height: BLOCK_SIZE,
            color: power.color,
        }
    }

    pub fn cursor(cursor: &Cursor) -> Self {
        Self {
            kind: DrawKind::Cursor,
            id: None,
            x: cursor.x,
            y: cursor.y,
            width: BLOCK_SIZE,
            height: BLOCK_SIZE,
            color: cursor.color,
        }
    }
}
