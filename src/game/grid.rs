//! Grid geometry: cell size, directions and arena bounds

use serde::{Deserialize, Serialize};

/// Edge length of one grid cell in pixels
pub const BLOCK_SIZE: i32 = 32;

/// Movement axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
}

/// An axis plus a sign; screen coordinates, so `Up` is negative y
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Direction {
    pub axis: Axis,
    pub sign: i32,
}

impl Direction {
    pub const UP: Direction = Direction { axis: Axis::Y, sign: -1 };
    pub const DOWN: Direction = Direction { axis: Axis::Y, sign: 1 };
    pub const LEFT: Direction = Direction { axis: Axis::X, sign: -1 };
    pub const RIGHT: Direction = Direction { axis: Axis::X, sign: 1 };

    /// Pixel offset of a single cell step in this direction
    pub fn step(self) -> (i32, i32) {
        self.offset(1)
    }

    /// Pixel offset of `cells` steps in this direction
    pub fn offset(self, cells: i32) -> (i32, i32) {
        let d = self.sign * cells * BLOCK_SIZE;
        match self.axis {
            Axis::X => (d, 0),
            Axis::Y => (0, d),
        }
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::UP
    }
}

/// Playable area in pixels; entities are `entity_size` squares anchored top-left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arena {
    pub width: i32,
    pub height: i32,
    pub entity_size: i32,
}

impl Arena {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            entity_size: BLOCK_SIZE,
        }
    }

    /// True if an entity anchored at (x, y) lies fully inside the arena
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && x <= self.width - self.entity_size && y >= 0 && y <= self.height - self.entity_size
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// Per-axis distance check used by the cursor range rule
pub fn within_range(ax: i32, ay: i32, bx: i32, by: i32, range_cells: i32) -> bool {
    let limit = range_cells * BLOCK_SIZE;
    (ax - bx).abs() <= limit && (ay - by).abs() <= limit
}
