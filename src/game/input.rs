//! Key bindings and the per-tick held-key snapshot

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::grid::Direction;

/// Keys the game reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Z,
    C,
    S,
    X,
    Left,
    Up,
    Right,
    Down,
    Space,
    R,
}

/// What a key does once bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Letter set: always moves the player
    Move(Direction),
    /// Arrows: steer the cursor while one exists, otherwise move the player
    Steer(Direction),
    Launch,
    Recenter,
}

impl Key {
    pub fn action(self) -> Action {
        match self {
            Key::Z => Action::Move(Direction::LEFT),
            Key::C => Action::Move(Direction::RIGHT),
            Key::S => Action::Move(Direction::UP),
            Key::X => Action::Move(Direction::DOWN),
            Key::Left => Action::Steer(Direction::LEFT),
            Key::Right => Action::Steer(Direction::RIGHT),
            Key::Up => Action::Steer(Direction::UP),
            Key::Down => Action::Steer(Direction::DOWN),
            Key::Space => Action::Launch,
            Key::R => Action::Recenter,
        }
    }

    /// Browser `keyCode` values
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            90 => Key::Z,
            67 => Key::C,
            83 => Key::S,
            88 => Key::X,
            37 => Key::Left,
            38 => Key::Up,
            39 => Key::Right,
            40 => Key::Down,
            32 => Key::Space,
            82 => Key::R,
            _ => return None,
        })
    }

    /// Browser `KeyboardEvent.key` values
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "z" | "Z" => Key::Z,
            "c" | "C" => Key::C,
            "s" | "S" => Key::S,
            "x" | "X" => Key::X,
            "ArrowLeft" => Key::Left,
            "ArrowUp" => Key::Up,
            "ArrowRight" => Key::Right,
            "ArrowDown" => Key::Down,
            " " | "Space" => Key::Space,
            "r" | "R" => Key::R,
            _ => return None,
        })
    }
}

/// Movement keys polled by the continuous model, in priority order
pub const MOVEMENT_POLL_ORDER: [Key; 4] = [Key::Z, Key::C, Key::S, Key::X];

/// Keys held down at the start of a tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    held: HashSet<Key>,
}

impl InputSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_held(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            held: keys.into_iter().collect(),
        }
    }

    pub fn press(&mut self, key: Key) {
        self.held.insert(key);
    }

    pub fn release(&mut self, key: Key) {
        self.held.remove(&key);
    }

    pub fn is_down(&self, key: Key) -> bool {
        self.held.contains(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}
