//! Local simulation: the client's own player, power and cursor

use tracing::{debug, trace};
use uuid::Uuid;

use crate::util::time::Millis;

use super::combat::{CombatSystem, PowerOutcome, PowerStats};
use super::entity::{Color, Cursor, Player, Power};
use super::grid::{Arena, Direction};
use super::input::{Action, InputSnapshot, Key, MOVEMENT_POLL_ORDER};
use super::movement::{MovementModel, MovementSystem};

/// Spawn cell for freshly created players
pub const SPAWN_X: i32 = 64;
pub const SPAWN_Y: i32 = 64;

/// Engine tuning, fixed for the lifetime of a session
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub model: MovementModel,
    pub arena: Arena,
    /// Continuous-model step cooldown
    pub movement_delay: Millis,
    pub power: PowerStats,
    /// Cursor range in cells
    pub max_range: i32,
    pub player_color: Color,
    pub cursor_color: Color,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: MovementModel::Grid,
            arena: Arena::default(),
            movement_delay: 150,
            power: PowerStats::default(),
            max_range: 4,
            player_color: Color::Blue,
            cursor_color: Color::Green,
        }
    }
}

/// Something that changed (or was refused) while applying input or time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    PlayerMoved { x: i32, y: i32 },
    MoveRejected { direction: Direction },
    PowerLaunched { id: Uuid, x: i32, y: i32, direction: Direction },
    LaunchIgnored,
    PowerStepped { x: i32, y: i32, distance_travelled: i32 },
    PowerHit { target_id: String, x: i32, y: i32 },
    PowerExpired { distance_travelled: i32 },
    PowerDiscarded,
    CursorMoved { x: i32, y: i32 },
    CursorRejected { direction: Direction },
    CursorPlaced { x: i32, y: i32 },
}

/// Events produced by one `apply_input` or `advance` call, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDelta {
    pub events: Vec<SimEvent>,
}

impl StateDelta {
    fn push(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    pub fn extend(&mut self, other: StateDelta) {
        self.events.extend(other.events);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Final committed player position, if the player moved
    pub fn player_moved(&self) -> Option<(i32, i32)> {
        self.events.iter().rev().find_map(|e| match e {
            SimEvent::PlayerMoved { x, y } => Some((*x, *y)),
            _ => None,
        })
    }

    pub fn hit_target(&self) -> Option<&str> {
        self.events.iter().find_map(|e| match e {
            SimEvent::PowerHit { target_id, .. } => Some(target_id.as_str()),
            _ => None,
        })
    }
}

/// The locally owned state bundle and the rules that mutate it
pub struct LocalSimulation {
    config: EngineConfig,
    player: Player,
    power: Option<Power>,
    cursor: Option<Cursor>,
    last_direction: Direction,
    last_move_time: Option<Millis>,
}

impl LocalSimulation {
    pub fn new(player_id: impl Into<String>, config: EngineConfig) -> Self {
        let player = Player::new(player_id, SPAWN_X, SPAWN_Y, config.player_color, config.max_range);
        Self::with_player(player, config)
    }

    pub fn with_player(player: Player, config: EngineConfig) -> Self {
        Self {
            config,
            player,
            power: None,
            cursor: None,
            last_direction: Direction::default(),
            last_move_time: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn power(&self) -> Option<&Power> {
        self.power.as_ref()
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn last_direction(&self) -> Direction {
        self.last_direction
    }

    /// Handle one key-down event
    pub fn apply_input(&mut self, key: Key, now: Millis) -> StateDelta {
        let mut delta = StateDelta::default();

        match key.action() {
            Action::Move(direction) => {
                if self.config.model == MovementModel::Grid {
                    self.move_player(direction, now, &mut delta);
                }
            }
            Action::Steer(direction) => {
                if self.cursor.is_some() {
                    self.shift_cursor(direction, &mut delta);
                } else if self.config.model == MovementModel::Grid {
                    self.move_player(direction, now, &mut delta);
                }
            }
            Action::Launch => self.launch(now, &mut delta),
            Action::Recenter => self.recenter(&mut delta),
        }

        delta
    }

    /// Advance time-driven state: held-key movement (continuous model) and the power.
    /// `targets` are the players a power can hit.
    pub fn advance<'a>(
        &mut self,
        now: Millis,
        held: &InputSnapshot,
        targets: impl IntoIterator<Item = &'a Player>,
    ) -> StateDelta {
        let mut delta = StateDelta::default();

        if self.config.model == MovementModel::Continuous {
            self.poll_held_movement(now, held, &mut delta);
            if held.is_down(Key::Space) && self.power.is_none() {
                self.launch(now, &mut delta);
            }
        }

        self.step_power(now, targets, &mut delta);
        delta
    }

    /// Move the cursor one cell. No cursor means nothing happens.
    pub fn move_cursor(&mut self, direction: Direction) -> StateDelta {
        let mut delta = StateDelta::default();
        self.shift_cursor(direction, &mut delta);
        delta
    }

    fn poll_held_movement(&mut self, now: Millis, held: &InputSnapshot, delta: &mut StateDelta) {
        let arrows = [Key::Left, Key::Right, Key::Up, Key::Down];
        let cursor_active = self.cursor.is_some();

        for key in MOVEMENT_POLL_ORDER.into_iter().chain(arrows) {
            if !held.is_down(key) {
                continue;
            }
            let direction = match key.action() {
                Action::Move(d) => d,
                Action::Steer(d) if !cursor_active => d,
                _ => continue,
            };
            if MovementSystem::cooldown_elapsed(now, self.last_move_time, self.config.movement_delay) {
                self.move_player(direction, now, delta);
            }
        }
    }

    fn move_player(&mut self, direction: Direction, now: Millis, delta: &mut StateDelta) {
        let Some((x, y)) = MovementSystem::destination(&self.player, direction, &self.config.arena)
        else {
            trace!(player_id = %self.player.id, ?direction, "move rejected at arena edge");
            delta.push(SimEvent::MoveRejected { direction });
            return;
        };

        let (dx, dy) = (x - self.player.x, y - self.player.y);
        self.player.x = x;
        self.player.y = y;
        // the cursor rides along so its range invariant keeps holding
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.x += dx;
            cursor.y += dy;
        }
        self.last_direction = direction;
        self.last_move_time = Some(now);
        delta.push(SimEvent::PlayerMoved { x, y });
    }

    fn launch(&mut self, now: Millis, delta: &mut StateDelta) {
        if self.power.is_some() {
            delta.push(SimEvent::LaunchIgnored);
            return;
        }

        let power = CombatSystem::launch(&self.player, self.last_direction, now, &self.config.power);
        debug!(player_id = %self.player.id, power_id = %power.id, direction = ?power.direction, "power launched");
        delta.push(SimEvent::PowerLaunched {
            id: power.id,
            x: power.x,
            y: power.y,
            direction: power.direction,
        });
        self.power = Some(power);
    }

    fn step_power<'a>(
        &mut self,
        now: Millis,
        targets: impl IntoIterator<Item = &'a Player>,
        delta: &mut StateDelta,
    ) {
        let Some(power) = self.power.as_mut() else {
            return;
        };

        let outcome = CombatSystem::advance(power, now, targets);
        let terminal = outcome.is_terminal();
        match outcome {
            PowerOutcome::Idle => {}
            PowerOutcome::Stepped { x, y, distance_travelled } => {
                delta.push(SimEvent::PowerStepped { x, y, distance_travelled });
            }
            PowerOutcome::Hit { target_id, x, y } => {
                debug!(player_id = %self.player.id, target_id = %target_id, x, y, "power hit");
                delta.push(SimEvent::PowerHit { target_id, x, y });
            }
            PowerOutcome::Expired { distance_travelled } => {
                delta.push(SimEvent::PowerExpired { distance_travelled });
            }
        }
        if terminal {
            self.power = None;
        }
    }

    fn shift_cursor(&mut self, direction: Direction, delta: &mut StateDelta) {
        let Some(cursor) = self.cursor.as_mut() else {
            return;
        };

        let (dx, dy) = direction.step();
        if cursor.try_shift(&self.player, dx, dy) {
            delta.push(SimEvent::CursorMoved { x: cursor.x, y: cursor.y });
        } else {
            trace!(player_id = %self.player.id, ?direction, "cursor move out of range");
            delta.push(SimEvent::CursorRejected { direction });
        }
    }

    fn recenter(&mut self, delta: &mut StateDelta) {
        if self.power.take().is_some() {
            delta.push(SimEvent::PowerDiscarded);
        }

        let (dx, dy) = self.last_direction.step();
        let cursor = Cursor {
            x: self.player.x + dx,
            y: self.player.y + dy,
            color: self.config.cursor_color,
        };
        delta.push(SimEvent::CursorPlaced { x: cursor.x, y: cursor.y });
        self.cursor = Some(cursor);
    }
}
