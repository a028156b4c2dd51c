//! Game simulation modules

pub mod combat;
pub mod engine;
pub mod entity;
pub mod frame;
pub mod grid;
pub mod input;
pub mod movement;

pub use engine::{EngineConfig, LocalSimulation, SimEvent, StateDelta};
pub use entity::{Color, Cursor, DrawKind, Drawable, Player, Power};
pub use frame::{Frame, FrameBuilder};
pub use grid::{Arena, Axis, Direction, BLOCK_SIZE};
pub use input::{InputSnapshot, Key};
pub use movement::MovementModel;
