//! Grid Arena - peer-synchronized grid arena simulation
//!
//! Each client session owns its player, power and cursor, mirrors remote players from
//! movement broadcasts and presence, and renders one frame per tick.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod sync;
pub mod util;
