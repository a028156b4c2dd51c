//! Session orchestration and shared application state

pub mod driver;
pub mod session;
pub mod state;

pub use driver::{BotInput, FrameDriver, InputSource, SessionView};
pub use session::Session;
pub use state::AppState;
