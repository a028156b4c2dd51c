//! Application state shared across routes

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;

use super::driver::SessionView;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Latest view of the observed session
    pub view: watch::Receiver<SessionView>,
}

impl AppState {
    pub fn new(config: Config, view: watch::Receiver<SessionView>) -> Self {
        Self {
            config: Arc::new(config),
            view,
        }
    }
}
