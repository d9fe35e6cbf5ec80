// Application state module
// Shared state handed to every connection task

use super::types::Config;
use crate::handler::Router;

/// Application state
///
/// Built once at startup and never mutated afterwards.
pub struct AppState {
    pub config: Config,
    pub router: Router,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            router: Router::from_config(config),
        }
    }
}
