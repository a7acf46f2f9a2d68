use std::path::PathBuf;

use crate::config::{Config, ViewerConfig};
use crate::db::DbPool;
use crate::positions::PositionStore;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Position log
    pub store: PositionStore,
    /// Live viewer connections
    pub connections: ConnectionRegistry,
    /// Map style URL returned by /api/config
    pub map_style: String,
    /// Directory static assets are served from
    pub static_dir: PathBuf,
    /// Viewer channel settings
    pub viewer: ViewerConfig,
}

impl AppState {
    pub fn new(db: DbPool, config: &Config) -> Self {
        Self {
            store: PositionStore::new(db),
            connections: ConnectionRegistry::new(),
            map_style: config.map_style.clone(),
            static_dir: PathBuf::from(&config.static_dir),
            viewer: config.viewer.clone(),
        }
    }
}
