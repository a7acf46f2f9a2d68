//! GPS fixes: the data model, its SQLite store, and the HTTP endpoints
//! that write and read it.

pub mod api;
pub mod ingress;
pub mod store;

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub use store::PositionStore;

/// A single GPS fix. This is also the exact JSON shape pushed to viewers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix seconds (UTC), always assigned by the server.
    pub timestamp: i64,
}

impl Position {
    /// Create a fix stamped with the current server time.
    pub fn stamped(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Inbound payload for `POST /position`.
/// Any client-supplied `timestamp` is ignored along with other unknown fields.
#[derive(Debug, Deserialize)]
pub struct PositionReport {
    pub latitude: f64,
    pub longitude: f64,
}

impl PositionReport {
    pub fn into_position(self) -> Position {
        Position::stamped(self.latitude, self.longitude)
    }
}
