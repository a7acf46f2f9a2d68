use std::time::Duration;

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Map style served by `/api/config` when nothing overrides it.
pub const DEFAULT_MAP_STYLE: &str = "https://vector.openstreetmap.org/shortbread_v1/tilejson.json";

/// Command-line flags. Every value is optional so that only what was actually
/// given overrides the file and environment layers.
#[derive(Parser, Serialize, Deserialize, Clone, Debug, Default)]
#[command(name = "bike-tracker-server", version, about = "Real-time GPS position broadcast server")]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long, env = "ADDR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Map style URL handed to the viewer page
    #[arg(long, env = "MAP_STYLE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_style: Option<String>,

    /// SQLite database file
    #[arg(long, env = "TRACKER_DB_PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,

    /// Directory of static assets served at /
    #[arg(long, env = "TRACKER_STATIC_DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,

    /// Enable structured JSON logging
    #[arg(long, env = "TRACKER_JSON_LOGS", num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_logs: Option<bool>,

    /// Path to TOML config file
    #[arg(long, default_value = "./tracker.toml")]
    #[serde(skip)]
    pub config: String,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub map_style: String,
    pub db_path: String,
    pub static_dir: String,
    pub json_logs: bool,

    /// Viewer channel tuning (loaded from [viewer] section in TOML)
    #[serde(default)]
    pub viewer: ViewerConfig,
}

/// Per-viewer connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerConfig {
    /// Outbound frames buffered per viewer before it counts as too slow (default: 32)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Longest a single socket write may take, in milliseconds (default: 5000)
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Ping interval in seconds; 0 disables keepalive (default: 0)
    #[serde(default)]
    pub keepalive_secs: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            send_timeout_ms: default_send_timeout_ms(),
            keepalive_secs: 0,
        }
    }
}

fn default_queue_capacity() -> usize {
    32
}

fn default_send_timeout_ms() -> u64 {
    5000
}

impl ViewerConfig {
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Effective send timeout in milliseconds.
    pub fn send_timeout_ms(&self) -> u64 {
        self.send_timeout_ms.max(1)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms())
    }

    /// Ping interval, if keepalive is enabled.
    pub fn keepalive(&self) -> Option<Duration> {
        (self.keepalive_secs > 0).then(|| Duration::from_secs(self.keepalive_secs))
    }

    /// How long a viewer may stay silent before it is considered gone.
    /// Only applies with keepalive enabled; pongs count as traffic.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.keepalive().map(|interval| interval * 3)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "localhost".to_string(),
            map_style: DEFAULT_MAP_STYLE.to_string(),
            db_path: "bike_tracker.db".to_string(),
            static_dir: "./static".to_string(),
            json_logs: false,
            viewer: ViewerConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (TRACKER_*) < CLI args and their env aliases
    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        Self::figment(cli).extract()
    }

    pub fn figment(cli: &Cli) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("TRACKER_").split("__"))
            .merge(Serialized::defaults(cli))
    }

    /// Address string passed to the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Bike Tracker Server Configuration
# Place this file at ./tracker.toml or specify with --config <path>
# Settings can be overridden via environment variables (TRACKER_PORT, etc.),
# the ADDR / PORT / MAP_STYLE variables, or CLI flags (--port, etc.)

# Server port (default: 8080)
# port = 8080

# Bind address (default: localhost)
# bind_address = "localhost"

# Map style URL returned by /api/config
# map_style = "https://vector.openstreetmap.org/shortbread_v1/tilejson.json"

# SQLite database file (default: bike_tracker.db)
# db_path = "bike_tracker.db"

# Directory of static assets served at / (default: ./static)
# A built-in viewer page is served when the directory has no index.html
# static_dir = "./static"

# Enable structured JSON logging
# json_logs = false

# ---- Viewer Channel ----
# [viewer]

# Frames buffered per viewer; a viewer that falls this far behind is dropped
# queue_capacity = 32

# Maximum time for one WebSocket write before the viewer is dropped
# send_timeout_ms = 5000

# Ping interval in seconds. 0 disables keepalive, in which case a silent
# viewer that never disconnects keeps its slot indefinitely.
# keepalive_secs = 0
"#
    .to_string()
}
