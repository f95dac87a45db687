//! Server configuration, loaded from the environment.
//!
//! Every field has a default so a bare `coedit-server` starts on port 3001
//! with the documented limits. `PORT` is the one variable deployments
//! usually set.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listening port for both the HTTP surface and the WebSocket upgrade.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Hard cap on members per room.
    #[serde(default = "default_max_users_per_room")]
    pub max_users_per_room: usize,

    /// Frames buffered per member before a slow connection starts lagging.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Seconds between idle-room sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Seconds an empty room may idle before the sweep removes it.
    #[serde(default = "default_idle_room_secs")]
    pub idle_room_secs: u64,

    /// Origin allowed to make cross-origin requests (the dev editor).
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Config {
    /// Load from a `.env` file if present, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(ConfigError::EnvError)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_room_ms(&self) -> u64 {
        self.idle_room_secs * 1000
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_users_per_room: default_max_users_per_room(),
            broadcast_capacity: default_broadcast_capacity(),
            sweep_interval_secs: default_sweep_interval_secs(),
            idle_room_secs: default_idle_room_secs(),
            cors_origin: default_cors_origin(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_max_users_per_room() -> usize {
    crate::room::MAX_USERS
}

fn default_broadcast_capacity() -> usize {
    256
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

fn default_idle_room_secs() -> u64 {
    30 * 60
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}
