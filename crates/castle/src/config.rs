//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CastleError;

/// Everything tunable about a running server.
///
/// Missing fields take their defaults when deserializing, so a config file
/// only has to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Each player's total thinking time for one game.
    pub move_time: Duration,
    /// How long an identified player may stay disconnected mid-game.
    pub abandonment_grace: Duration,
    /// Period of the clock-sync broadcast. `None` turns it off.
    pub sync_interval: Option<Duration>,
    pub worker_threads: usize,
    pub db_path: PathBuf,
    pub db_pool_size: usize,
    pub live_games_limit: usize,
    pub history_page_size: u32,
    /// How long a new connection has to send its `Hello`.
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            move_time: Duration::from_secs(300),
            abandonment_grace: Duration::from_secs(30),
            sync_interval: Some(Duration::from_secs(1)),
            worker_threads: 2,
            db_path: PathBuf::from("castle.db"),
            db_pool_size: 10,
            live_games_limit: 10,
            history_page_size: 10,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Applies `CASTLE_*` overrides from the process environment.
    pub fn with_env(self) -> Result<Self, CastleError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies `CASTLE_*` overrides read through `lookup`.
    ///
    /// Durations are whole seconds. `CASTLE_SYNC_SECS=0` disables the
    /// clock-sync broadcast.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CastleError> {
        if let Some(bind) = lookup("CASTLE_BIND") {
            self.bind = bind;
        }
        if let Some(path) = lookup("CASTLE_DB") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(secs) = parse(&lookup, "CASTLE_MOVE_SECS")? {
            self.move_time = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "CASTLE_GRACE_SECS")? {
            self.abandonment_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&lookup, "CASTLE_SYNC_SECS")? {
            self.sync_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(n) = parse(&lookup, "CASTLE_WORKERS")? {
            self.worker_threads = n;
        }
        if let Some(n) = parse(&lookup, "CASTLE_DB_POOL")? {
            self.db_pool_size = n;
        }
        Ok(self)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, CastleError> {
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| CastleError::Config(format!("{name}: cannot parse {raw:?}")))
        })
        .transpose()
}
