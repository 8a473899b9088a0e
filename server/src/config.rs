//! Runtime configuration for the server and for every room session.

use shared::{MAX_PLAYERS, MAX_TOTAL_ROUNDS, MIN_TOTAL_ROUNDS};
use std::time::Duration;

/// Per-room game settings. Every new room starts from a copy of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Pause between dealing and the first reveal, for the card animation.
    pub deal_delay: Duration,
    /// Time the police has to name a suspect before one is picked for them.
    pub police_guess_timeout: Duration,
    /// Time the result stays up before the room advances by itself.
    pub next_round_timeout: Duration,
    pub total_rounds: u32,
    pub max_players: u8,
}

impl SessionConfig {
    /// Clamps the round cap into the allowed range.
    pub fn with_total_rounds(mut self, rounds: u32) -> Self {
        self.total_rounds = rounds.clamp(MIN_TOTAL_ROUNDS, MAX_TOTAL_ROUNDS);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            deal_delay: Duration::from_secs(3),
            police_guess_timeout: Duration::from_secs(30),
            next_round_timeout: Duration::from_secs(15),
            total_rounds: 5,
            max_players: MAX_PLAYERS as u8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: String,
    pub session: SessionConfig,
    /// A room with no live connections for this long is shut down.
    pub idle_room_timeout: Duration,
    /// Directory entries not refreshed within this window are dropped.
    pub directory_stale_after: Duration,
    pub directory_sweep_interval: Duration,
}

impl ServerConfig {
    /// How often a live room re-reports itself so the directory keeps it.
    pub fn directory_refresh_interval(&self) -> Duration {
        (self.directory_stale_after / 2).max(Duration::from_millis(10))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            session: SessionConfig::default(),
            idle_room_timeout: Duration::from_secs(60),
            directory_stale_after: Duration::from_secs(60),
            directory_sweep_interval: Duration::from_secs(15),
        }
    }
}
