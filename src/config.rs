//! Runtime configuration loaded from the environment

use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_QUEUE: usize = 100;

/// Rules for a single game.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameConfig {
    /// Count every answer a player sends for a question instead of only the
    /// first one.
    pub allow_repeat_answers: bool,
    /// Only report this many players in the final standings.
    pub podium_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: PathBuf,
    /// Capacity of the coordinator's event queue
    pub event_queue: usize,
    /// Capacity of each connection's outbound queue
    pub outbound_queue: usize,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            static_dir: PathBuf::from("web"),
            event_queue: DEFAULT_QUEUE,
            outbound_queue: DEFAULT_QUEUE,
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load config from environment variables, falling back to defaults for
    /// anything missing or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = parse_var("PARTY_PORT").unwrap_or(defaults.port);

        let static_dir = std::env::var("PARTY_STATIC_DIR")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);

        let event_queue = parse_var("PARTY_EVENT_QUEUE")
            .filter(|&n: &usize| n > 0)
            .unwrap_or(defaults.event_queue);

        let outbound_queue = parse_var("PARTY_OUTBOUND_QUEUE")
            .filter(|&n: &usize| n > 0)
            .unwrap_or(defaults.outbound_queue);

        let allow_repeat_answers = std::env::var("PARTY_ALLOW_REPEAT_ANSWERS")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let podium_size = parse_var("PARTY_PODIUM_SIZE").filter(|&n: &usize| n > 0);

        tracing::info!(
            port,
            event_queue,
            outbound_queue,
            allow_repeat_answers,
            ?podium_size,
            "Server config loaded"
        );

        Self {
            port,
            static_dir,
            event_queue,
            outbound_queue,
            game: GameConfig {
                allow_repeat_answers,
                podium_size,
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", name, raw);
            None
        }
    }
}
