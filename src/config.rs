//! Client-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the client looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/client.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PITCHSIDE_CONFIG_PATH";

const DEFAULT_MUTATION_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RECONNECT_INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_VIEW_CHANNEL_CAPACITY: usize = 16;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 32;

/// Immutable runtime configuration shared across the client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on how long a backend confirmation may stay outstanding
    /// before the optimistic change is rolled back.
    pub mutation_timeout: Duration,
    /// First delay used when re-establishing a dropped thread subscription.
    pub reconnect_initial_delay: Duration,
    /// Upper bound for the reconnect backoff.
    pub reconnect_max_delay: Duration,
    /// Capacity of the view broadcast channel.
    pub view_channel_capacity: usize,
    /// Capacity of per-subscription event channels.
    pub event_channel_capacity: usize,
}

impl ClientConfig {
    /// Load the configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded client configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            mutation_timeout: DEFAULT_MUTATION_TIMEOUT,
            reconnect_initial_delay: DEFAULT_RECONNECT_INITIAL_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            view_channel_capacity: DEFAULT_VIEW_CHANNEL_CAPACITY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file; every field is optional
/// and missing entries keep their defaults.
struct RawConfig {
    mutation_timeout_ms: Option<u64>,
    reconnect_initial_delay_ms: Option<u64>,
    reconnect_max_delay_ms: Option<u64>,
    view_channel_capacity: Option<usize>,
    event_channel_capacity: Option<usize>,
}

impl From<RawConfig> for ClientConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = ClientConfig::default();
        Self {
            mutation_timeout: raw
                .mutation_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.mutation_timeout),
            reconnect_initial_delay: raw
                .reconnect_initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_initial_delay),
            reconnect_max_delay: raw
                .reconnect_max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_max_delay),
            view_channel_capacity: raw
                .view_channel_capacity
                .unwrap_or(defaults.view_channel_capacity),
            event_channel_capacity: raw
                .event_channel_capacity
                .unwrap_or(defaults.event_channel_capacity),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
