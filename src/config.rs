use std::path::PathBuf;
use std::time::Duration;

pub const GAME_COMPLETED_EVENT: &str = "gameCompleted";
pub const CREDENTIAL_KEY: &str = "accessToken";
pub const STATS_PATH: &str = "/api/users/stats";

const DEFAULT_API_BASE: &str = "http://localhost:5000";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_base: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub workers: usize,
    pub discard_stale: bool,
    pub store_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            poll_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            workers: 2,
            discard_stale: true,
            store_path: None,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SyncConfig::from_env`] but reads through `lookup`, so tests never
    /// have to touch the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_base = lookup("STATS_API_BASE")
            .map(|val| val.trim().trim_end_matches('/').to_string())
            .filter(|val| !val.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let poll_interval = Duration::from_secs(
            lookup("STATS_POLL_SECS")
                .and_then(|val| val.trim().parse::<u64>().ok())
                .unwrap_or(30)
                .max(1),
        );
        let request_timeout = Duration::from_secs(
            lookup("STATS_REQUEST_TIMEOUT_SECS")
                .and_then(|val| val.trim().parse::<u64>().ok())
                .unwrap_or(10)
                .clamp(1, 120),
        );
        let workers = lookup("STATS_WORKERS")
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(2)
            .clamp(1, 8);
        let discard_stale = lookup("STATS_DISCARD_STALE")
            .map(|val| parse_flag(&val))
            .unwrap_or(true);
        let store_path = lookup("STATS_STORE_PATH")
            .filter(|val| !val.trim().is_empty())
            .map(PathBuf::from);

        Self {
            api_base,
            poll_interval,
            request_timeout,
            workers,
            discard_stale,
            store_path,
        }
    }

    pub fn stats_url(&self) -> String {
        format!("{}{STATS_PATH}", self.api_base)
    }
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
