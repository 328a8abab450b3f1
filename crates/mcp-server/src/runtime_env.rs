use instructions_catalog::{RecordStore, RetryPolicy};
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_INSTRUCTIONS_DIR: &str = "INSTRUCTIONS_DIR";
pub const ENV_ENABLE_MUTATION: &str = "MCP_ENABLE_MUTATION";
pub const ENV_WRITE_RETRIES: &str = "MCP_ATOMIC_WRITE_RETRIES";
pub const ENV_WRITE_BACKOFF_MS: &str = "MCP_ATOMIC_WRITE_BACKOFF_MS";

const DEFAULT_INSTRUCTIONS_DIR: &str = "./instructions";
const DEFAULT_WRITE_RETRIES: u32 = 5;
const DEFAULT_WRITE_BACKOFF_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub instructions_dir: PathBuf,
    pub mutation_enabled: bool,
    pub write_attempts: u32,
    pub write_backoff_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            instructions_dir: PathBuf::from(DEFAULT_INSTRUCTIONS_DIR),
            mutation_enabled: false,
            write_attempts: DEFAULT_WRITE_RETRIES,
            write_backoff_ms: DEFAULT_WRITE_BACKOFF_MS,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Unparseable values fall back to the defaults with a warning; startup never fails on
    /// configuration.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();
        if let Some(dir) = read(ENV_INSTRUCTIONS_DIR) {
            config.instructions_dir = PathBuf::from(dir);
        }
        if let Some(flag) = read(ENV_ENABLE_MUTATION) {
            config.mutation_enabled = is_truthy(&flag);
        }
        if let Some(raw) = read(ENV_WRITE_RETRIES) {
            match raw.parse::<u32>() {
                Ok(attempts) => config.write_attempts = attempts.max(1),
                Err(_) => log::warn!("Ignoring invalid {ENV_WRITE_RETRIES}='{raw}'"),
            }
        }
        if let Some(raw) = read(ENV_WRITE_BACKOFF_MS) {
            match raw.parse::<u64>() {
                Ok(ms) => config.write_backoff_ms = ms,
                Err(_) => log::warn!("Ignoring invalid {ENV_WRITE_BACKOFF_MS}='{raw}'"),
            }
        }
        config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.write_attempts.max(1),
            backoff: Duration::from_millis(self.write_backoff_ms),
        }
    }

    pub fn record_store(&self) -> RecordStore {
        RecordStore::new(self.instructions_dir.clone()).with_retry(self.retry_policy())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
