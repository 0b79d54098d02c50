use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BmoError;

/// Number of concurrent insert workers.
pub const DEFAULT_POOL_SIZE: usize = 20;

/// Envelopes per insert. The store reaches peak write throughput at
/// batches of around two hundred documents.
pub const DEFAULT_BATCH_SIZE: usize = 200;

pub const DEFAULT_DATABASE: &str = "sophia";
pub const DEFAULT_TABLE: &str = "bmo_test";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Split a comma separated node list, dropping blanks.
pub fn parse_node_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `BMO_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("BMO_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            pipeline: PipelineConfig::from_env_profiled(p),
            store: StoreConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  pipeline:  pool_size={}, batch_size={}, insert_mode={}",
            self.pipeline.pool_size,
            self.pipeline.batch_size,
            self.pipeline.insert_mode
        );
        tracing::info!(
            "  store:     nodes=[{}], database={}, table={}, user={}",
            self.store.nodes.join(", "),
            self.store.database,
            self.store.table,
            self.store.username.as_deref().unwrap_or("(default)")
        );
    }
}

// ── Pipeline ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsertMode {
    /// One write request per batch.
    #[default]
    Batch,
    /// One write request per envelope; isolates failures to a single document.
    PerDocument,
}

impl FromStr for InsertMode {
    type Err = BmoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" => Ok(Self::Batch),
            "per-document" | "per_document" | "document" => Ok(Self::PerDocument),
            other => Err(BmoError::InsertMode(other.to_string())),
        }
    }
}

impl fmt::Display for InsertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch => f.write_str("batch"),
            Self::PerDocument => f.write_str("per-document"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub pool_size: usize,
    pub batch_size: usize,
    pub insert_mode: InsertMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            insert_mode: InsertMode::Batch,
        }
    }
}

impl PipelineConfig {
    fn from_env_profiled(p: &str) -> Self {
        let insert_mode = match profiled_env_opt(p, "BMO_INSERT_MODE") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring BMO_INSERT_MODE, using batch");
                InsertMode::Batch
            }),
            None => InsertMode::Batch,
        };
        Self {
            pool_size: profiled_env_usize(p, "BMO_POOL_SIZE", DEFAULT_POOL_SIZE),
            batch_size: profiled_env_usize(p, "BMO_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            insert_mode,
        }
    }
}

// ── Store ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `host[:port]` addresses, tried in order.
    pub nodes: Vec<String>,
    pub database: String,
    pub table: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub ssl_mode: String,
    pub connect_timeout_secs: u64,
}

impl StoreConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            nodes: parse_node_list(&profiled_env_or(p, "BMO_NODES", "")),
            database: profiled_env_or(p, "BMO_DATABASE", DEFAULT_DATABASE),
            table: profiled_env_or(p, "BMO_TABLE", DEFAULT_TABLE),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            connect_timeout_secs: profiled_env_u64(p, "PG_CONNECT_TIMEOUT_SECS", 10),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own profile prefix so parallel tests never share keys.

    #[test]
    fn defaults_without_env() {
        let config = Config::for_profile("BMOTEST_DEFAULTS");
        assert_eq!(config.profile_label(), "BMOTEST_DEFAULTS");
        assert_eq!(config.pipeline.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.pipeline.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.pipeline.insert_mode, InsertMode::Batch);
    }

    #[test]
    fn profiled_keys_win() {
        env::set_var("BMOTEST_PROFILED_BMO_TABLE", "events");
        env::set_var("BMOTEST_PROFILED_BMO_POOL_SIZE", "4");
        env::set_var("BMOTEST_PROFILED_BMO_NODES", "db1:28015, db2 ,,");
        env::set_var("BMOTEST_PROFILED_BMO_INSERT_MODE", "per-document");

        let config = Config::for_profile("bmotest_profiled");
        assert_eq!(config.store.table, "events");
        assert_eq!(config.pipeline.pool_size, 4);
        assert_eq!(config.store.nodes, vec!["db1:28015", "db2"]);
        assert_eq!(config.pipeline.insert_mode, InsertMode::PerDocument);
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        env::set_var("BMOTEST_BADNUM_BMO_BATCH_SIZE", "lots");
        let config = Config::for_profile("BMOTEST_BADNUM");
        assert_eq!(config.pipeline.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn insert_mode_parsing() {
        assert_eq!("batch".parse::<InsertMode>().unwrap(), InsertMode::Batch);
        assert_eq!("Per_Document".parse::<InsertMode>().unwrap(), InsertMode::PerDocument);
        assert_eq!(
            "bulk".parse::<InsertMode>(),
            Err(BmoError::InsertMode("bulk".into()))
        );
        assert_eq!(InsertMode::PerDocument.to_string(), "per-document");
    }

    #[test]
    fn password_not_serialized() {
        let mut config = Config::for_profile("BMOTEST_SECRET");
        config.store.password = Some("hunter2".into());
        let rendered = serde_json::to_string(&config).unwrap();
        assert!(!rendered.contains("hunter2"));
    }
}
