//! Daemon configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file (`FINDOC_CONFIG`, default `findoc.toml`), then `FINDOC__SECTION__KEY`
//! environment variables.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use findoc_core::application::worker::constants::{
    DEFAULT_CHANNEL, DEFAULT_MAX_DELIVERIES, DEFAULT_VISIBILITY_TIMEOUT_MS, HEARTBEAT_INTERVAL,
};
use findoc_core::port::MaintenanceConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "findoc.toml";
const ENV_PREFIX: &str = "FINDOC";
const ENV_SEPARATOR: &str = "__";

/// Which parts of the system this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// HTTP intake only
    Api,
    /// Queue consumers only
    Worker,
    /// Both in one process
    All,
}

impl Role {
    pub fn runs_api(self) -> bool {
        matches!(self, Role::Api | Role::All)
    }

    pub fn runs_workers(self) -> bool {
        matches!(self, Role::Worker | Role::All)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub role: Role,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub object_store: ObjectStoreConfig,
    pub record_store: RecordStoreConfig,
    pub pipeline: PipelineConfig,
    pub scratch_dir: String,
    pub maintenance: MaintenanceSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            role: Role::All,
            database: DatabaseConfig::default(),
            http: HttpConfig::default(),
            queue: QueueConfig::default(),
            worker: WorkerConfig::default(),
            object_store: ObjectStoreConfig::default(),
            record_store: RecordStoreConfig::default(),
            pipeline: PipelineConfig::default(),
            scratch_dir: "~/.findoc/scratch".to_string(),
            maintenance: MaintenanceSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path (`~` allowed) or `sqlite::memory:`
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "~/.findoc/queue.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub channel: String,
    pub visibility_timeout_ms: i64,
    pub max_deliveries: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            visibility_timeout_ms: DEFAULT_VISIBILITY_TIMEOUT_MS,
            max_deliveries: DEFAULT_MAX_DELIVERIES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of worker tasks in this process
    pub concurrency: usize,
    pub heartbeat_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            heartbeat_interval_secs: HEARTBEAT_INTERVAL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    /// Documents are fetched from `<base_url>/files/<file_id>`
    pub base_url: String,
    pub admin_secret: Option<String>,
    /// Longest silence while waiting for headers or the next body chunk
    pub read_timeout_secs: u64,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            admin_secret: None,
            read_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordStoreConfig {
    pub graphql_url: String,
    pub admin_secret: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            graphql_url: "http://localhost:8080/v1/graphql".to_string(),
            admin_secret: None,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub program: String,
    #[serde(deserialize_with = "comma_list")]
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    /// Unset means no limit
    pub timeout_secs: Option<u64>,
    #[serde(deserialize_with = "comma_list")]
    pub env_allowlist: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            program: "findoc-crew".to_string(),
            args: Vec::new(),
            working_dir: None,
            timeout_secs: None,
            env_allowlist: [
                "PATH",
                "HOME",
                "LANG",
                "OPENAI_API_KEY",
                "SERPER_API_KEY",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceSection {
    pub interval_hours: u64,
    pub retention_days: i64,
    pub max_db_size_mb: f64,
}

impl Default for MaintenanceSection {
    fn default() -> Self {
        let defaults = MaintenanceConfig::default();
        Self {
            interval_hours: 24,
            retention_days: defaults.finished_item_retention_days,
            max_db_size_mb: defaults.max_db_size_mb,
        }
    }
}

impl AppConfig {
    /// Load from `FINDOC_CONFIG` (or `findoc.toml`) plus the process environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("FINDOC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_from(path: &str, env: Environment) -> Result<Self> {
        // Values stay strings; serde converts the numeric fields, secrets are kept verbatim
        let env = env
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR);

        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read configuration ({})", path))?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.role.runs_workers() && self.worker.concurrency == 0 {
            anyhow::bail!("worker.concurrency must be at least 1");
        }
        if self.queue.max_deliveries < 1 {
            anyhow::bail!("queue.max_deliveries must be at least 1");
        }
        if self.queue.visibility_timeout_ms <= 0 {
            anyhow::bail!("queue.visibility_timeout_ms must be positive");
        }
        let heartbeat_ms = self.heartbeat_interval().as_millis() as i64;
        if self.role.runs_workers() && heartbeat_ms >= self.queue.visibility_timeout_ms {
            anyhow::bail!(
                "worker.heartbeat_interval_secs ({}s) must be shorter than queue.visibility_timeout_ms ({}ms)",
                self.worker.heartbeat_interval_secs,
                self.queue.visibility_timeout_ms
            );
        }
        Ok(())
    }

    /// Database path with `~` expanded
    pub fn database_url(&self) -> String {
        expand(&self.database.url)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        PathBuf::from(expand(&self.scratch_dir))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.worker.heartbeat_interval_secs.max(1))
    }

    pub fn pipeline_timeout(&self) -> Option<Duration> {
        self.pipeline.timeout_secs.map(Duration::from_secs)
    }

    pub fn maintenance_config(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            finished_item_retention_days: self.maintenance.retention_days,
            max_db_size_mb: self.maintenance.max_db_size_mb,
        }
    }

    pub fn maintenance_period(&self) -> Duration {
        Duration::from_secs(self.maintenance.interval_hours.max(1) * 60 * 60)
    }
}

/// A TOML array, or a comma-separated string from the environment
fn comma_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrJoined {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match ListOrJoined::deserialize(deserializer)? {
        ListOrJoined::List(items) => items,
        ListOrJoined::Joined(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    })
}

fn expand(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}
