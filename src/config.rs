use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CONFIG_PATH: &str = "config/default";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub fda: FdaConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub schedule: ScheduleConfig,
}

/// Upstream enforcement-record API and the fixed query sent to it.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct FdaConfig {
    pub endpoint: String,
    pub search: String,
    pub limit: u32,
    pub request_timeout_secs: u64,
}

impl Default for FdaConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.fda.gov/food/enforcement.json".to_string(),
            search: r#"distribution_pattern:"nationwide""#.to_string(),
            limit: 15,
            request_timeout_secs: 30,
        }
    }
}

impl FdaConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "recalls.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    /// Upper bound on documents returned by the read endpoint
    pub max_listed: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            max_listed: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub run_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 7 * 24 * 60 * 60,
            run_on_startup: false,
        }
    }
}

impl Config {
    /// Layers `.env`, the optional config file and `RECALL_*` variables over the defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("RECALL")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fda.endpoint.trim().is_empty() {
            anyhow::bail!("fda.endpoint must not be empty");
        }
        if self.fda.limit == 0 {
            anyhow::bail!("fda.limit must be greater than zero");
        }
        if self.schedule.interval_secs == 0 {
            anyhow::bail!("schedule.interval_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.interval_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// File that `load(path)` reads: `path` itself when it has an extension,
    /// otherwise `path.toml`.
    pub fn file_path(path: &str) -> PathBuf {
        let file = Path::new(path);
        if file.extension().is_some() {
            file.to_path_buf()
        } else {
            file.with_extension("toml")
        }
    }

    /// Writes the built-in defaults to `path`. An existing file is kept
    /// unless `force` is set. Returns whether the file was written.
    pub fn write_default(path: &Path, force: bool) -> anyhow::Result<bool> {
        if path.exists() && !force {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Config::default().to_toml()?)?;
        Ok(true)
    }
}
