use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

/// Points at an alternative TOML config file.
const CONFIG_FILE_VAR: &str = "REDCODE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "redcode.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// JSON file holding every user and bot
    pub database_path: PathBuf,
    pub bind_addr: String,
    pub save_interval_secs: u64,
    pub sweep_interval_secs: u64,
    /// How long an online bot may stay silent before the sweeper marks it offline
    pub stale_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("database.json"),
            bind_addr: "0.0.0.0:8080".to_owned(),
            save_interval_secs: 10,
            sweep_interval_secs: 30,
            stale_timeout_secs: 120,
        }
    }
}

impl ApiConfig {
    pub fn load(manifest_dir: &Path) -> Result<Self> {
        #[cfg(debug_assertions)]
        if let Err(e) = dotenvy::from_path(manifest_dir.join(".env")) {
            if !e.not_found() {
                return Err(e).context("Failed to read .env file");
            }
        }

        let file = env::var_os(CONFIG_FILE_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| manifest_dir.join(DEFAULT_CONFIG_FILE));

        let config = Self::from_file(&file)?.with_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = toml::from_str(&content)
                    .with_context(|| format!("Invalid config file {}", path.display()))?;
                config
                    .validate()
                    .with_context(|| format!("Invalid config file {}", path.display()))?;
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Can't read config file {}", path.display())),
        }
    }

    /// Rejects zero intervals, which would stall the background tasks.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.save_interval_secs > 0, "save_interval_secs must be at least 1");
        ensure!(self.sweep_interval_secs > 0, "sweep_interval_secs must be at least 1");
        ensure!(self.stale_timeout_secs > 0, "stale_timeout_secs must be at least 1");
        Ok(())
    }

    /// Applies `DATABASE_PATH` and `BIND_ADDR` on top of the file values.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = addr;
        }
        self
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_secs)
    }
}

/// Load the API config using the calling crate's manifest directory.
#[macro_export]
macro_rules! load_api_config {
    () => {
        $crate::config::ApiConfig::load(std::path::Path::new(env!("CARGO_MANIFEST_DIR")))
    };
}
