use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => bail!("unknown log format {other:?} (expected text or json)"),
        }
    }
}

// Gatekeeper configuration sourced from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct GatekeeperConfig {
    pub cache_max_entries: usize,
    pub manifest: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            manifest: None,
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GatekeeperConfigOverride {
    cache_max_entries: Option<usize>,
    manifest: Option<PathBuf>,
    log_format: Option<String>,
}

impl GatekeeperConfig {
    pub fn from_env() -> Result<Self> {
        let cache_max_entries = match std::env::var("WARDEN_CACHE_MAX_ENTRIES") {
            Ok(value) => value
                .trim()
                .parse::<usize>()
                .with_context(|| "parse WARDEN_CACHE_MAX_ENTRIES")?,
            Err(_) => DEFAULT_CACHE_MAX_ENTRIES,
        };
        let manifest = std::env::var("WARDEN_MANIFEST").ok().map(PathBuf::from);
        let log_format = match std::env::var("WARDEN_LOG_FORMAT") {
            Ok(value) => value
                .parse::<LogFormat>()
                .with_context(|| "parse WARDEN_LOG_FORMAT")?,
            Err(_) => LogFormat::Text,
        };
        Ok(Self {
            cache_max_entries,
            manifest,
            log_format,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("WARDEN_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read WARDEN_CONFIG: {path}"))?;
            let override_cfg: GatekeeperConfigOverride = serde_yaml::from_str(&contents)
                .with_context(|| "parse gatekeeper config yaml")?;
            if let Some(value) = override_cfg.cache_max_entries {
                config.cache_max_entries = value;
            }
            if let Some(value) = override_cfg.manifest {
                config.manifest = Some(value);
            }
            if let Some(value) = override_cfg.log_format {
                config.log_format = value
                    .parse::<LogFormat>()
                    .with_context(|| "parse log_format")?;
            }
        }
        Ok(config)
    }
}
