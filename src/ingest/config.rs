use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Optional TOML configuration; command-line flags take precedence.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub database_url: Option<String>,
    pub srid: Option<u32>,
    pub tablespace_data: Option<String>,
    pub tablespace_index: Option<String>,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }
}
