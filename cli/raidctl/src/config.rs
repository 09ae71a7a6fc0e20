//! CLI configuration.
//!
//! Stored as `config.json` in the platform config directory. Holds the
//! backend URL and the party row labels.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use raidboard_client::config::DEFAULT_API_URL;
use raidboard_grid::defaults::default_parties;
use serde::{Deserialize, Serialize};

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "raidboard", "raidctl")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// Path of the config file.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Backend base URL, including the `/api` prefix.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Party row labels, in display order.
    #[serde(default = "default_parties")]
    pub parties: Vec<String>,
}

fn default_api_url() -> String {
    std::env::var("RAIDBOARD_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            parties: default_parties(),
        }
    }
}

impl Config {
    /// Load config from disk, or return default.
    pub fn load() -> Result<Self> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config from {:?}", path))
    }

    fn parse(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents)?;
        anyhow::ensure!(!config.parties.is_empty(), "party list cannot be empty");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = config_dir()?;
        fs::create_dir_all(&dir)?;

        let path = dir.join(CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config to {:?}", path))
    }
}
