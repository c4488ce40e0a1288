use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides the config file location.
pub const CONFIG_PATH_ENV_VAR: &str = "SQUIRREL_CONFIG";
/// Consumed by the repo layer above the store.
pub const CACHE_PATH_ENV_VAR: &str = "SQUIRREL_CACHE_PATH";
pub const REPO_LIST_ENV_VAR: &str = "SQUIRREL_REPO_LIST";
pub const DEFAULT_REPO_ENV_VAR: &str = "SQUIRREL_DEFAULT_REPO";

fn default_file_count_warning() -> usize {
    5000
}

/// Store config, kept in ~/.squirrel/config.json unless SQUIRREL_CONFIG
/// points elsewhere.
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Regular expressions; a source file whose base name matches any of
    /// them is silently omitted during publish.
    #[serde(default)]
    pub skip_patterns: Vec<String>,
    /// When set, every publish also points `default_pin_name` at the new
    /// version.
    #[serde(default)]
    pub auto_create_default_pin: bool,
    #[serde(default)]
    pub default_pin_name: String,
    /// Publishes storing more files than this log a warning. 0 disables.
    #[serde(default = "default_file_count_warning")]
    pub file_count_warning: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            skip_patterns: Vec::new(),
            auto_create_default_pin: false,
            default_pin_name: String::new(),
            file_count_warning: default_file_count_warning(),
        }
    }
}

impl Config {
    /// Compile the skip patterns. A pattern that fails to compile is
    /// logged and dropped rather than failing the whole publish.
    pub fn compiled_skip_patterns(&self) -> Vec<Regex> {
        let mut compiled = Vec::with_capacity(self.skip_patterns.len());
        for pattern in &self.skip_patterns {
            match Regex::new(pattern) {
                Ok(re) => compiled.push(re),
                Err(e) => tracing::warn!("ignoring bad skip pattern {:?}: {}", pattern, e),
            }
        }
        compiled
    }
}

pub fn squirrel_home() -> PathBuf {
    dirs::home_dir()
        .expect("home dir must exist")
        .join(".squirrel")
}

/// Path of the active config file: $SQUIRREL_CONFIG when set, else the
/// default under the squirrel home.
pub fn config_path() -> PathBuf {
    match std::env::var(CONFIG_PATH_ENV_VAR) {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => squirrel_home().join("config.json"),
    }
}

pub fn read_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text).unwrap_or_default())
}

pub fn write_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(config)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
