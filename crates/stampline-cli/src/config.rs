//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use stampline_core::{DEFAULT_IDENTITY_COLUMN, RunConfig};
use stampline_dataset::ContrastConfig;
use stampline_gemini::GeminiConfig;

/// Global configuration for stampline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub run: RunConfig,
    pub gemini: GeminiConfig,
    pub command: CommandConfig,
    pub scan: ScanConfig,
    pub contrast: ContrastConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: PathBuf,
    pub identity_column: String,
    /// Directory identities are relative to
    pub root: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stamps.csv"),
            identity_column: DEFAULT_IDENTITY_COLUMN.to_string(),
            root: PathBuf::from("."),
        }
    }
}

/// Local vision-to-text program
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub program: Option<String>,
    pub args: Vec<String>,
    /// Label for logs and the run journal (default: program file name)
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Image folder, relative to the data root
    pub images: PathBuf,
    /// Empty columns created with a new ledger
    pub columns: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            images: PathBuf::from("data/stamps"),
            columns: Vec::new(),
        }
    }
}

/// Expand `${VAR}` to the environment variable's value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Search order:
    /// 1. ./stampline.toml
    /// 2. ~/.config/stampline/config.toml
    ///
    /// Defaults when neither exists.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("stampline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "stampline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.gemini.api_key = config.gemini.api_key.and_then(|k| expand_env_var(&k));
        Ok(config)
    }

    /// Ledger path as configured, resolved against the data root when relative
    pub fn ledger_path(&self) -> PathBuf {
        if self.ledger.path.is_absolute() {
            self.ledger.path.clone()
        } else {
            self.ledger.root.join(&self.ledger.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.ledger.identity_column, "path");
        assert_eq!(config.ledger_path(), PathBuf::from("./stamps.csv"));
        assert_eq!(config.run.max_retries_per_row, 3);
        assert_eq!(config.contrast.output_segment, "bw-stamps");
    }

    #[test]
    fn expand_env_var_literal_and_missing() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_STAMPLINE_1}"), None);
    }

    #[test]
    fn expand_env_var_set() {
        let Ok(path) = std::env::var("PATH") else {
            return;
        };
        assert_eq!(expand_env_var("${PATH}"), Some(path));
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[ledger]
path = "presentation/data/stamps.csv"
root = "/srv/stamps"

[run]
target_column = "GEM.FLASH2.5"
end_index = 100
base_delay_seconds = 5.0

[gemini]
api_key = "${NONEXISTENT_VAR_STAMPLINE_2}"
model = "gemini-2.0-flash"

[command]
program = "trocr"
args = ["--model", "printed"]

[contrast]
threshold = 140
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(
            config.ledger_path(),
            PathBuf::from("/srv/stamps/presentation/data/stamps.csv")
        );
        assert_eq!(config.run.target_column, "GEM.FLASH2.5");
        assert_eq!(config.run.end_index, Some(100));
        assert_eq!(config.run.max_retries_per_row, 3);
        assert_eq!(config.gemini.api_key, None);
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.command.args, ["--model", "printed"]);
        assert_eq!(config.contrast.threshold, 140);
        assert_eq!(config.contrast.factor, 2.5);
    }

    #[test]
    fn unknown_types_rejected() {
        assert!(Config::from_toml("[run]\nmax_retries_per_row = \"three\"\n").is_err());
    }
}
