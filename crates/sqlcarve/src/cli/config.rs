//! Run configuration parsing
//!
//! Reads carving defaults from `~/.sqlcarve/config.toml` (or `$SQLCARVE_HOME`).
//! Command-line flags override every value.

use crate::cli::error::HelpfulError;
use serde::{Deserialize, Serialize};
use sqlcarve_engine::Scenario;
use std::path::{Path, PathBuf};

/// Config file name under the sqlcarve home directory
pub const CONFIG_FILE: &str = "config.toml";

/// Error type for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("Config already exists at: {0}")]
    AlreadyExists(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Carving defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Worker threads per pass (0 = available parallelism)
    #[serde(default)]
    pub threads: usize,

    /// Scenario numbers to carve
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<u8>,

    /// Only keep records with a value containing this text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,

    /// Output target (sqlite://..., csv://... or a path)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Also carve tables without trailing DEFAULT columns
    #[serde(default)]
    pub legacy_variants: bool,

    /// Commit records delivered before an interrupt
    #[serde(default = "default_keep_partial")]
    pub keep_partial: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            scenarios: default_scenarios(),
            keyword: None,
            output: None,
            legacy_variants: false,
            keep_partial: default_keep_partial(),
        }
    }
}

fn default_scenarios() -> Vec<u8> {
    Scenario::ALL.iter().map(|s| s.index()).collect()
}

fn default_keep_partial() -> bool {
    true
}

/// Resolve scenario numbers, sorted and without duplicates.
pub fn parse_scenarios(values: &[u8]) -> std::result::Result<Vec<Scenario>, HelpfulError> {
    let mut scenarios = values
        .iter()
        .map(|&v| Scenario::from_index(v).ok_or_else(|| HelpfulError::invalid_scenario(v)))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    scenarios.sort();
    scenarios.dedup();
    Ok(scenarios)
}

/// Default config location
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(sqlcarve_logging::sqlcarve_home()?.join(CONFIG_FILE))
}

/// Load a run config; a missing file yields the defaults.
pub fn load_run_config(config_path: &Path) -> Result<RunConfig> {
    if !config_path.exists() {
        return Ok(RunConfig::default());
    }

    let content = std::fs::read_to_string(config_path)?;
    Ok(toml::from_str(&content)?)
}

/// Write a run config, refusing to replace an existing file unless `force`.
pub fn save_run_config(config_path: &Path, config: &RunConfig, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        return Err(ConfigError::AlreadyExists(
            config_path.display().to_string(),
        ));
    }
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(config_path, toml::to_string_pretty(config)?)?;
    Ok(())
}

/// Arguments for the config command
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Config file (defaults to ~/.sqlcarve/config.toml)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Write a config file with the defaults
    #[arg(long)]
    pub init: bool,

    /// Replace an existing file with --init
    #[arg(long, requires = "init")]
    pub force: bool,

    /// Print the effective config as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the config command
pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    let path = match args.path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if args.init {
        save_run_config(&path, &RunConfig::default(), args.force)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let config = load_run_config(&path)?;
    if args.json {
        let payload = serde_json::json!({
            "path": path.to_string_lossy(),
            "exists": path.exists(),
            "config": config,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("SQLCARVE CONFIGURATION");
        println!("======================");
        println!();
        println!(
            "File:     {} ({})",
            path.display(),
            if path.exists() { "exists" } else { "defaults" }
        );
        println!();
        print!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.threads, 0);
        assert_eq!(config.scenarios, vec![0, 1, 2, 3, 4, 5]);
        assert!(config.keep_partial);
        assert!(!config.legacy_variants);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let config = load_run_config(&temp.path().join("config.toml")).unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_load_partial_config() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
            threads = 4
            scenarios = [0, 2]
            keyword = "invoice"
            "#,
        )
        .unwrap();

        let config = load_run_config(&config_path).unwrap();
        assert_eq!(config.threads, 4);
        assert_eq!(config.scenarios, vec![0, 2]);
        assert_eq!(config.keyword.as_deref(), Some("invoice"));
        // Defaults should still work
        assert!(config.keep_partial);
        assert_eq!(config.output, None);
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("nested").join("config.toml");
        let config = RunConfig {
            output: Some("csv://out".to_string()),
            legacy_variants: true,
            ..RunConfig::default()
        };
        save_run_config(&config_path, &config, false).unwrap();
        assert_eq!(load_run_config(&config_path).unwrap(), config);

        let err = save_run_config(&config_path, &config, false).unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyExists(_)));
        save_run_config(&config_path, &RunConfig::default(), true).unwrap();
    }

    #[test]
    fn test_invalid_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        std::fs::write(&config_path, "threads = \"many\"").unwrap();
        assert!(matches!(
            load_run_config(&config_path),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_parse_scenarios() {
        let scenarios = parse_scenarios(&[3, 0, 3]).unwrap();
        assert_eq!(
            scenarios,
            vec![Scenario::Intact, Scenario::LengthAndRowidOverwritten]
        );
        assert!(parse_scenarios(&[6]).is_err());
    }
}
