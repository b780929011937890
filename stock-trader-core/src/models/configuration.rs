//! Configuration data structures

use crate::workflow::cadence::Cadence;
use crate::workflow::persistence::DEFAULT_JOURNAL_RETENTION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Logging level configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogLevel {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "info")]
    #[default]
    Info,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "trace")]
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Logging verbosity level
    pub log_level: LogLevel,
    /// Cron-like trigger cadence (minute granularity)
    pub schedule: String,
    /// JSON file holding recorded transactions
    pub transaction_store_path: PathBuf,
    /// JSON file holding the execution journal
    pub journal_path: PathBuf,
    /// Finished executions kept in the journal before the oldest are pruned
    pub journal_retention: usize,
    /// Lowest price the simulated market quotes
    pub min_price: u32,
    /// Highest price the simulated market quotes
    pub max_price: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            log_level: LogLevel::Info,
            schedule: "* * * * *".to_string(), // every minute
            transaction_store_path: data_dir.join("transactions.json"),
            journal_path: data_dir.join("journal.json"),
            journal_retention: DEFAULT_JOURNAL_RETENTION,
            min_price: 0,
            max_price: 100,
        }
    }
}

impl Configuration {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Configuration = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Return default configuration if file doesn't exist
            Ok(Configuration::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn default_config_path() -> anyhow::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("stock-trader").join("config.toml"))
    }

    /// Parsed trigger cadence
    pub fn cadence(&self) -> Result<Cadence, crate::error::CadenceError> {
        self.schedule.parse()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.cadence() {
            errors.push(format!("schedule is invalid: {}", e));
        }

        if self.max_price == 0 {
            errors.push("max_price must be greater than 0".to_string());
        }

        if self.min_price > self.max_price {
            errors.push("min_price cannot exceed max_price".to_string());
        }

        if self.journal_retention == 0 {
            errors.push("journal_retention must be greater than 0".to_string());
        }

        if self.transaction_store_path.as_os_str().is_empty() {
            errors.push("transaction_store_path cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn default_data_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".stock-trader")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();
        assert_eq!(config.schedule, "* * * * *");
        assert_eq!(config.min_price, 0);
        assert_eq!(config.max_price, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_journal_retention_defaults_and_validation() {
        let config: Configuration = toml::from_str("max_price = 60\n").unwrap();
        assert_eq!(config.journal_retention, DEFAULT_JOURNAL_RETENTION);

        let config = Configuration {
            journal_retention: 0,
            ..Configuration::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("journal_retention")));
    }

    #[test]
    fn test_configuration_validation() {
        let config = Configuration {
            schedule: "every minute".to_string(),
            min_price: 80,
            max_price: 20,
            ..Configuration::default()
        };

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("schedule")));
        assert!(errors.iter().any(|e| e.contains("min_price")));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Configuration = toml::from_str("log_level = \"debug\"\nmax_price = 60\n").unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.max_price, 60);
        assert_eq!(config.schedule, "* * * * *");
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = Configuration {
            schedule: "*/5 * * * *".to_string(),
            journal_path: temp_dir.path().join("journal.json"),
            ..Configuration::default()
        };

        config.save_to_file(&config_path).unwrap();
        assert!(config_path.exists());

        let loaded = Configuration::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.schedule, "*/5 * * * *");
        assert_eq!(loaded.journal_path, temp_dir.path().join("journal.json"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = tempdir().unwrap();
        let loaded = Configuration::load_from_file(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.max_price, 100);
    }
}
