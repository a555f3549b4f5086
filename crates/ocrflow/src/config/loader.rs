use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// `<platform config dir>/ocrflow/config.json`, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ocrflow").join("config.json"))
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.python.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "python interpreter must not be empty".to_string(),
        });
    }

    for (stage, script) in [
        ("drive", &config.scripts.drive),
        ("ocr", &config.scripts.ocr),
        ("analysis", &config.scripts.analysis),
    ] {
        if script.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("Script for {} stage must not be empty", stage),
            });
        }
    }

    if config.event_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "event_capacity must be greater than 0".to_string(),
        });
    }

    Ok(())
}
