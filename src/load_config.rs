use crate::config::ClientConfig;
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Environment variable that overrides `output_dir` from any config file.
pub const OUTPUT_DIR_ENV: &str = "SMOLDER_OUTPUT_DIR";

/// Loads a YAML client config. Missing keys fall back to their defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ClientConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty document deserializes to unit rather than a map.
    if config_content.trim().is_empty() {
        return Ok(apply_env_overrides(ClientConfig::default()));
    }

    let config: ClientConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    Ok(apply_env_overrides(config))
}

/// Loads `path` when given, otherwise starts from the defaults.
pub fn resolve_config(path: Option<&Path>) -> Result<ClientConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(apply_env_overrides(ClientConfig::default())),
    }
}

fn apply_env_overrides(mut config: ClientConfig) -> ClientConfig {
    if let Ok(dir) = std::env::var(OUTPUT_DIR_ENV) {
        if !dir.trim().is_empty() {
            info!(output_dir = %dir, "Output directory overridden from environment");
            config.output_dir = PathBuf::from(dir);
        }
    }
    config
}
