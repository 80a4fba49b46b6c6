use std::{fs, fs::File, io::Write, path::Path};

use anyhow::{Context, Result};
use config::{Config, Environment};
use log::info;

use super::ClientConfig;

/// Prefix of environment overrides, e.g. `SERVICE_ACTION_DEFAULTS__RETRY=3`.
pub const ENV_PREFIX: &str = "SERVICE_ACTION";

pub fn get_default_config() -> &'static str {
    include_str!("../../config/config.toml")
}

/// Reads the configuration file at `path` and applies environment overrides.
pub fn load_configuration(path: &Path) -> Result<Config> {
    let filename = path.to_str().context("Invalid config file path")?;

    Config::builder()
        .add_source(config::File::with_name(filename).required(true))
        .add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("_").separator("__"))
        .build()
        .context("Could not build configuration")
}

pub fn write_config_to(path: &Path, source: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create parent directories")?;
    };

    let mut file = File::create(path).context("Failed to create config file")?;
    file.write_all(source.as_bytes())
        .context("Failed to write config content")?;
    file.write_all(b"\n").context("Failed to write newline")?;
    Ok(())
}

impl ClientConfig {
    /// Loads and deserializes the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let cfg = load_configuration(path)?;
        let config: ClientConfig = cfg
            .try_deserialize()
            .with_context(|| format!("Invalid client configuration in {}", path.display()))?;
        info!(
            path:% = path.display(),
            services = config.services.len();
            "Loaded client configuration"
        );
        Ok(config)
    }

    /// Writes the bundled default configuration to `path` if nothing exists
    /// there yet, then loads it.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            write_config_to(path, get_default_config()).context("Could not create default config")?;
            info!(path:% = path.display(); "Created new configuration file");
        }
        Self::load(path)
    }
}
