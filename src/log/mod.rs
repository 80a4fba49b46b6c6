mod key_value_encoder;

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use log4rs::{
    Config,
    config::{Deserializers, RawConfig},
};

pub use key_value_encoder::{KeyValueEncoder, KeyValueEncoderDeserializer};

pub const EXTERNAL_CONFIG_FILE: &str = "log4rs.yml";

fn deserializers() -> Deserializers {
    let mut deserializers = Deserializers::default();
    deserializers.insert("key_value", KeyValueEncoderDeserializer);
    deserializers
}

/// Initializes logging from `log4rs.yml` in the working directory, or from
/// the embedded defaults when that file does not exist.
pub fn init_logging() -> Result<()> {
    init_logging_from(Path::new(EXTERNAL_CONFIG_FILE))
}

pub fn init_logging_from(path: &Path) -> Result<()> {
    if path.exists() {
        log4rs::init_file(path, deserializers())
            .with_context(|| format!("Failed to load external logging configuration {}", path.display()))?;
        info!(path:% = path.display(); "Logging initialized from external configuration");
        return Ok(());
    }

    let config = embedded_config()?;
    log4rs::init_config(config).context("Failed to initialize logging from embedded config")?;

    debug!("Logging initialized from embedded defaults (no external log4rs.yml found)");
    Ok(())
}

fn embedded_config() -> Result<Config> {
    let yaml_content = include_str!("../../resources/default_log4rs.yml");
    let raw_config: RawConfig =
        serde_yaml::from_str(yaml_content).context("Embedded logging configuration is invalid YAML")?;

    let (appenders, errors) = raw_config.appenders_lossy(&deserializers());
    if !errors.is_empty() {
        return Err(anyhow!("Errors parsing embedded appenders: {:?}", errors));
    }

    Config::builder()
        .appenders(appenders)
        .loggers(raw_config.loggers())
        .build(raw_config.root())
        .context("Failed to build logging config")
}
