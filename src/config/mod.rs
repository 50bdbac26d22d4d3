mod settings;

use config::{Config, ConfigError, Environment, File};

use crate::config::settings::PartialSettings;

pub use settings::{LockBackend, LockSettings, LogSettings, MqttSettings, Settings};

/// Default location of the configuration file, without extension.
pub const DEFAULT_CONFIG_PATH: &str = "config/default";

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Loads the configuration from `path` (optional, any format the `config`
/// crate recognises by extension) and `NODELINK_*` environment variables,
/// merged over the defaults.
///
/// Environment keys use `__` between section and field, e.g.
/// `NODELINK_MQTT__SERVER` or `NODELINK_LOCK__PURGE_INTERVAL_SECS`.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("NODELINK")
                .prefix_separator("_")
                .separator("__"),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
