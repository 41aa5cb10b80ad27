mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    CacheSettings, LogSettings, MAX_DEBOUNCE_MS, PartialSettings, RefreshSettings,
    ServerSettings, Settings, StoreBackend, StoreSettings,
};

/// Loads the configuration from `config/default` and `LIVEFEED__*` environment
/// variables, then merges whatever was found onto the default values.
///
/// Nested keys use a double underscore, e.g. `LIVEFEED__SERVER__PORT=9000` or
/// `LIVEFEED__REFRESH__DEBOUNCE_MS=500`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("LIVEFEED")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    let settings = Settings::merged(partial);
    settings.validate()?;
    Ok(settings)
}
