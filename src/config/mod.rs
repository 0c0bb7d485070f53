//! Configuration loading.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `config/default.{toml,yaml,json,...}` in the working directory (optional)
//! 3. environment variables prefixed `LIVELOG`, nested with `__`,
//!    e.g. `LIVELOG_SERVER__PORT=9000`. A `.env` file is loaded first.

mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, LogSettings, PartialSettings, ServerSettings, Settings};

pub const ENV_PREFIX: &str = "LIVELOG";

pub fn load_config() -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();

    let config = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    Ok(partial.merge(Settings::default()))
}

impl Settings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
