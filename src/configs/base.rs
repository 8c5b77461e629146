use serde::{Deserialize, Serialize};

use crate::common::types::AnyResult;
use crate::configs::*;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Loads `config.toml` from the working directory. A missing file is
    /// not an error (the defaults match the stock setup); an unparseable
    /// one is fatal.
    pub fn load() -> AnyResult<Self> {
        let path = std::path::Path::new("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let config_str = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }
}
