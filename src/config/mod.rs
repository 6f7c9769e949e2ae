//! Configuration management for the shared state server and its clients.
//!
//! Settings are layered with increasing priority:
//! 1. Default values (hardcoded)
//! 2. Config file passed by the caller
//! 3. Config file named by the `CONFIG_PATH` environment variable
//! 4. Environment variables (`SHARED_STATE__SECTION__FIELD`, highest priority)

mod client;
mod monitoring;
mod server;
mod session;
pub use client::*;
pub use monitoring::*;
pub use server::*;
pub use session::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "SHARED_STATE";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Store and RPC server parameters
    #[serde(default)]
    pub server: ServerConfig,
    /// Connection parameters used by clients
    #[serde(default)]
    pub client: ClientConfig,
    /// Client session synchronization parameters
    #[serde(default)]
    pub session: SessionConfig,
    /// Metrics and monitoring settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Settings {
    /// Load configuration from all sources and validate it.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a TOML file that overrides defaults
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder();

        if let Some(path) = config_path {
            config = config.add_source(File::with_name(path).required(true));
        }

        if let Ok(path) = env::var("CONFIG_PATH") {
            config = config.add_source(File::with_name(&path).required(false));
        }

        config = config.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.client.validate()?;
        self.session.validate()?;
        self.monitoring.validate()?;
        Ok(())
    }
}
