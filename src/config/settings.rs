// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed view over the first-class keys.

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};
use crate::logging::LoggingConfig;
use crate::server::ServerConfig;

/// Where the relay is mounted when nothing else is configured.
pub const DEFAULT_PROXY_PATH: &str = "/api/proxy";

/// Settings for the relay endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxySettings {
    /// Absolute request path, e.g. `/api/proxy`
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    DEFAULT_PROXY_PATH.to_string()
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            path: default_path(),
        }
    }
}

impl ProxySettings {
    /// The path must be absolute, literal and free of query or fragment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.path.starts_with('/') {
            return Err(ConfigError::ParseError(format!(
                "proxy.path must start with '/', got '{}'",
                self.path
            )));
        }
        if self.path.contains(['?', '#', '{', '}', ':', '*']) {
            return Err(ConfigError::ParseError(format!(
                "proxy.path must be a plain path without query, fragment or captures, got '{}'",
                self.path
            )));
        }
        Ok(())
    }
}

/// Everything the loader needs, resolved against the provider stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub server: ServerConfig,
    pub proxy: ProxySettings,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Read and validate all first-class keys, filling in defaults.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let defaults = ServerConfig::default();
        let server = ServerConfig {
            host: config.get_or_default("server.host", defaults.host)?,
            port: config.get_or_default("server.port", defaults.port)?,
            mode: config.get_or_default("server.mode", defaults.mode)?,
        };

        let proxy = ProxySettings {
            path: config.get_or_default("proxy.path", default_path())?,
        };
        proxy.validate()?;

        // flat keys (KVU_LOGGING_LEVEL) refine a `logging` object
        let mut logging: LoggingConfig = config.get_or_default("logging", LoggingConfig::default())?;
        if let Some(structured) = config.get::<bool>("logging.structured")? {
            logging.structured = structured;
        }
        if let Some(level) = config.get::<String>("logging.level")? {
            logging.level = level;
        }
        if let Some(format) = config.get::<String>("logging.format")? {
            logging.format = format;
        }

        Ok(Self {
            server,
            proxy,
            logging,
        })
    }
}
