// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration subsystem.
//!
//! Settings come from an ordered list of [`ConfigProvider`]s; later providers
//! override earlier ones. The stack built by the loader is:
//!
//! 1. `FileConfigProvider` – `kvu-proxy.{toml,json,yaml}` (optional)
//! 2. `EnvConfigProvider`  – `KVU_SERVER_PORT=8080` → `server.port`
//!
//! | key | type | default | description |
//! |-----|------|---------|-------------|
//! | `server.host` | string | `127.0.0.1` | Address to bind |
//! | `server.port` | u16    | `3000`      | Port to bind |
//! | `server.mode` | `app` / `dev` / `function` | `app` | Which host runs |
//! | `proxy.path`  | string | `/api/proxy` | Path the relay is mounted on |
//! | `logging`     | object | see [`LoggingConfig`](crate::logging::LoggingConfig) | Logging backend |
//!
//! [`Settings::from_config`] reads all of them in one go.

mod env;
pub mod error;
mod file;
mod settings;


pub use env::{DEFAULT_ENV_PREFIX, EnvConfigProvider};
pub use error::ConfigError;
pub use file::{FileConfigProvider, FileFormat};
pub use settings::{DEFAULT_PROXY_PATH, ProxySettings, Settings};

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// A source of configuration values addressed by dotted keys
/// (`server.port`). Object safe; typed access lives in [`ConfigProviderExt`].
pub trait ConfigProvider: Debug + Send + Sync {
    fn has(&self, key: &str) -> bool;

    /// Short name used in logs and error messages (`file`, `env`).
    fn provider_name(&self) -> &str;

    /// The value for `key` as JSON, or `None` when this provider lacks it.
    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError>;
}

/// Typed reads straight from a single provider.
pub trait ConfigProviderExt: ConfigProvider {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get_raw(key)?
            .map(|value| decode(self.provider_name(), key, value))
            .transpose()
    }
}

impl<T: ConfigProvider> ConfigProviderExt for T {}

fn decode<T: DeserializeOwned>(source: &str, key: &str, value: Value) -> Result<T, ConfigError> {
    serde_json::from_value(value)
        .map_err(|e| ConfigError::ParseError(format!("{source}: invalid value for '{key}': {e}")))
}

/// Collects providers, lowest priority first.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard stack: an optional file, overridden by environment
    /// variables with `env_prefix` when one is given.
    pub fn layered(file_path: Option<&str>, env_prefix: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Self::new();
        if let Some(path) = file_path {
            builder = builder.with_provider(FileConfigProvider::new(path)?);
        }
        if let Some(prefix) = env_prefix {
            builder = builder.with_provider(EnvConfigProvider::new(prefix));
        }
        Ok(builder)
    }

    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Add a provider that is already shared.
    pub fn with_shared_provider(mut self, provider: Arc<dyn ConfigProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(self) -> Config {
        Config {
            providers: self.providers,
        }
    }
}

/// An ordered provider stack. The last provider holding a key wins.
#[derive(Debug, Clone)]
pub struct Config {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Read `key` from the highest-priority provider that has it.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        let Some(provider) = self.providers.iter().rev().find(|p| p.has(key)) else {
            return Ok(None);
        };

        provider
            .get_raw(key)?
            .map(|value| decode(provider.provider_name(), key, value))
            .transpose()
    }

    pub fn get_or_default<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Names of the providers, lowest priority first.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.provider_name().to_string())
            .collect()
    }
}
