// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Environment variable-based configuration provider.

use std::collections::HashMap;
use std::env;

use serde_json::{Value, json};

use super::ConfigError;
use super::ConfigProvider;

/// Prefix used when none is given.
pub const DEFAULT_ENV_PREFIX: &str = "KVU_";

/// Configuration provider that reads prefixed environment variables.
///
/// `KVU_SERVER_PORT` is exposed as `server.port`: the prefix is stripped, the
/// rest lowercased and `_` turned into `.`.
#[derive(Debug)]
pub struct EnvConfigProvider {
    prefix: String,
    /// Snapshot of matching variables, keyed by config key.
    cache: HashMap<String, String>,
}

impl EnvConfigProvider {
    pub fn new(prefix: &str) -> Self {
        let mut provider = Self {
            prefix: prefix.to_string(),
            cache: HashMap::new(),
        };
        provider.refresh_cache();
        provider
    }

    /// Re-read the environment.
    pub fn refresh_cache(&mut self) {
        self.cache.clear();

        for (key, value) in env::vars() {
            if let Some(rest) = key.strip_prefix(&self.prefix) {
                let config_key = rest.to_lowercase().replace('_', ".");
                self.cache.insert(config_key, value);
            }
        }
    }

    /// Interpret a raw value as JSON, then bool, then number, then string.
    fn parse_value_to_json(&self, value: &str) -> Value {
        if let Ok(json_value) = serde_json::from_str(value) {
            return json_value;
        }

        if value.eq_ignore_ascii_case("true") {
            return json!(true);
        } else if value.eq_ignore_ascii_case("false") {
            return json!(false);
        }

        if let Ok(int_val) = value.parse::<i64>() {
            return json!(int_val);
        }

        if let Ok(float_val) = value.parse::<f64>() {
            return json!(float_val);
        }

        json!(value)
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new(DEFAULT_ENV_PREFIX)
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    fn provider_name(&self) -> &str {
        "env"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.cache.get(key).map(|v| self.parse_value_to_json(v)))
    }
}
