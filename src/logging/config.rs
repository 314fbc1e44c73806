// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration for logging, read from the `logging` key.

use std::collections::HashMap;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::logging::structured::{LogFormat, LoggerConfig};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Use the slog backend instead of env_logger
    #[serde(default)]
    pub structured: bool,

    /// `terminal` or `json` (structured mode only)
    #[serde(default = "default_format")]
    pub format: String,

    /// Log level
    #[serde(default = "default_level")]
    pub level: String,

    /// Echo the trace id back in a response header
    #[serde(default = "default_true")]
    pub include_trace_id: bool,

    /// Reuse a trace id sent by the client
    #[serde(default = "default_true")]
    pub propagate_trace_id: bool,

    /// Header carrying the trace id
    #[serde(default = "default_trace_header")]
    pub trace_id_header: String,

    /// Fields attached to every structured record
    #[serde(default)]
    pub static_fields: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_format() -> String {
    "terminal".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_trace_header() -> String {
    "X-Trace-ID".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            structured: false,
            format: default_format(),
            level: default_level(),
            include_trace_id: true,
            propagate_trace_id: true,
            trace_id_header: default_trace_header(),
            static_fields: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// `level` as a `log` filter; unknown names fall back to `Info`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.to_lowercase().as_str() {
            "trace" => LevelFilter::Trace,
            "debug" => LevelFilter::Debug,
            "warn" | "warning" => LevelFilter::Warn,
            "error" | "critical" => LevelFilter::Error,
            "off" => LevelFilter::Off,
            _ => LevelFilter::Info,
        }
    }

    /// Convert to the slog logger settings.
    pub fn to_logger_config(&self) -> LoggerConfig {
        let mut static_fields: Vec<(String, String)> = self
            .static_fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        static_fields.sort();

        LoggerConfig {
            format: match self.format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Terminal,
            },
            level: match self.level.to_lowercase().as_str() {
                "trace" => slog::Level::Trace,
                "debug" => slog::Level::Debug,
                "warn" | "warning" => slog::Level::Warning,
                "error" => slog::Level::Error,
                "critical" => slog::Level::Critical,
                _ => slog::Level::Info,
            },
            static_fields,
        }
    }
}
