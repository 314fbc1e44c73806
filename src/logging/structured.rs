// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! slog backend and per-request log context.

use std::io;
use std::time::Instant;

use slog::{Drain, Logger, o};
use slog_async::Async;
use slog_json::Json;
use slog_term::{FullFormat, TermDecorator};
use uuid::Uuid;

/// Structured logging format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable terminal output
    Terminal,
    /// One JSON object per line on stdout
    Json,
}

/// Structured logger configuration
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LogFormat,
    pub level: slog::Level,
    /// Key-value pairs attached to every record
    pub static_fields: Vec<(String, String)>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Terminal,
            level: slog::Level::Info,
            static_fields: Vec::new(),
        }
    }
}

/// Create a root logger for `config`.
pub fn create_logger(config: &LoggerConfig) -> Logger {
    let logger = match config.format {
        LogFormat::Terminal => {
            let decorator = TermDecorator::new().build();
            let drain = FullFormat::new(decorator).build().fuse();
            let drain = drain.filter_level(config.level).fuse();
            Logger::root(Async::new(drain).build().fuse(), o!())
        }
        LogFormat::Json => {
            let drain = Json::new(io::stdout()).add_default_keys().build().fuse();
            let drain = drain.filter_level(config.level).fuse();
            Logger::root(Async::new(drain).build().fuse(), o!())
        }
    };

    with_static_fields(logger, &config.static_fields)
}

fn with_static_fields(mut logger: Logger, fields: &[(String, String)]) -> Logger {
    for (key, value) in fields {
        // slog keys are 'static; this runs once per process
        let key: &'static str = Box::leak(key.clone().into_boxed_str());
        logger = logger.new(o!(key => value.clone()));
    }
    logger
}

/// Generate a new trace ID
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// What the access log knows about a request in flight.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub trace_id: String,
    pub method: String,
    pub path: String,
    pub remote_addr: String,
    pub user_agent: String,
    pub started: Instant,
}

impl RequestInfo {
    /// Request info with a fresh trace id.
    pub fn new(method: String, path: String, remote_addr: String, user_agent: String) -> Self {
        Self {
            trace_id: generate_trace_id(),
            method,
            path,
            remote_addr,
            user_agent,
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    /// Child of `logger` carrying this request's fields.
    pub fn logger(&self, logger: &Logger) -> Logger {
        logger.new(o!(
            "trace_id" => self.trace_id.clone(),
            "method" => self.method.clone(),
            "path" => self.path.clone(),
            "remote_addr" => self.remote_addr.clone(),
            "user_agent" => self.user_agent.clone(),
        ))
    }
}
