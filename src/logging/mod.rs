// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logging setup for kvu-proxy.
//!
//! Every module logs through the `log` facade, usually via the context macros
//! in [`wrapper`] (`info_fmt!("Server", "...")`). Which backend receives the
//! records is decided once, at start-up:
//!
//! - **env_logger** (default): human readable, filtered by `RUST_LOG`.
//! - **slog** (`logging.structured = true`): terminal or JSON drain behind
//!   `slog-async`, installed as the `slog-scope` global logger with
//!   `slog-stdlog` forwarding `log` records into it.

pub mod access;
pub mod config;
pub mod structured;
pub mod wrapper;

#[cfg(test)]
pub(crate) mod test_logger;

use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use once_cell::sync::OnceCell;
use slog_scope::GlobalLoggerGuard;

pub use access::AccessLog;
pub use config::LoggingConfig;

static INIT: Once = Once::new();
static USING_STRUCTURED: AtomicBool = AtomicBool::new(false);
static GLOBAL_GUARD: OnceCell<GlobalLoggerGuard> = OnceCell::new();

/// Initialise the default `env_logger` backend.
pub fn init(level: Option<LevelFilter>) {
    init_with_config(level.unwrap_or(LevelFilter::Info), &LoggingConfig::default());
}

/// Initialise logging from configuration.
///
/// Only the first call has any effect. A logger installed by someone else
/// (a test harness, an embedding application) is left in place.
pub fn init_with_config(level: LevelFilter, config: &LoggingConfig) {
    INIT.call_once(|| {
        if config.structured {
            init_structured(level, config);
        } else {
            init_env_logger(level);
        }
    });
}

/// True once the slog backend has been installed.
pub fn is_structured() -> bool {
    USING_STRUCTURED.load(Ordering::SeqCst)
}

fn init_env_logger(level: LevelFilter) {
    let env = env_logger::Env::default().filter_or("RUST_LOG", level_name(level));

    let installed = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_target(true)
        .try_init();

    match installed {
        Ok(()) => log::info!("Logging initialized at level: {}", log::max_level()),
        Err(e) => eprintln!("kvu-proxy: logger already installed: {e}"),
    }
}

fn init_structured(level: LevelFilter, config: &LoggingConfig) {
    let logger = structured::create_logger(&config.to_logger_config());
    let guard = slog_scope::set_global_logger(logger);
    let _ = GLOBAL_GUARD.set(guard);

    let bridged = match level.to_level() {
        Some(l) => slog_stdlog::init_with_level(l),
        None => slog_stdlog::init(),
    };

    match bridged {
        Ok(()) => {
            log::set_max_level(level);
            USING_STRUCTURED.store(true, Ordering::SeqCst);
            log::info!("Structured logging initialized at level: {}", level);
        }
        Err(e) => eprintln!("kvu-proxy: logger already installed: {e}"),
    }
}

fn level_name(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Trace => "trace",
        LevelFilter::Debug => "debug",
        LevelFilter::Info => "info",
        LevelFilter::Warn => "warn",
        LevelFilter::Error => "error",
        LevelFilter::Off => "off",
    }
}
