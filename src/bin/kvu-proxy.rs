// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal CLI wrapper so the relay can run stand-alone.
//!
//!  Build it with `cargo build --release --bin kvu-proxy`
//!  The binary honours KVU_CONFIG_FILE; without it, defaults and `KVU_*`
//!  environment variables are used.

use std::env;
use std::error::Error;

use kvu_proxy::{KvuProxy, error_fmt, info_fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Base loader always pulls env vars; file path is optional.
    let mut loader = KvuProxy::loader().with_env_vars();
    let file_from_env = env::var("KVU_CONFIG_FILE").ok();
    if let Some(path) = &file_from_env {
        loader = loader.with_config_file(path);
    }

    let proxy = match loader.build() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to build proxy: {e}");
            return Err(e.into());
        }
    };

    if let Some(path) = &file_from_env {
        info_fmt!("Startup", "Using configuration from {}", path);
    }

    match proxy.start().await {
        Ok(()) => {
            info_fmt!("KvuProxy", "Proxy server stopped gracefully");
        }
        Err(e) => {
            error_fmt!("KvuProxy", "Proxy server failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
