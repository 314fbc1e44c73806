// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level entry point – "turn the key and go".
//!
//! [`KvuProxyLoader`] stacks the configuration providers, initialises logging,
//! builds the [`ProxyCore`] and picks the host for `server.mode`. The result,
//! [`KvuProxy`], binds and serves until shutdown.


use std::env;
use std::future::Future;
use std::sync::Arc;

use log::LevelFilter;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::adapters::function::ProxyFunction;
use crate::adapters::middleware::MiddlewareChain;
use crate::adapters::{HttpHandler, app};
use crate::config::{
    Config, ConfigBuilder, ConfigError, ConfigProvider, DEFAULT_ENV_PREFIX, Settings,
};
use crate::core::{ProxyCore, ProxyError};
use crate::logging::{self, AccessLog};
use crate::server::{self, HostMode, HostServer, ServerError};
use crate::upstream::UpstreamFetcher;
use crate::{debug_fmt, info_fmt};

/// Errors that can occur while assembling or running the proxy.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("proxy error: {0}")]
    ProxyError(#[from] ProxyError),

    #[error("server error: {0}")]
    ServerError(#[from] ServerError),
}

/// Builder for a [`KvuProxy`].
#[derive(Debug, Default)]
pub struct KvuProxyLoader {
    config: Option<Config>,
    config_file_path: Option<String>,
    use_env_vars: bool,
    env_prefix: Option<String>,
    providers: Vec<Arc<dyn ConfigProvider>>,
    fetcher: Option<Arc<dyn UpstreamFetcher>>,
}

impl KvuProxyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a ready-made configuration instead of building one.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Load a JSON, TOML or YAML file as the lowest-priority layer.
    pub fn with_config_file(mut self, file_path: &str) -> Self {
        self.config_file_path = Some(file_path.to_string());
        self
    }

    /// Read `KVU_*` environment variables on top of the file.
    pub fn with_env_vars(mut self) -> Self {
        self.use_env_vars = true;
        self
    }

    /// Read environment variables with a custom prefix.
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.use_env_vars = true;
        self
    }

    /// Add a provider on top of file and environment.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Replace the network fetcher, e.g. with one bound to a test server.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn UpstreamFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Resolve configuration, start logging and build the core.
    pub fn build(self) -> Result<KvuProxy, LoaderError> {
        let config = match self.config {
            Some(config) => config,
            None => {
                let env_prefix = self
                    .use_env_vars
                    .then(|| self.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX));
                let mut builder =
                    ConfigBuilder::layered(self.config_file_path.as_deref(), env_prefix)?;
                for provider in self.providers {
                    builder = builder.with_shared_provider(provider);
                }
                builder.build()
            }
        };

        let settings = Settings::from_config(&config)?;

        let level = match env::var("RUST_LOG_LEVEL").ok().as_deref() {
            Some("trace") => LevelFilter::Trace,
            Some("debug") => LevelFilter::Debug,
            Some("info") => LevelFilter::Info,
            Some("warn") => LevelFilter::Warn,
            Some("error") => LevelFilter::Error,
            _ => settings.logging.level_filter(),
        };
        logging::init_with_config(level, &settings.logging);

        info_fmt!(
            "Startup",
            "kvu-proxy starting: mode={} path={} providers={:?}",
            settings.server.mode,
            settings.proxy.path,
            config.provider_names()
        );

        let core = match self.fetcher {
            Some(fetcher) => ProxyCore::new(fetcher),
            None => ProxyCore::with_http_client()?,
        };

        Ok(KvuProxy {
            config: Arc::new(config),
            settings,
            core: Arc::new(core),
        })
    }
}

/// An assembled proxy, ready to serve.
#[derive(Debug, Clone)]
pub struct KvuProxy {
    config: Arc<Config>,
    settings: Settings,
    core: Arc<ProxyCore>,
}

impl KvuProxy {
    pub fn loader() -> KvuProxyLoader {
        KvuProxyLoader::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn core(&self) -> Arc<ProxyCore> {
        self.core.clone()
    }

    /// The axum application for the app host.
    pub fn router(&self) -> axum::Router {
        app::router_with_access_log(
            self.core.clone(),
            &self.settings.proxy.path,
            self.access_log(),
        )
    }

    /// The buffered handler for the dev or function host; `None` in app mode.
    pub fn handler(&self) -> Option<Arc<dyn HttpHandler>> {
        match self.settings.server.mode {
            HostMode::App => None,
            HostMode::Dev => Some(Arc::new(MiddlewareChain::dev(
                self.core.clone(),
                &self.settings.proxy.path,
            ))),
            HostMode::Function => Some(Arc::new(ProxyFunction::new(self.core.clone()))),
        }
    }

    /// Bind the configured address and serve until Ctrl-C / SIGTERM.
    pub async fn start(&self) -> Result<(), LoaderError> {
        let listener = server::bind(&self.settings.server).await?;
        self.serve(listener, server::shutdown_signal()).await
    }

    /// Serve on `listener` with the configured host until `shutdown` resolves.
    pub async fn serve<S>(&self, listener: TcpListener, shutdown: S) -> Result<(), LoaderError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        match self.handler() {
            None => {
                let addr = listener.local_addr().map_err(ServerError::from)?;
                info_fmt!("Server", "kvu-proxy (app host) listening on http://{}", addr);
                app::serve(listener, self.router(), shutdown).await?;
                info_fmt!("Server", "Shutdown complete");
            }
            Some(handler) => {
                debug_fmt!("Startup", "serving {:?} on the hyper host", handler);
                HostServer::new(self.settings.server.clone(), handler)
                    .with_access_log(self.access_log())
                    .serve(listener, shutdown)
                    .await?;
            }
        }
        Ok(())
    }

    fn access_log(&self) -> AccessLog {
        AccessLog::new(self.settings.logging.clone())
    }
}
