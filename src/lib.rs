// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! kvu-proxy - a narrow, allow-listed relay for knigavuhe.org pages and audio
//!
//! Browsers cannot read the audiobook site directly because of CORS. The
//! relay accepts `POST {"url": "..."}`, checks the URL against a single
//! allowed host, fetches it with a desktop browser identity and returns the
//! body with permissive CORS headers. Text comes back as text, audio and
//! other binaries byte for byte, and failures as `{"error": "..."}`.
//!
//! # Layout
//!
//! - [`core`]: request validation, the allow-list, content classification
//!   and error mapping. Knows nothing about HTTP servers.
//! - [`upstream`]: the [`UpstreamFetcher`] seam and its `reqwest` implementation.
//! - [`adapters`]: three ways to host the core: an axum application, a
//!   middleware chain for development servers and a bare function handler.
//! - [`server`]: the hyper accept loop used by the middleware and function
//!   hosts, with graceful shutdown.
//! - [`client`]: [`ProxyClient`] for calling a running relay.
//! - [`config`] and [`loader`]: layered configuration (file, then `KVU_*`
//!   environment variables) and the builder that wires everything up.
//!
//! # Example
//!
//! ```rust,no_run
//! use kvu_proxy::KvuProxy;
//!
//! # async fn run() -> Result<(), kvu_proxy::LoaderError> {
//! let proxy = KvuProxy::loader()
//!     .with_config_file("config.toml")
//!     .with_env_vars()
//!     .build()?;
//!
//! proxy.start().await
//! # }
//! ```

pub mod adapters;
pub mod client;
pub mod config;
pub mod core;
pub mod loader;
pub mod logging;
pub mod server;
pub mod upstream;

pub use adapters::HttpHandler;
pub use adapters::function::ProxyFunction;
pub use adapters::middleware::{Middleware, MiddlewareChain, MiddlewareError, Outcome};
pub use client::{ClientError, ProxyClient, normalize_url, validate_url};
pub use config::{
    Config, ConfigBuilder, ConfigError, ConfigProvider, ConfigProviderExt, EnvConfigProvider,
    FileConfigProvider, Settings,
};
pub use core::{
    ALLOWED_HOST, AllowList, ContentKind, ProxyBody, ProxyCore, ProxyError, ProxyRequest,
    ProxyResult,
};
pub use loader::{KvuProxy, KvuProxyLoader, LoaderError};
pub use logging::{AccessLog, LoggingConfig};
pub use server::{HostMode, HostServer, ServerConfig, ServerError};
pub use upstream::{FetchError, HttpFetcher, UpstreamFetcher, UpstreamResponse};
