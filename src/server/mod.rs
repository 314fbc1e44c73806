// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Plain hyper host for the dev and function modes.
//!
//! [`HostServer`] owns the listening socket and hands every request to an
//! [`HttpHandler`] with a fully buffered body. Request bodies here are tiny
//! `{"url": ...}` documents, so buffering costs nothing and keeps the
//! handlers transport-free.
//!
//! **Protocol support**
//! Uses `hyper_util::server::conn::auto::Builder`, so the same connection
//! handles both HTTP/1.1 *and* HTTP/2.
//!
//! **Shutdown**
//! When the shutdown future resolves the accept loop stops, every open
//! connection is told to finish its in-flight requests, and the server waits
//! up to [`DRAIN_TIMEOUT`] before cancelling what is left.


use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinSet;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use crate::adapters::{HttpHandler, MAX_BODY_BYTES, error_response};
use crate::core::ProxyError;
use crate::logging::AccessLog;
use crate::{debug_fmt, error_fmt, info_fmt, warn_fmt};

/// How long open connections get to finish after shutdown starts.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Which host shape serves the relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostMode {
    /// axum application with `/health`
    #[default]
    App,
    /// middleware chain, as a dev server would mount it
    Dev,
    /// one function per request, any path
    Function,
}

impl fmt::Display for HostMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostMode::App => "app",
            HostMode::Dev => "dev",
            HostMode::Function => "function",
        };
        f.write_str(name)
    }
}

/// Configuration for the listening socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host shape
    #[serde(default)]
    pub mode: HostMode,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mode: HostMode::default(),
        }
    }
}

/// Errors that stop a host from running.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot install signal handler: {0}")]
    Signal(io::Error),

    #[error("server IO error: {0}")]
    Io(#[from] io::Error),
}

/// Bind `host:port`, resolving names such as `localhost`.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| ServerError::Bind {
            addr: format!("{}:{}", config.host, config.port),
            source,
        })
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error_fmt!("Server", "Ctrl-C handler failed: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn_fmt!("Server", "{}", ServerError::Signal(e));
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info_fmt!("Server", "Received Ctrl-C; initiating graceful shutdown"),
        _ = terminate => info_fmt!("Server", "Received SIGTERM; initiating graceful shutdown"),
    }
}

/// hyper accept loop around a buffered [`HttpHandler`].
#[derive(Debug, Clone)]
pub struct HostServer {
    config: ServerConfig,
    handler: Arc<dyn HttpHandler>,
    access_log: AccessLog,
    /// Shutdown senders for each open connection, keyed by connection number
    shutdown_senders: Arc<RwLock<HashMap<u64, oneshot::Sender<()>>>>,
    next_connection: Arc<AtomicU64>,
}

impl HostServer {
    pub fn new(config: ServerConfig, handler: Arc<dyn HttpHandler>) -> Self {
        Self {
            config,
            handler,
            access_log: AccessLog::default(),
            shutdown_senders: Arc::new(RwLock::new(HashMap::new())),
            next_connection: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the default access log.
    pub fn with_access_log(mut self, access_log: AccessLog) -> Self {
        self.access_log = access_log;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Connections accepted and not yet closed.
    pub async fn open_connections(&self) -> usize {
        self.shutdown_senders.read().await.len()
    }

    /// Bind the configured address and serve until Ctrl-C / SIGTERM.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = bind(&self.config).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve connections from `listener` until `shutdown` resolves.
    pub async fn serve<S>(&self, listener: TcpListener, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        info_fmt!(
            "Server",
            "kvu-proxy ({} host) listening on http://{}",
            self.config.mode,
            addr
        );

        tokio::pin!(shutdown);
        let mut join_set = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accept = listener.accept() => {
                    match accept {
                        Ok((stream, remote_addr)) => self.spawn_connection(&mut join_set, stream, remote_addr).await,
                        Err(e) => error_fmt!("Server", "Accept error: {}", e),
                    }
                }
                Some(res) = join_set.join_next() => log_task_end(res),
            }
        }

        drop(listener);
        self.drain(join_set).await;
        info_fmt!("Server", "Shutdown complete");
        Ok(())
    }

    async fn spawn_connection(
        &self,
        join_set: &mut JoinSet<()>,
        stream: tokio::net::TcpStream,
        remote_addr: SocketAddr,
    ) {
        let handler = self.handler.clone();
        let access_log = self.access_log.clone();
        let (tx, rx) = oneshot::channel();
        let senders = self.shutdown_senders.clone();
        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);

        // registered before the task exists, so its own removal always finds it
        self.shutdown_senders.write().await.insert(id, tx);

        join_set.spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                handle_request(req, handler.clone(), access_log.clone(), remote_addr)
            });

            let mut builder = AutoBuilder::new(TokioExecutor::new());
            builder.http1();
            builder.http2();

            let connection = builder.serve_connection(TokioIo::new(stream), service);
            let mut conn = std::pin::pin!(connection);

            tokio::select! {
                res = &mut conn => log_connection_end(res.map_err(|e| e.to_string()), "closed"),
                _ = rx => {
                    debug_fmt!("Server", "Connection from {} asked to close", remote_addr);
                    conn.as_mut().graceful_shutdown();
                    log_connection_end(conn.await.map_err(|e| e.to_string()), "closed after shutdown signal");
                }
            }

            senders.write().await.remove(&id);
        });
    }

    async fn drain(&self, mut join_set: JoinSet<()>) {
        {
            let mut senders = self.shutdown_senders.write().await;
            info_fmt!("Server", "Signaling {} connection(s) to shut down", senders.len());
            for (_, sender) in senders.drain() {
                let _ = sender.send(());
            }
        }

        let total = join_set.len();
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while let Some(res) = join_set.join_next().await {
                log_task_end(res);
            }
        })
        .await;

        match drained {
            Ok(()) => debug_fmt!("Server", "All {} connection(s) drained", total),
            Err(_) => {
                warn_fmt!(
                    "Server",
                    "Shutdown timed out after {}s, closing remaining connections",
                    DRAIN_TIMEOUT.as_secs()
                );
                join_set.shutdown().await;
            }
        }
    }
}

fn log_task_end(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        if !e.is_cancelled() {
            error_fmt!("Server", "Connection task failed: {}", e);
        }
    }
}

fn log_connection_end(result: Result<(), String>, how: &str) {
    match result {
        Ok(()) => debug_fmt!("Server", "Connection {}", how),
        Err(e) if e.contains("connection closed") || e.contains("connection reset") => {
            debug_fmt!("Server", "Connection {}: {}", how, e)
        }
        Err(e) => error_fmt!("Server", "Connection error: {}", e),
    }
}

/// Buffer the body, run the handler, log and stamp the trace header.
async fn handle_request(
    req: Request<Incoming>,
    handler: Arc<dyn HttpHandler>,
    access_log: AccessLog,
    remote_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let info = access_log.begin(&req, Some(remote_addr));
    let (parts, body) = req.into_parts();

    let mut response = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => {
            handler
                .call(Request::from_parts(parts, collected.to_bytes()))
                .await
        }
        Err(e) if e.is::<LengthLimitError>() => {
            warn_fmt!("Server", "Request body over {} bytes rejected", MAX_BODY_BYTES);
            error_response(ProxyError::PayloadTooLarge(MAX_BODY_BYTES))
        }
        Err(e) => {
            warn_fmt!("Server", "Failed to read request body: {}", e);
            error_response(ProxyError::Internal(e.to_string()))
        }
    };

    access_log.finish(&mut response, &info);
    Ok(response.map(Full::new))
}
