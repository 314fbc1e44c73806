// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared helpers for the kvu-proxy integration tests.

use kvu_proxy::config::{ConfigError, ConfigProvider};
use kvu_proxy::upstream::USER_AGENT;
use kvu_proxy::{HttpFetcher, KvuProxy, LoaderError};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use wiremock::MockServer;

/// Test configuration provider for consistent test setups
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct TestConfigProvider {
    values: HashMap<String, Value>,
    name: String,
}

#[allow(dead_code)]
impl TestConfigProvider {
    /// Provider with the relay defaults spelled out.
    pub fn new(name: &str) -> Self {
        let mut values = HashMap::new();
        values.insert(
            "server.host".to_string(),
            Value::String("127.0.0.1".to_string()),
        );
        values.insert("server.port".to_string(), Value::Number(3000.into()));
        values.insert("server.mode".to_string(), Value::String("app".to_string()));
        values.insert(
            "proxy.path".to_string(),
            Value::String("/api/proxy".to_string()),
        );

        Self {
            values,
            name: name.to_string(),
        }
    }

    /// Provider built from a JSON document.
    pub fn from_json(config: Value) -> Self {
        let mut values = HashMap::new();
        Self::flatten_json(&config, "", &mut values);

        Self {
            values,
            name: "json-config".to_string(),
        }
    }

    /// Flatten JSON into dot-notation keys
    fn flatten_json(value: &Value, prefix: &str, values: &mut HashMap<String, Value>) {
        match value {
            Value::Object(obj) => {
                for (key, val) in obj {
                    let new_key = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };

                    match val {
                        Value::Object(_) => Self::flatten_json(val, &new_key, values),
                        _ => {
                            values.insert(new_key, val.clone());
                        }
                    }
                }
            }
            _ => {
                values.insert(prefix.to_string(), value.clone());
            }
        }
    }

    /// Add a configuration value
    pub fn with_value<T: Into<Value>>(mut self, key: &str, value: T) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }
}

impl ConfigProvider for TestConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.values.get(key).cloned())
    }
}

/// A fetcher that resolves knigavuhe.org to the mock upstream.
#[allow(dead_code)]
pub fn fetcher_for(upstream: &MockServer) -> Arc<HttpFetcher> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .resolve("knigavuhe.org", *upstream.address())
        .no_proxy()
        .build()
        .expect("failed to build test client");
    Arc::new(HttpFetcher::with_client(client))
}

/// Upstream URL on the allowed host, served by the mock.
#[allow(dead_code)]
pub fn upstream_url(upstream: &MockServer, path: &str) -> String {
    format!("http://knigavuhe.org:{}{}", upstream.address().port(), path)
}

/// A relay bound to an ephemeral port.
#[allow(dead_code)]
pub struct RunningProxy {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<(), LoaderError>>>,
}

#[allow(dead_code)]
impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop the relay and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .expect("server task panicked")
                .expect("server failed");
        }
    }
}

/// Build a relay in `mode` against `upstream` and start serving it.
#[allow(dead_code)]
pub async fn start_proxy(mode: &str, upstream: &MockServer) -> RunningProxy {
    let provider = TestConfigProvider::new("test").with_value("server.mode", mode);
    start_proxy_with(provider, upstream).await
}

/// Build a relay from `provider` against `upstream` and start serving it.
#[allow(dead_code)]
pub async fn start_proxy_with(provider: TestConfigProvider, upstream: &MockServer) -> RunningProxy {
    let proxy = KvuProxy::loader()
        .with_provider(provider)
        .with_fetcher(fetcher_for(upstream))
        .build()
        .expect("failed to build proxy");

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().expect("no local address");
    let (tx, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        proxy
            .serve(listener, async {
                let _ = rx.await;
            })
            .await
    });

    RunningProxy {
        addr,
        shutdown: Some(tx),
        handle: Some(handle),
    }
}

/// All three host modes.
#[allow(dead_code)]
pub const MODES: [&str; 3] = ["app", "dev", "function"];
