// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound side of the relay.
//!
//! [`UpstreamFetcher`] is the one seam between the core and the network. The
//! production implementation, [`HttpFetcher`], wraps a shared
//! [`reqwest::Client`]; tests swap in a stub or point it at a `wiremock`
//! server.
//!
//! The fetcher never enforces a timeout of its own. An unresponsive upstream
//! keeps the call pending until the hosting transport gives up on it.

#[cfg(test)]
pub(crate) mod stub;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use thiserror::Error;

use crate::debug_fmt;

/// Desktop browser identification sent with every upstream request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Network-level failures. Upstream error statuses are *not* errors here.
#[derive(Error, Debug)]
pub enum FetchError {
    /// DNS, connect, TLS or protocol failure.
    #[error("request to upstream failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Anything else a custom fetcher wants to report.
    #[error("{0}")]
    Other(String),
}

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    /// Reason phrase for `status`, empty when the code has none.
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Build a response, deriving the status text from the status code.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        }
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Performs a GET-like request against the upstream origin.
#[async_trait]
pub trait UpstreamFetcher: fmt::Debug + Send + Sync {
    /// Fetch `url` and buffer the whole body.
    ///
    /// Returns `Ok` for every HTTP status; only transport failures are `Err`.
    async fn fetch(&self, url: &str) -> Result<UpstreamResponse, FetchError>;
}

/// [`UpstreamFetcher`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with its own connection pool.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an existing client. The fixed user agent is still set per request.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UpstreamFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<UpstreamResponse, FetchError> {
        debug_fmt!("Upstream", "GET {}", url);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug_fmt!("Upstream", "{} -> {} ({} bytes)", url, status, body.len());

        Ok(UpstreamResponse::new(status, headers, body))
    }
}
