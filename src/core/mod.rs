// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core primitives – requests, results, errors & the relay itself.
//!
//! [`ProxyCore::handle`] is the whole protocol: validate the URL, check it
//! against the [`AllowList`], fetch it once, classify the body. It never
//! fails; every outcome becomes a [`ProxyResult`]. No transport logic lives
//! here, that sits in `adapters` (request/response shapes) and `server` (IO).

pub mod classify;
pub mod policy;

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::{Value, json};
use thiserror::Error;

use crate::upstream::{FetchError, HttpFetcher, UpstreamFetcher};
use crate::{debug_fmt, error_fmt, warn_fmt};

pub use classify::{Classified, ContentKind, DEFAULT_TEXT_CONTENT_TYPE, classify};
pub use policy::{ALLOWED_HOST, AllowList};

/// Errors that can occur while relaying a request.
///
/// Each variant maps to exactly one HTTP status and one client-facing
/// message; see [`ProxyError::status`] and [`ProxyError::public_message`].
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Request body was not JSON
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    /// `url` missing, empty or not a string
    #[error("missing or invalid url")]
    InvalidUrl,

    /// `url` outside the allow-list
    #[error("url rejected by allow-list: {0}")]
    Forbidden(String),

    /// Upstream answered with a non-2xx status
    #[error("upstream responded {status}")]
    UpstreamStatus {
        status: StatusCode,
        status_text: String,
    },

    /// Upstream could not be reached at all
    #[error("upstream unreachable: {0}")]
    Unreachable(#[from] FetchError),

    /// Request body exceeded the host's buffering limit (bytes)
    #[error("request body larger than {0} bytes")]
    PayloadTooLarge(usize),

    /// Adapter received a method it does not serve
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    /// Anything unanticipated
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidJson(_) | ProxyError::InvalidUrl => StatusCode::BAD_REQUEST,
            ProxyError::Forbidden(_) => StatusCode::FORBIDDEN,
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::UpstreamStatus { status, .. } => *status,
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::Unreachable(_) | ProxyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message placed in the `error` field of the JSON body.
    pub fn public_message(&self) -> String {
        match self {
            ProxyError::InvalidJson(_) => "Invalid JSON".to_string(),
            ProxyError::InvalidUrl => "Invalid URL".to_string(),
            ProxyError::Forbidden(_) => AllowList.rejection_message(),
            ProxyError::UpstreamStatus { status_text, .. } => {
                format!("Failed to fetch: {status_text}")
            }
            ProxyError::Unreachable(e) => format!("Failed to reach upstream: {e}"),
            ProxyError::PayloadTooLarge(_) => "Payload Too Large".to_string(),
            ProxyError::MethodNotAllowed(_) => "Method not allowed.".to_string(),
            ProxyError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Convert into the JSON error result sent to clients.
    pub fn into_result(self) -> ProxyResult {
        ProxyResult::error(self.status(), &self.public_message())
    }
}

/// Parsed adapter input: `{"url": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyRequest {
    /// `None` when absent, `null`, empty or not a string.
    pub url: Option<String>,
}

impl ProxyRequest {
    /// Parse a request body.
    ///
    /// Only malformed JSON is an error. A well-formed body without a usable
    /// `url` yields `url: None`, which the core rejects as an invalid URL.
    pub fn from_json(body: &[u8]) -> Result<Self, ProxyError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| ProxyError::InvalidJson(e.to_string()))?;

        let url = value
            .get("url")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        Ok(Self { url })
    }
}

/// Body of a [`ProxyResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyBody {
    /// UTF-8 text (HTML, JSON, error objects)
    Text(String),
    /// Opaque bytes (audio)
    Binary(Bytes),
}

impl ProxyBody {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ProxyBody::Text(s) => s.as_bytes(),
            ProxyBody::Binary(b) => b,
        }
    }

    /// `Some` only for text bodies.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ProxyBody::Text(s) => Some(s),
            ProxyBody::Binary(_) => None,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            ProxyBody::Text(s) => Bytes::from(s),
            ProxyBody::Binary(b) => b,
        }
    }
}

/// Transport-neutral outcome of [`ProxyCore::handle`].
#[derive(Debug, Clone)]
pub struct ProxyResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ProxyBody,
}

impl ProxyResult {
    /// JSON body with `Content-Type: application/json`.
    pub fn json(status: StatusCode, value: &Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Self {
            status,
            headers,
            body: ProxyBody::Text(value.to_string()),
        }
    }

    /// `{"error": message}`.
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::json(status, &json!({ "error": message }))
    }

    /// The `Content-Type` header, if it is visible ASCII.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Body parsed as JSON, for error results and JSON pages.
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(self.body.as_bytes()).ok()
    }
}

/// The relay: allow-list, one upstream fetch, classification.
///
/// Holds no per-request state. Cloning is cheap and clones share the
/// fetcher (and with it the connection pool).
#[derive(Debug, Clone)]
pub struct ProxyCore {
    fetcher: Arc<dyn UpstreamFetcher>,
    allow_list: AllowList,
}

impl ProxyCore {
    /// Create a core around an injected fetcher.
    pub fn new(fetcher: Arc<dyn UpstreamFetcher>) -> Self {
        Self {
            fetcher,
            allow_list: AllowList,
        }
    }

    /// Create a core that fetches over the network with [`HttpFetcher`].
    pub fn with_http_client() -> Result<Self, ProxyError> {
        let fetcher = HttpFetcher::new().map_err(|e| ProxyError::Internal(e.to_string()))?;
        Ok(Self::new(Arc::new(fetcher)))
    }

    /// Relay `url`. Never fails; errors come back as JSON results.
    pub async fn handle(&self, url: Option<&str>) -> ProxyResult {
        match self.relay(url).await {
            Ok(result) => result,
            Err(e) => {
                match &e {
                    ProxyError::InvalidUrl
                    | ProxyError::InvalidJson(_)
                    | ProxyError::Forbidden(_)
                    | ProxyError::PayloadTooLarge(_)
                    | ProxyError::MethodNotAllowed(_) => warn_fmt!("ProxyCore", "{}", e),
                    ProxyError::UpstreamStatus { .. }
                    | ProxyError::Unreachable(_)
                    | ProxyError::Internal(_) => error_fmt!("ProxyCore", "{}", e),
                }
                e.into_result()
            }
        }
    }

    async fn relay(&self, url: Option<&str>) -> Result<ProxyResult, ProxyError> {
        let url = url.filter(|u| !u.is_empty()).ok_or(ProxyError::InvalidUrl)?;

        if !self.allow_list.is_allowed(Some(url)) {
            return Err(ProxyError::Forbidden(url.to_string()));
        }

        let started = Instant::now();
        let upstream = self.fetcher.fetch(url).await?;

        if !upstream.is_success() {
            return Err(ProxyError::UpstreamStatus {
                status: upstream.status,
                status_text: upstream.status_text,
            });
        }

        let classified = classify(&upstream.headers, upstream.body);

        debug_fmt!(
            "ProxyCore",
            "{} -> {:?} {:?} in {:?}",
            url,
            classified.kind,
            classified.content_type,
            started.elapsed()
        );

        Ok(classified.into_result())
    }
}
