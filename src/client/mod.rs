// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Client side of the relay.
//!
//! [`ProxyClient`] talks to a running kvu-proxy endpoint the way the player
//! does: POST `{"url": ...}` and read back the page or the audio bytes. A
//! non-success answer is turned into [`ClientError::Proxy`] carrying the
//! relay's `error` message.
//!
//! [`normalize_url`] and [`validate_url`] clean up user-typed book links
//! before they are sent.

use bytes::Bytes;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;

use crate::core::ALLOWED_HOST;
use crate::debug_fmt;

/// Message used when a failed relay response carries no `error` field.
pub const FALLBACK_ERROR: &str = "Proxy request failed";

/// Normalized links must be longer than this to be accepted.
const MIN_URL_LEN: usize = 20;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The relay answered with a non-success status.
    #[error("{message} ({status})")]
    Proxy { status: StatusCode, message: String },

    /// The relay could not be reached, or its body could not be read.
    #[error("request to proxy failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The relayed body was not the JSON the caller asked for.
    #[error("invalid JSON from proxy: {0}")]
    Json(#[from] serde_json::Error),
}

/// Calls a kvu-proxy endpoint.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ProxyClient {
    /// Client for the relay at `endpoint`, e.g. `http://127.0.0.1:3000/api/proxy`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST `url` to the relay and return the successful response.
    pub async fn proxy_request(&self, url: &str) -> Result<reqwest::Response, ClientError> {
        debug_fmt!("ProxyClient", "relaying {} via {}", url, self.endpoint);

        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "url": url }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_owned))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| FALLBACK_ERROR.to_string());

        Err(ClientError::Proxy { status, message })
    }

    /// Fetch a page as text.
    pub async fn fetch_html(&self, url: &str) -> Result<String, ClientError> {
        Ok(self.proxy_request(url).await?.text().await?)
    }

    /// Fetch a document and deserialize it.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        let bytes = self.proxy_request(url).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Download a file (usually audio) as raw bytes.
    pub async fn download_file(&self, url: &str) -> Result<Bytes, ClientError> {
        Ok(self.proxy_request(url).await?.bytes().await?)
    }
}

/// Trim, default the scheme to `https://` and strip trailing slashes.
///
/// Anything already starting with `http` keeps its scheme.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let mut normalized = if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    while normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// True for non-empty links that mention the allowed host and are long
/// enough to point somewhere past the front page.
pub fn validate_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let normalized = normalize_url(url);
    normalized.contains(ALLOWED_HOST) && normalized.len() > MIN_URL_LEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ProxyClient {
        ProxyClient::new(format!("{}/api/proxy", server.uri()))
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("  knigavuhe.org/book/dune/  "),
            "https://knigavuhe.org/book/dune"
        );
        assert_eq!(
            normalize_url("http://knigavuhe.org/book///"),
            "http://knigavuhe.org/book"
        );
        assert_eq!(
            normalize_url("https://knigavuhe.org/book/x"),
            "https://knigavuhe.org/book/x"
        );
        assert_eq!(normalize_url("httpbin.org"), "httpbin.org");
        assert_eq!(normalize_url(""), "https:");
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://knigavuhe.org/book/dune/"));
        assert!(validate_url("knigavuhe.org/book/dune"));
        assert!(!validate_url(""));
        assert!(!validate_url("https://example.com/book/dune"));
        // "https://knigavuhe.org" is 21 chars, so the bare host just passes
        assert!(validate_url("knigavuhe.org"));
        assert!(!validate_url("http://knigavuhe.org"));
    }

    #[tokio::test]
    async fn test_proxy_request_posts_url_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/proxy"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"url": "https://knigavuhe.org/book/1"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>book</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let html = client.fetch_html("https://knigavuhe.org/book/1").await.unwrap();

        assert_eq!(html, "<html>book</html>");
    }

    #[tokio::test]
    async fn test_error_message_comes_from_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({"error": "Only knigavuhe.org URLs are allowed"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        match client.proxy_request("https://example.com").await {
            Err(ClientError::Proxy { status, message }) => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(message, "Only knigavuhe.org URLs are allowed");
            }
            other => panic!("expected proxy error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_without_message_uses_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<h1>oops</h1>"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.download_file("https://knigavuhe.org/a.mp3").await.unwrap_err();

        match err {
            ClientError::Proxy { status, message } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(message, FALLBACK_ERROR);
            }
            other => panic!("expected proxy error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_download_file_returns_bytes() {
        let audio = vec![0x49u8, 0x44, 0x33, 0x00, 0xff];
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(audio.clone(), "audio/mpeg"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let bytes = client.download_file("https://s2.knigavuhe.org/a.mp3").await.unwrap();

        assert_eq!(bytes.as_ref(), audio.as_slice());
    }

    #[tokio::test]
    async fn test_fetch_json() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Track {
            title: String,
            duration: u32,
        }

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"title": "Ch. 1", "duration": 812})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let track: Track = client.fetch_json("https://knigavuhe.org/t.json").await.unwrap();
        assert_eq!(
            track,
            Track {
                title: "Ch. 1".to_string(),
                duration: 812
            }
        );

        let not_a_track = client.fetch_json::<Vec<u8>>("https://knigavuhe.org/t.json").await;
        assert!(matches!(not_a_track, Err(ClientError::Json(_))));
    }

    #[tokio::test]
    async fn test_unreachable_proxy_is_http_error() {
        let client = ProxyClient::new("http://127.0.0.1:9/api/proxy");
        let err = client.fetch_html("https://knigavuhe.org/").await.unwrap_err();
        assert!(matches!(err, ClientError::Http(_)));
    }
}
