// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deterministic fetcher for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};

use super::{FetchError, UpstreamFetcher, UpstreamResponse};

#[derive(Debug)]
enum Reply {
    Response(UpstreamResponse),
    Unreachable(String),
    Panic,
}

/// Replies with one canned answer and counts calls.
#[derive(Debug)]
pub struct StubFetcher {
    reply: Reply,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn respond(status: u16, content_type: Option<&'static str>, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        let status = StatusCode::from_u16(status).unwrap();
        Self::with_reply(Reply::Response(UpstreamResponse::new(
            status,
            headers,
            body.into(),
        )))
    }

    pub fn html(body: &'static str) -> Self {
        Self::respond(200, Some("text/html"), body)
    }

    pub fn unreachable(message: &str) -> Self {
        Self::with_reply(Reply::Unreachable(message.to_string()))
    }

    /// Panics inside `fetch`, for exercising adapter panic handling.
    pub fn panicking() -> Self {
        Self::with_reply(Reply::Panic)
    }

    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<UpstreamResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());

        match &self.reply {
            Reply::Response(r) => Ok(r.clone()),
            Reply::Unreachable(m) => Err(FetchError::Other(m.clone())),
            Reply::Panic => panic!("stub fetcher asked to panic"),
        }
    }
}
