// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host adapters.
//!
//! Each adapter binds [`ProxyCore`](crate::core::ProxyCore) to one hosting
//! shape and owns everything the core does not: method gating, JSON body
//! parsing, CORS and writing the response back.
//!
//! | adapter | host shape | preflight | 405 |
//! |---------|------------|-----------|-----|
//! | [`function`]   | one call per request, platform routes | yes | yes |
//! | [`app`]        | axum router                           | generic CORS layer | yes |
//! | [`middleware`] | chain inside the dev server           | `CorsMiddleware` | pass-through |
//!
//! The helpers below are shared so the three never disagree on headers.

pub mod app;
pub mod function;
pub mod middleware;

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use serde_json::json;

use crate::core::{ProxyCore, ProxyError, ProxyRequest, ProxyResult};

/// Largest request body any host buffers; bigger bodies get 413.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// A host-independent request handler over fully buffered bodies.
///
/// The dev and function hosts in [`crate::server`] serve any implementor.
#[async_trait]
pub trait HttpHandler: fmt::Debug + Send + Sync {
    /// Produce the response for one request. Must not fail.
    async fn call(&self, request: Request<Bytes>) -> Response<Bytes>;
}

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_METHODS: &str = "POST, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Content-Type";

/// Stamp the permissive CORS headers, replacing any existing values.
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
}

/// 204 answer to a CORS preflight.
pub fn preflight_response() -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::NO_CONTENT;
    apply_cors(response.headers_mut());
    response
}

/// Write a [`ProxyResult`] into an `http` response with CORS headers.
pub fn into_response(result: ProxyResult) -> Response<Bytes> {
    let mut response = Response::new(result.body.into_bytes());
    *response.status_mut() = result.status;
    *response.headers_mut() = result.headers;
    apply_cors(response.headers_mut());
    response
}

/// JSON error response with CORS headers.
pub fn error_response(error: ProxyError) -> Response<Bytes> {
    into_response(error.into_result())
}

/// `{"status":"ok"}` for health probes.
pub fn health_response() -> Response<Bytes> {
    into_response(ProxyResult::json(StatusCode::OK, &json!({ "status": "ok" })))
}

/// Parse a proxy request body and run it through the core.
///
/// Malformed JSON short-circuits with 400 `Invalid JSON`; the core is not
/// called.
pub async fn relay_json_body(core: &ProxyCore, body: &[u8]) -> Response<Bytes> {
    match ProxyRequest::from_json(body) {
        Ok(request) => into_response(core.handle(request.url.as_deref()).await),
        Err(e) => {
            crate::warn_fmt!("Adapter", "{}", e);
            error_response(e)
        }
    }
}

/// Run `work` on its own task so a panic inside it becomes a 500.
pub async fn contain_panics<F>(work: F) -> Response<Bytes>
where
    F: Future<Output = Response<Bytes>> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(response) => response,
        Err(e) => {
            crate::error_fmt!("Adapter", "request handler aborted: {}", e);
            error_response(ProxyError::Internal(e.to_string()))
        }
    }
}
