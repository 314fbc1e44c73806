// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serverless-function adapter.
//!
//! A function platform routes one path to one handler and invokes it once per
//! request, so [`ProxyFunction::on_request`] ignores the path and gates on
//! method alone:
//!
//! - `OPTIONS` → 204 preflight
//! - `POST`    → relay
//! - anything else → 405 `{"error":"Method not allowed."}`

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, Response};

use super::{HttpHandler, contain_panics, error_response, preflight_response, relay_json_body};
use crate::core::{ProxyCore, ProxyError};
use crate::debug_fmt;

/// Single-invocation entry point.
#[derive(Debug, Clone)]
pub struct ProxyFunction {
    core: Arc<ProxyCore>,
}

impl ProxyFunction {
    pub fn new(core: Arc<ProxyCore>) -> Self {
        Self { core }
    }

    /// Handle one invocation. Panics inside the relay become a 500.
    pub async fn on_request(&self, request: Request<Bytes>) -> Response<Bytes> {
        let this = self.clone();
        contain_panics(async move { this.dispatch(request).await }).await
    }

    async fn dispatch(&self, request: Request<Bytes>) -> Response<Bytes> {
        let method = request.method().clone();
        debug_fmt!("ProxyFunction", "{} {}", method, request.uri().path());

        match method {
            Method::OPTIONS => preflight_response(),
            Method::POST => relay_json_body(&self.core, request.body()).await,
            other => error_response(ProxyError::MethodNotAllowed(other)),
        }
    }
}

#[async_trait]
impl HttpHandler for ProxyFunction {
    async fn call(&self, request: Request<Bytes>) -> Response<Bytes> {
        self.on_request(request).await
    }
}
