// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Middleware adapter for the dev host.
//!
//! A [`MiddlewareChain`] offers each request to its middlewares in order.
//! Every middleware answers with an [`Outcome`]:
//!
//! - `Handled(response)` ends the chain,
//! - `NotHandled(request)` gives the request back for the next middleware,
//! - `Failed(error)` ends the chain with 500 `{"error":"Internal Server Error"}`.
//!
//! If nobody handles the request the chain answers 404 `{"error":"Not Found"}`.
//! CORS headers are stamped on whatever leaves the chain.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use thiserror::Error;

use super::{
    HttpHandler, apply_cors, contain_panics, health_response, into_response, preflight_response,
    relay_json_body,
};
use crate::core::{ProxyCore, ProxyResult};
use crate::{error_fmt, trace_fmt};

/// Path answered by [`HealthMiddleware`].
pub const HEALTH_PATH: &str = "/health";

/// A middleware that gave up on a request it had claimed.
#[derive(Error, Debug)]
#[error("middleware '{middleware}' failed: {message}")]
pub struct MiddlewareError {
    pub middleware: String,
    pub message: String,
}

impl MiddlewareError {
    pub fn new(middleware: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            middleware: middleware.into(),
            message: message.into(),
        }
    }
}

/// What a middleware did with a request.
#[derive(Debug)]
pub enum Outcome {
    /// Final response; later middlewares never see the request.
    Handled(Response<Bytes>),
    /// Not for this middleware; the request moves on unchanged.
    NotHandled(Request<Bytes>),
    /// Claimed but could not be answered.
    Failed(MiddlewareError),
}

/// One link of a [`MiddlewareChain`].
#[async_trait]
pub trait Middleware: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, request: Request<Bytes>) -> Outcome;
}

/// Relays `POST <path>`; passes everything else through.
#[derive(Debug, Clone)]
pub struct ProxyMiddleware {
    core: Arc<ProxyCore>,
    path: String,
}

impl ProxyMiddleware {
    pub fn new(core: Arc<ProxyCore>, path: impl Into<String>) -> Self {
        Self {
            core,
            path: path.into(),
        }
    }
}

#[async_trait]
impl Middleware for ProxyMiddleware {
    fn name(&self) -> &str {
        "proxy"
    }

    async fn handle(&self, request: Request<Bytes>) -> Outcome {
        if request.method() != Method::POST || request.uri().path() != self.path {
            return Outcome::NotHandled(request);
        }
        Outcome::Handled(relay_json_body(&self.core, request.body()).await)
    }
}

/// Answers every `OPTIONS` request with a 204 preflight.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorsMiddleware;

#[async_trait]
impl Middleware for CorsMiddleware {
    fn name(&self) -> &str {
        "cors"
    }

    async fn handle(&self, request: Request<Bytes>) -> Outcome {
        if request.method() == Method::OPTIONS {
            Outcome::Handled(preflight_response())
        } else {
            Outcome::NotHandled(request)
        }
    }
}

/// Answers `GET /health`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthMiddleware;

#[async_trait]
impl Middleware for HealthMiddleware {
    fn name(&self) -> &str {
        "health"
    }

    async fn handle(&self, request: Request<Bytes>) -> Outcome {
        if request.method() == Method::GET && request.uri().path() == HEALTH_PATH {
            Outcome::Handled(health_response())
        } else {
            Outcome::NotHandled(request)
        }
    }
}

/// Ordered middlewares with a JSON 404 at the end.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chain the dev host mounts: CORS, health, then the relay at `path`.
    pub fn dev(core: Arc<ProxyCore>, path: &str) -> Self {
        Self::new()
            .with(CorsMiddleware)
            .with(HealthMiddleware)
            .with(ProxyMiddleware::new(core, path))
    }

    /// Append a middleware.
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    /// Offer `request` to each middleware in turn.
    pub async fn run(&self, request: Request<Bytes>) -> Response<Bytes> {
        let mut request = request;

        for middleware in &self.middlewares {
            match middleware.handle(request).await {
                Outcome::Handled(mut response) => {
                    trace_fmt!("Middleware", "handled by {}", middleware.name());
                    apply_cors(response.headers_mut());
                    return response;
                }
                Outcome::NotHandled(next) => request = next,
                Outcome::Failed(e) => {
                    error_fmt!("Middleware", "{}", e);
                    return into_response(ProxyResult::error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error",
                    ));
                }
            }
        }

        trace_fmt!(
            "Middleware",
            "no middleware handled {} {}",
            request.method(),
            request.uri().path()
        );
        into_response(ProxyResult::error(StatusCode::NOT_FOUND, "Not Found"))
    }
}

#[async_trait]
impl HttpHandler for MiddlewareChain {
    async fn call(&self, request: Request<Bytes>) -> Response<Bytes> {
        let chain = self.clone();
        contain_panics(async move { chain.run(request).await }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tests::assert_cors;
    use crate::upstream::stub::StubFetcher;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dev_chain(stub: StubFetcher) -> (MiddlewareChain, Arc<StubFetcher>) {
        let stub = Arc::new(stub);
        let core = Arc::new(ProxyCore::new(stub.clone()));
        (MiddlewareChain::dev(core, "/api/proxy"), stub)
    }

    fn request(method: Method, path: &str, body: &'static str) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap()
    }

    fn json_of(response: &Response<Bytes>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    /// Counts calls and always fails.
    #[derive(Debug, Default)]
    struct Failing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Middleware for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(&self, _request: Request<Bytes>) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Outcome::Failed(MiddlewareError::new("failing", "disk on fire"))
        }
    }

    /// Records that it saw a request and passes it on.
    #[derive(Debug, Clone, Default)]
    struct Spy {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Middleware for Spy {
        fn name(&self) -> &str {
            "spy"
        }

        async fn handle(&self, request: Request<Bytes>) -> Outcome {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Outcome::NotHandled(request)
        }
    }

    #[tokio::test]
    async fn test_proxy_middleware_only_claims_post_on_its_path() {
        let stub = Arc::new(StubFetcher::html("x"));
        let middleware = ProxyMiddleware::new(Arc::new(ProxyCore::new(stub.clone())), "/api/proxy");

        let passes = [
            request(Method::GET, "/api/proxy", ""),
            request(Method::OPTIONS, "/api/proxy", ""),
            request(Method::POST, "/api/proxy/extra", "{}"),
            request(Method::POST, "/", "{}"),
        ];
        for req in passes {
            let (method, path) = (req.method().clone(), req.uri().path().to_string());
            match middleware.handle(req).await {
                Outcome::NotHandled(back) => {
                    assert_eq!(back.method(), method);
                    assert_eq!(back.uri().path(), path);
                }
                other => panic!("{method} {path} should pass through, got {other:?}"),
            }
        }
        assert_eq!(stub.calls(), 0);

        let claimed = middleware
            .handle(request(
                Method::POST,
                "/api/proxy?cache=no",
                r#"{"url":"https://knigavuhe.org/"}"#,
            ))
            .await;
        assert!(matches!(claimed, Outcome::Handled(ref r) if r.status() == StatusCode::OK));
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_dev_chain_relays() {
        let (chain, stub) = dev_chain(StubFetcher::html("<html>dev</html>"));

        let response = chain
            .call(request(
                Method::POST,
                "/api/proxy",
                r#"{"url":"https://knigavuhe.org/book/2"}"#,
            ))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"<html>dev</html>");
        assert_cors(response.headers());
        assert_eq!(stub.urls(), vec!["https://knigavuhe.org/book/2".to_string()]);
        assert_eq!(chain.names(), vec!["cors", "health", "proxy"]);
    }

    #[tokio::test]
    async fn test_dev_chain_client_errors() {
        let (chain, stub) = dev_chain(StubFetcher::html("x"));

        let bad_json = chain.call(request(Method::POST, "/api/proxy", "nope")).await;
        assert_eq!(bad_json.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(&bad_json), json!({"error": "Invalid JSON"}));
        assert_cors(bad_json.headers());

        let forbidden = chain
            .call(request(
                Method::POST,
                "/api/proxy",
                r#"{"url":"https://example.com/"}"#,
            ))
            .await;
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert_cors(forbidden.headers());

        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_dev_chain_preflight_and_health() {
        let (chain, _stub) = dev_chain(StubFetcher::html("x"));

        let preflight = chain.call(request(Method::OPTIONS, "/api/proxy", "")).await;
        assert_eq!(preflight.status(), StatusCode::NO_CONTENT);
        assert!(preflight.body().is_empty());
        assert_cors(preflight.headers());

        let health = chain.call(request(Method::GET, "/health", "")).await;
        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(json_of(&health), json!({"status": "ok"}));
        assert_cors(health.headers());
    }

    #[tokio::test]
    async fn test_unhandled_request_is_not_found() {
        let (chain, _stub) = dev_chain(StubFetcher::html("x"));

        for (method, path) in [
            (Method::GET, "/api/proxy"),
            (Method::GET, "/index.html"),
            (Method::POST, "/health"),
        ] {
            let response = chain.call(request(method.clone(), path, "")).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {path}");
            assert_eq!(json_of(&response), json!({"error": "Not Found"}));
            assert_cors(response.headers());
        }
    }

    #[tokio::test]
    async fn test_failed_middleware_stops_the_chain() {
        let spy = Spy::default();
        let chain = MiddlewareChain::new()
            .with(Failing::default())
            .with(spy.clone());

        let response = chain.call(request(Method::GET, "/", "")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_of(&response), json!({"error": "Internal Server Error"}));
        assert_cors(response.headers());
        assert_eq!(spy.seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_middlewares_run_in_order() {
        let spy = Spy::default();
        let stub = Arc::new(StubFetcher::html("x"));
        let chain = MiddlewareChain::new()
            .with(spy.clone())
            .with(ProxyMiddleware::new(Arc::new(ProxyCore::new(stub.clone())), "/p"))
            .with(spy.clone());

        chain
            .call(request(Method::POST, "/p", r#"{"url":"https://knigavuhe.org/"}"#))
            .await;
        assert_eq!(spy.seen.load(Ordering::SeqCst), 1);

        chain.call(request(Method::GET, "/p", "")).await;
        assert_eq!(spy.seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_chain_is_not_found() {
        let response = MiddlewareChain::new()
            .call(request(Method::POST, "/api/proxy", "{}"))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_cors(response.headers());
    }

    #[tokio::test]
    async fn test_panic_in_relay_is_contained() {
        let (chain, _stub) = dev_chain(StubFetcher::panicking());

        let response = chain
            .call(request(
                Method::POST,
                "/api/proxy",
                r#"{"url":"https://knigavuhe.org/"}"#,
            ))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_of(&response), json!({"error": "Internal server error"}));
        assert_cors(response.headers());
    }

    #[test]
    fn test_middleware_error_display() {
        let e = MiddlewareError::new("auth", "token expired");
        assert_eq!(e.to_string(), "middleware 'auth' failed: token expired");
    }
}
