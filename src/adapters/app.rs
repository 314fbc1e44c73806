// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Long-running application adapter, built on axum.
//!
//! Routes:
//!
//! - `POST <proxy path>` → relay
//! - any other method on the proxy path → 405 JSON
//! - `GET /health` → `{"status":"ok"}`
//! - anything else → 404 JSON
//!
//! Layers, innermost first: body limit (413 JSON), panic catcher (500 JSON), CORS (answers every
//! `OPTIONS` with 204 and stamps the headers on every response), access log.

use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::Full;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;

use super::{
    MAX_BODY_BYTES, apply_cors, error_response, health_response, preflight_response,
    relay_json_body,
};
use crate::core::{ProxyCore, ProxyError, ProxyResult};
use crate::error_fmt;
use crate::logging::AccessLog;
use crate::server::ServerError;

/// Build the application with the default access log.
pub fn router(core: Arc<ProxyCore>, proxy_path: &str) -> Router {
    router_with_access_log(core, proxy_path, AccessLog::default())
}

/// Build the application around `core`, mounting the relay at `proxy_path`.
pub fn router_with_access_log(
    core: Arc<ProxyCore>,
    proxy_path: &str,
    access_log: AccessLog,
) -> Router {
    Router::new()
        .route(proxy_path, post(relay).fallback(method_not_allowed))
        .route("/health", get(health))
        .fallback(not_found)
        .with_state(core)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(cors))
        .layer(middleware::from_fn_with_state(access_log, access))
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<S>(listener: TcpListener, router: Router, shutdown: S) -> Result<(), ServerError>
where
    S: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

async fn relay(
    State(core): State<Arc<ProxyCore>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match body {
        Ok(body) => relay_json_body(&core, &body).await.map(Body::from),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            error_response(ProxyError::PayloadTooLarge(MAX_BODY_BYTES)).map(Body::from)
        }
        Err(rejection) => error_response(ProxyError::Internal(rejection.body_text())).map(Body::from),
    }
}

async fn method_not_allowed(method: Method) -> Response {
    error_response(ProxyError::MethodNotAllowed(method)).map(Body::from)
}

async fn health() -> Response {
    health_response().map(Body::from)
}

async fn not_found() -> Response {
    super::into_response(ProxyResult::error(StatusCode::NOT_FOUND, "Not Found")).map(Body::from)
}

async fn cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return preflight_response().map(Body::from);
    }

    let mut response = next.run(request).await;
    apply_cors(response.headers_mut());
    response
}

async fn access(State(access_log): State<AccessLog>, request: Request, next: Next) -> Response {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let info = access_log.begin(&request, remote_addr);

    let mut response = next.run(request).await;
    access_log.finish(&mut response, &info);
    response
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> http::Response<Full<Bytes>> {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error_fmt!("App", "handler panicked: {}", detail);

    error_response(ProxyError::Internal(detail)).map(Full::new)
}
