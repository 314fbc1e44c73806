// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-request access logging with trace ids.
//!
//! [`AccessLog::begin`] assigns the trace id and logs the request line,
//! [`AccessLog::finish`] logs status and timing and echoes the trace id in the
//! configured response header.

use std::net::SocketAddr;
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue, USER_AGENT};
use http::{Request, Response};

use crate::logging::config::LoggingConfig;
use crate::logging::is_structured;
use crate::logging::structured::{RequestInfo, generate_trace_id};

const FALLBACK_TRACE_HEADER: &str = "x-trace-id";

/// Request/response logger shared by all three hosts.
#[derive(Debug, Clone)]
pub struct AccessLog {
    config: Arc<LoggingConfig>,
    trace_header: HeaderName,
}

impl Default for AccessLog {
    fn default() -> Self {
        Self::new(LoggingConfig::default())
    }
}

impl AccessLog {
    pub fn new(config: LoggingConfig) -> Self {
        let trace_header = HeaderName::from_bytes(config.trace_id_header.as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static(FALLBACK_TRACE_HEADER));

        Self {
            config: Arc::new(config),
            trace_header,
        }
    }

    pub fn trace_header(&self) -> &HeaderName {
        &self.trace_header
    }

    /// Start tracking a request and log that it arrived.
    pub fn begin<B>(&self, request: &Request<B>, remote_addr: Option<SocketAddr>) -> RequestInfo {
        let user_agent = request
            .headers()
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        let trace_id = if self.config.propagate_trace_id {
            request
                .headers()
                .get(&self.trace_header)
                .and_then(|h| h.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(generate_trace_id)
        } else {
            generate_trace_id()
        };

        let mut info = RequestInfo::new(
            request.method().to_string(),
            request.uri().path().to_string(),
            remote_addr.map_or_else(|| "unknown".to_string(), |a| a.to_string()),
            user_agent,
        );
        info.trace_id = trace_id;

        if is_structured() {
            let logger = info.logger(&slog_scope::logger());
            slog::info!(logger, "Request received");
        } else {
            log::info!(
                "Request received: {} {} from {} (trace_id: {})",
                info.method,
                info.path,
                info.remote_addr,
                info.trace_id
            );
        }

        info
    }

    /// Log completion and stamp the trace header on `response`.
    pub fn finish<B>(&self, response: &mut Response<B>, info: &RequestInfo) {
        let status = response.status().as_u16();
        let elapsed_ms = info.elapsed_ms();

        if is_structured() {
            let logger = info.logger(&slog_scope::logger());
            slog::info!(logger, "Response completed";
                "status" => status,
                "elapsed_ms" => elapsed_ms as u64
            );
        } else {
            log::info!(
                "[timing] {} {} -> {} | total={}ms (trace_id: {})",
                info.method,
                info.path,
                status,
                elapsed_ms,
                info.trace_id
            );
        }

        if self.config.include_trace_id {
            if let Ok(value) = HeaderValue::from_str(&info.trace_id) {
                response.headers_mut().insert(self.trace_header.clone(), value);
            }
        }
    }
}
