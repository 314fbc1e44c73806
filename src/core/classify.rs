// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary / text split of upstream bodies.
//!
//! Anything declared as `audio` is relayed byte for byte with the upstream
//! content type untouched. Everything else is decoded as UTF-8 and relayed as
//! text, defaulting to `text/html` when upstream did not say what it sent.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};

use super::{ProxyBody, ProxyResult};

/// Content type used for text bodies that arrived without one.
pub const DEFAULT_TEXT_CONTENT_TYPE: &str = "text/html";

/// How a body is relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Binary,
    Text,
}

impl ContentKind {
    /// Classify a declared content type. Empty means text.
    pub fn of(content_type: &str) -> Self {
        if content_type.contains("audio") {
            ContentKind::Binary
        } else {
            ContentKind::Text
        }
    }
}

/// Result of [`classify`].
#[derive(Debug, Clone)]
pub struct Classified {
    pub kind: ContentKind,
    pub content_type: HeaderValue,
    pub body: ProxyBody,
}

impl Classified {
    /// Wrap into a 200 result carrying the classified content type.
    pub fn into_result(self) -> ProxyResult {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, self.content_type);

        ProxyResult {
            status: StatusCode::OK,
            headers,
            body: self.body,
        }
    }
}

/// Decide how to relay `body` based on the upstream `content-type`.
///
/// A header that is not visible ASCII is treated as absent.
pub fn classify(headers: &HeaderMap, body: Bytes) -> Classified {
    let declared = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok().map(|s| (value, s)));

    match declared {
        Some((value, s)) if ContentKind::of(s) == ContentKind::Binary => Classified {
            kind: ContentKind::Binary,
            content_type: value.clone(),
            body: ProxyBody::Binary(body),
        },
        Some((value, s)) if !s.is_empty() => Classified {
            kind: ContentKind::Text,
            content_type: value.clone(),
            body: ProxyBody::Text(decode_text(&body)),
        },
        _ => Classified {
            kind: ContentKind::Text,
            content_type: HeaderValue::from_static(DEFAULT_TEXT_CONTENT_TYPE),
            body: ProxyBody::Text(decode_text(&body)),
        },
    }
}

fn decode_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}
