// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Allow-list policy.
//!
//! The check is lexical: a URL is accepted when its string form contains the
//! host token anywhere. `https://evil.example/knigavuhe.org` therefore passes.
//! Strings without the token are always rejected.

/// The only host the relay will talk to.
pub const ALLOWED_HOST: &str = "knigavuhe.org";

/// Fail-closed predicate over candidate upstream URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowList;

impl AllowList {
    /// The host token URLs must contain.
    pub const fn host(&self) -> &'static str {
        ALLOWED_HOST
    }

    /// Absent input is never allowed.
    pub fn is_allowed(&self, url: Option<&str>) -> bool {
        url.is_some_and(|u| u.contains(ALLOWED_HOST))
    }

    /// Error message returned to clients for rejected URLs.
    pub fn rejection_message(&self) -> String {
        format!("Only {ALLOWED_HOST} URLs are allowed")
    }
}
