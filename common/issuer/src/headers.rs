use std::fmt;
use std::str::FromStr;

use http::{HeaderMap, HeaderName};

pub const X_TOKEN_CREATE: HeaderName = HeaderName::from_static("x-token-create");
pub const X_TOKEN_UPDATE: HeaderName = HeaderName::from_static("x-token-update");
pub const X_TOKEN_REMOVE: HeaderName = HeaderName::from_static("x-token-remove");

/// Deprecated alias names; only read or written under [`HeaderConvention::Legacy`].
pub const X_TOKEN_SET: HeaderName = HeaderName::from_static("x-token-set");
pub const X_TOKEN_UNSET: HeaderName = HeaderName::from_static("x-token-unset");

/// Response header names used to hand token material to the holder.
///
/// `Current` (`X-Token-Create` / `X-Token-Update` / `X-Token-Remove`) is the
/// canonical set. `Legacy` (`X-Token-Set` / `X-Token-Unset`) exists for older
/// clients and must be opted into explicitly; the two are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderConvention {
    #[default]
    Current,
    Legacy,
}

/// What a response told the holder to do with its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSignal {
    Store(String),
    Remove,
}

impl HeaderConvention {
    pub fn create_header(self) -> HeaderName {
        match self {
            HeaderConvention::Current => X_TOKEN_CREATE,
            HeaderConvention::Legacy => X_TOKEN_SET,
        }
    }

    pub fn update_header(self) -> HeaderName {
        match self {
            HeaderConvention::Current => X_TOKEN_UPDATE,
            HeaderConvention::Legacy => X_TOKEN_SET,
        }
    }

    pub fn remove_header(self) -> HeaderName {
        match self {
            HeaderConvention::Current => X_TOKEN_REMOVE,
            HeaderConvention::Legacy => X_TOKEN_UNSET,
        }
    }

    pub fn removal_value(self) -> &'static str {
        match self {
            HeaderConvention::Current => "remove",
            HeaderConvention::Legacy => "true",
        }
    }

    /// Header names a browser-facing server must list in
    /// `Access-Control-Expose-Headers`.
    pub fn exposed_headers(self) -> Vec<HeaderName> {
        let mut names = vec![self.create_header()];
        if self.update_header() != self.create_header() {
            names.push(self.update_header());
        }
        names.push(self.remove_header());
        names
    }

    /// Read the token signal carried by a response. Removal wins when both a
    /// fresh token and a removal are present.
    pub fn token_signal(self, headers: &HeaderMap) -> Option<TokenSignal> {
        if non_empty(headers, &self.remove_header()).is_some() {
            return Some(TokenSignal::Remove);
        }

        non_empty(headers, &self.create_header())
            .or_else(|| non_empty(headers, &self.update_header()))
            .map(|value| TokenSignal::Store(value.to_string()))
    }
}

fn non_empty<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl fmt::Display for HeaderConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderConvention::Current => f.write_str("current"),
            HeaderConvention::Legacy => f.write_str("legacy"),
        }
    }
}

impl FromStr for HeaderConvention {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "current" | "create-update-remove" => Ok(HeaderConvention::Current),
            "legacy" | "set-unset" => Ok(HeaderConvention::Legacy),
            other => Err(format!(
                "Unsupported header convention '{other}'. Use current or legacy."
            )),
        }
    }
}
