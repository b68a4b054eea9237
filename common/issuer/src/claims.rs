use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DecodeFailure, DecodeResult};

/// Reserved claim names assigned by the signing step.
pub const RESERVED_CLAIMS: [&str; 2] = ["iat", "exp"];

/// Decoded token payload: caller-supplied fields plus the reserved
/// issued-at and expires-at timestamps (Unix seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ClaimsRepr", into = "ClaimsRepr")]
pub struct ClaimSet {
    fields: Map<String, Value>,
    issued_at: Option<i64>,
    expires_at: i64,
}

impl ClaimSet {
    pub fn new(fields: Map<String, Value>, issued_at: Option<i64>, expires_at: i64) -> Self {
        Self {
            fields: strip_reserved(fields),
            issued_at,
            expires_at,
        }
    }

    /// Caller-supplied claims, without `iat`/`exp`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn issued_at(&self) -> Option<i64> {
        self.issued_at
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Seconds until expiry; zero or negative once expired.
    pub fn remaining_seconds(&self, now: i64) -> i64 {
        self.expires_at - now
    }

    /// A token is expired from the second its `exp` is reached.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

pub(crate) fn strip_reserved(mut fields: Map<String, Value>) -> Map<String, Value> {
    for name in RESERVED_CLAIMS {
        fields.remove(name);
    }
    fields
}

#[derive(Debug, Serialize, Deserialize)]
struct ClaimsRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl TryFrom<ClaimsRepr> for ClaimSet {
    type Error = DecodeFailure;

    fn try_from(value: ClaimsRepr) -> DecodeResult<Self> {
        let expires_at = value.exp.ok_or(DecodeFailure::MissingExpiry)?;
        Ok(Self::new(value.rest, value.iat, expires_at))
    }
}

impl From<ClaimSet> for ClaimsRepr {
    fn from(value: ClaimSet) -> Self {
        Self {
            iat: value.issued_at,
            exp: Some(value.expires_at),
            rest: value.fields,
        }
    }
}

impl TryFrom<Value> for ClaimSet {
    type Error = DecodeFailure;

    fn try_from(value: Value) -> DecodeResult<Self> {
        if !value.is_object() {
            return Err(DecodeFailure::InvalidClaims(
                "payload is not a JSON object".to_string(),
            ));
        }
        let repr: ClaimsRepr = serde_json::from_value(value)
            .map_err(|err| DecodeFailure::InvalidClaims(err.to_string()))?;
        ClaimSet::try_from(repr)
    }
}
