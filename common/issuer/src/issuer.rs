use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::claims::{strip_reserved, ClaimSet};
use crate::clock::{Clock, SystemClock};
use crate::config::IssuerConfig;
use crate::error::{DecodeFailure, DecodeResult, IssuerError, IssuerResult};

pub const BEARER_PREFIX: &str = "Bearer ";

/// A signed token in its wire form, `Bearer <jwt>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The signed token without the bearer prefix.
    pub fn raw(&self) -> &str {
        &self.0[BEARER_PREFIX.len()..]
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BearerToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Result of inspecting the token presented with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// No token was presented.
    Anonymous,
    /// Valid and fresh.
    Authenticated(ClaimSet),
    /// Valid but aging; a replacement token must be sent back.
    Renewed { claims: ClaimSet, token: BearerToken },
    /// Present but unusable; the client must drop it.
    Rejected(DecodeFailure),
}

impl AuthOutcome {
    pub fn identity(&self) -> Option<&ClaimSet> {
        match self {
            AuthOutcome::Authenticated(claims) | AuthOutcome::Renewed { claims, .. } => {
                Some(claims)
            }
            AuthOutcome::Anonymous | AuthOutcome::Rejected(_) => None,
        }
    }

    pub fn into_identity(self) -> Option<ClaimSet> {
        match self {
            AuthOutcome::Authenticated(claims) | AuthOutcome::Renewed { claims, .. } => {
                Some(claims)
            }
            AuthOutcome::Anonymous | AuthOutcome::Rejected(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AuthOutcome::Anonymous => "anonymous",
            AuthOutcome::Authenticated(_) => "authenticated",
            AuthOutcome::Renewed { .. } => "renewed",
            AuthOutcome::Rejected(_) => "rejected",
        }
    }
}

/// Creates, verifies and renews HS256 bearer tokens. Holds no per-request
/// state.
#[derive(Clone)]
pub struct TokenIssuer {
    config: IssuerConfig,
    encoding: EncodingKey,
    decoding: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(config: IssuerConfig) -> IssuerResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: IssuerConfig, clock: Arc<dyn Clock>) -> IssuerResult<Self> {
        config.validate()?;
        let encoding = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding = DecodingKey::from_secret(config.secret.as_bytes());
        Ok(Self {
            config,
            encoding,
            decoding,
            clock,
        })
    }

    pub fn from_env() -> IssuerResult<Self> {
        Self::new(IssuerConfig::from_env()?)
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Sign `claims` with the configured lifetime.
    pub fn issue<C>(&self, claims: &C) -> IssuerResult<BearerToken>
    where
        C: Serialize + ?Sized,
    {
        self.issue_with_lifetime(claims, self.config.lifetime_seconds)
    }

    /// Sign `claims`, expiring `lifetime_seconds` from now. Any `iat`/`exp`
    /// supplied by the caller is discarded.
    pub fn issue_with_lifetime<C>(&self, claims: &C, lifetime_seconds: u64) -> IssuerResult<BearerToken>
    where
        C: Serialize + ?Sized,
    {
        let lifetime = i64::try_from(lifetime_seconds).map_err(|_| {
            IssuerError::Config(format!("token lifetime {lifetime_seconds} is out of range"))
        })?;

        let mut payload = match serde_json::to_value(claims) {
            Ok(Value::Object(fields)) => strip_reserved(fields),
            Ok(other) => {
                return Err(IssuerError::InvalidClaims(format!(
                    "expected an object, got {}",
                    json_kind(&other)
                )))
            }
            Err(err) => return Err(IssuerError::InvalidClaims(err.to_string())),
        };

        let now = self.clock.now_seconds();
        let expires_at = now.checked_add(lifetime).ok_or_else(|| {
            IssuerError::Config(format!("token lifetime {lifetime_seconds} overflows the expiry"))
        })?;
        payload.insert("iat".to_string(), Value::from(now));
        payload.insert("exp".to_string(), Value::from(expires_at));

        let signed = encode(&Header::new(Algorithm::HS256), &payload, &self.encoding)
            .map_err(|err| IssuerError::Signing(err.to_string()))?;
        debug!(expires_at, "issued token");
        Ok(BearerToken(format!("{BEARER_PREFIX}{signed}")))
    }

    /// Check signature and expiry. Accepts the token with or without the
    /// bearer prefix.
    pub fn verify(&self, token: &str) -> DecodeResult<ClaimSet> {
        let result = self.verify_inner(token);
        if let Err(reason) = &result {
            if self.config.debug {
                warn!(%reason, "token verification failed");
            }
        }
        result
    }

    fn verify_inner(&self, token: &str) -> DecodeResult<ClaimSet> {
        let raw = strip_bearer(token)?;

        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is enforced against our clock below
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<Value>(raw, &self.decoding, &validation)?;
        let claims = ClaimSet::try_from(data.claims)?;

        if claims.is_expired_at(self.clock.now_seconds()) {
            return Err(DecodeFailure::Expired {
                expired_at: claims.expires_at(),
            });
        }
        Ok(claims)
    }

    /// Whether `claims` have aged past the sliding-renewal threshold of this
    /// issuer's lifetime.
    pub fn should_renew(&self, claims: &ClaimSet) -> bool {
        should_renew(claims, self.config.lifetime_seconds, self.clock.now_seconds())
    }

    /// Resolve the `Authorization` value of an inbound request. Never fails:
    /// unusable tokens degrade to [`AuthOutcome::Rejected`].
    pub fn resolve(&self, authorization: Option<&str>) -> AuthOutcome {
        let Some(token) = authorization.map(str::trim).filter(|value| !value.is_empty()) else {
            return AuthOutcome::Anonymous;
        };

        let claims = match self.verify(token) {
            Ok(claims) => claims,
            Err(reason) => return AuthOutcome::Rejected(reason),
        };

        if !self.should_renew(&claims) {
            return AuthOutcome::Authenticated(claims);
        }

        match self.issue(claims.fields()) {
            Ok(token) => AuthOutcome::Renewed { claims, token },
            Err(err) => {
                error!(?err, "failed to renew token; keeping the current one");
                AuthOutcome::Authenticated(claims)
            }
        }
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// True iff less than two thirds of `lifetime_seconds` remain.
pub fn should_renew(claims: &ClaimSet, lifetime_seconds: u64, now: i64) -> bool {
    let remaining = i128::from(claims.remaining_seconds(now));
    3 * remaining < 2 * i128::from(lifetime_seconds)
}

/// Remove an optional `Bearer ` prefix.
pub fn strip_bearer(token: &str) -> DecodeResult<&str> {
    let trimmed = token.trim();
    let raw = trimmed.strip_prefix(BEARER_PREFIX).unwrap_or(trimmed).trim();
    if raw.is_empty() {
        return Err(DecodeFailure::Empty);
    }
    Ok(raw)
}

/// Decode the payload without checking the signature or expiry. Only for
/// callers that re-verify independently or merely display the claims.
pub fn decode_unsafe(token: &str) -> DecodeResult<ClaimSet> {
    let raw = strip_bearer(token)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Value>(raw, &DecodingKey::from_secret(&[]), &validation)?;
    ClaimSet::try_from(data.claims)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
