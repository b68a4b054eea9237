use std::env;
use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand_core::{OsRng, RngCore};

use crate::error::{IssuerError, IssuerResult};
use crate::headers::HeaderConvention;

/// Three days.
pub const DEFAULT_LIFETIME_SECONDS: u64 = 259_200;

/// One hundred years.
pub const MAX_LIFETIME_SECONDS: u64 = 3_153_600_000;

pub const ENV_SECRET: &str = "JWT_SECRET";
pub const ENV_LIFETIME: &str = "JWT_LIFETIME";
pub const ENV_DEBUG: &str = "JWT_DEBUG";
pub const ENV_HEADER_CONVENTION: &str = "JWT_HEADER_CONVENTION";

/// Runtime configuration for issuing and verifying tokens.
#[derive(Clone)]
pub struct IssuerConfig {
    /// HMAC signing key.
    pub secret: String,
    /// Token lifetime in seconds, counted from issuance.
    pub lifetime_seconds: u64,
    /// Log decode/verify failures.
    pub debug: bool,
    /// Response header names used for create/update/remove signals.
    pub convention: HeaderConvention,
}

impl IssuerConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            lifetime_seconds: DEFAULT_LIFETIME_SECONDS,
            debug: false,
            convention: HeaderConvention::default(),
        }
    }

    /// Config with a freshly generated secret. Tokens signed with it do not
    /// survive a process restart.
    pub fn with_generated_secret() -> Self {
        Self::new(generate_secret())
    }

    pub fn with_lifetime(mut self, seconds: u64) -> Self {
        self.lifetime_seconds = seconds;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_convention(mut self, convention: HeaderConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Load from `JWT_*` environment variables, generating a secret when
    /// `JWT_SECRET` is unset.
    pub fn from_env() -> IssuerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok(), false)
    }

    /// Like [`IssuerConfig::from_env`] but fails when no secret is configured.
    pub fn from_env_strict() -> IssuerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok(), true)
    }

    pub fn from_lookup<F>(lookup: F, strict: bool) -> IssuerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = match lookup(ENV_SECRET).and_then(|value| normalize_optional(&value)) {
            Some(secret) => secret,
            None if strict => {
                return Err(IssuerError::Config(format!("{ENV_SECRET} must be set")));
            }
            None => {
                tracing::warn!(
                    "{ENV_SECRET} not set; generated a random signing secret, tokens will not survive a restart"
                );
                generate_secret()
            }
        };

        let lifetime_seconds = match lookup(ENV_LIFETIME).and_then(|value| normalize_optional(&value)) {
            Some(value) => value.parse::<u64>().map_err(|err| {
                IssuerError::Config(format!("Failed to parse {ENV_LIFETIME} '{value}': {err}"))
            })?,
            None => DEFAULT_LIFETIME_SECONDS,
        };

        let debug = lookup(ENV_DEBUG)
            .map(|value| parse_bool(&value))
            .unwrap_or(false);

        let convention = lookup(ENV_HEADER_CONVENTION)
            .and_then(|value| normalize_optional(&value))
            .map(|value| value.parse::<HeaderConvention>())
            .transpose()
            .map_err(IssuerError::Config)?
            .unwrap_or_default();

        let config = Self {
            secret,
            lifetime_seconds,
            debug,
            convention,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> IssuerResult<()> {
        if self.secret.trim().is_empty() {
            return Err(IssuerError::Config("signing secret is empty".to_string()));
        }
        if self.lifetime_seconds == 0 {
            return Err(IssuerError::Config(
                "token lifetime must be at least one second".to_string(),
            ));
        }
        if self.lifetime_seconds > MAX_LIFETIME_SECONDS {
            return Err(IssuerError::Config(format!(
                "token lifetime {} exceeds the maximum of {MAX_LIFETIME_SECONDS} seconds",
                self.lifetime_seconds
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for IssuerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuerConfig")
            .field("secret", &"<redacted>")
            .field("lifetime_seconds", &self.lifetime_seconds)
            .field("debug", &self.debug)
            .field("convention", &self.convention)
            .finish()
    }
}

/// 48 random bytes, base64url encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 48];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
