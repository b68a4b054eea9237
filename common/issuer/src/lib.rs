pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod headers;
pub mod issuer;
pub mod response;
pub mod ws;

#[cfg(feature = "server")]
pub mod extractors;
#[cfg(feature = "server")]
pub mod metrics;
#[cfg(feature = "server")]
pub mod middleware;

pub use claims::ClaimSet;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{IssuerConfig, DEFAULT_LIFETIME_SECONDS, MAX_LIFETIME_SECONDS};
pub use error::{DecodeFailure, DecodeResult, IssuerError, IssuerResult};
pub use headers::{HeaderConvention, TokenSignal};
pub use issuer::{decode_unsafe, should_renew, strip_bearer, AuthOutcome, BearerToken, TokenIssuer, BEARER_PREFIX};
pub use ws::ConnectionIdentity;

#[cfg(feature = "server")]
pub use extractors::{Authenticated, Identity};
#[cfg(feature = "server")]
pub use metrics::IssuerMetrics;
#[cfg(feature = "server")]
pub use middleware::{manage_auth, AuthState};
