use std::sync::Arc;

use axum::extract::{FromRef, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::error::{DecodeFailure, IssuerResult};
use crate::extractors::Identity;
use crate::issuer::{AuthOutcome, TokenIssuer};
use crate::metrics::IssuerMetrics;
use crate::response::header_value;

/// State required by [`manage_auth`].
#[derive(Clone)]
pub struct AuthState {
    pub issuer: Arc<TokenIssuer>,
    pub metrics: Arc<IssuerMetrics>,
}

impl AuthState {
    pub fn new(issuer: TokenIssuer) -> IssuerResult<Self> {
        Ok(Self {
            issuer: Arc::new(issuer),
            metrics: Arc::new(IssuerMetrics::new()?),
        })
    }
}

impl FromRef<AuthState> for Arc<TokenIssuer> {
    fn from_ref(state: &AuthState) -> Self {
        state.issuer.clone()
    }
}

impl FromRef<AuthState> for Arc<IssuerMetrics> {
    fn from_ref(state: &AuthState) -> Self {
        state.metrics.clone()
    }
}

/// Resolve the request's bearer token, attach an [`Identity`] and write any
/// renewal or removal signal onto the response. Never rejects the request:
/// invalid tokens degrade to an anonymous identity.
pub async fn manage_auth(State(state): State<AuthState>, mut request: Request, next: Next) -> Response {
    let outcome = match request.headers().get(AUTHORIZATION) {
        None => AuthOutcome::Anonymous,
        Some(value) => match value.to_str() {
            Ok(raw) => state.issuer.resolve(Some(raw)),
            Err(_) => AuthOutcome::Rejected(DecodeFailure::Malformed(
                "authorization header is not valid UTF-8".to_string(),
            )),
        },
    };
    state.metrics.request_outcome(&outcome);
    debug!(outcome = outcome.label(), "resolved request token");

    request
        .extensions_mut()
        .insert(Identity(outcome.identity().cloned()));

    let mut response = next.run(request).await;

    let convention = state.issuer.config().convention;
    let headers = response.headers_mut();
    // a handler that logged in or out already decided the token's fate
    let handler_signalled =
        headers.contains_key(convention.create_header()) || headers.contains_key(convention.remove_header());
    if handler_signalled {
        return response;
    }

    match outcome {
        AuthOutcome::Renewed { token, .. } => match header_value(&token) {
            Ok(value) => {
                headers.insert(convention.update_header(), value);
                state.metrics.signal("update");
            }
            Err(err) => warn!(?err, "failed to attach renewed token"),
        },
        AuthOutcome::Rejected(reason) => {
            debug!(%reason, "asking client to drop its token");
            headers.insert(
                convention.remove_header(),
                HeaderValue::from_static(convention.removal_value()),
            );
            state.metrics.signal("remove");
        }
        AuthOutcome::Anonymous | AuthOutcome::Authenticated(_) => {}
    }

    response
}
