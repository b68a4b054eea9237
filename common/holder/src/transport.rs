use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue, Request, Response};
use tracing::{debug, warn};

use bearer_issuer::{HeaderConvention, TokenSignal};

use crate::error::HolderError;
use crate::holder::TokenHolder;

/// Errors that may wrap the response which caused them.
pub trait ResponseCarrier {
    fn response_headers(&self) -> Option<&HeaderMap>;
}

impl ResponseCarrier for HolderError {
    fn response_headers(&self) -> Option<&HeaderMap> {
        match self {
            HolderError::Status { headers, .. } => Some(headers),
            _ => None,
        }
    }
}

/// Bridges HTTP exchanges and a [`TokenHolder`]: attaches the held token to
/// outgoing requests and applies create/update/remove signals found on
/// responses. Keeps no token state of its own.
#[derive(Debug, Clone)]
pub struct TransportAdapter {
    holder: TokenHolder,
    convention: HeaderConvention,
}

impl TransportAdapter {
    /// Uses the header convention configured on the holder.
    pub fn new(holder: TokenHolder) -> Self {
        let convention = holder.config().convention;
        Self { holder, convention }
    }

    pub fn with_convention(mut self, convention: HeaderConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn holder(&self) -> &TokenHolder {
        &self.holder
    }

    pub fn convention(&self) -> HeaderConvention {
        self.convention
    }

    /// Set `authorization` to the held token, or remove it when none is held.
    pub fn authorize_headers(&self, headers: &mut HeaderMap) {
        let value = self
            .holder
            .current_token()
            .and_then(|token| match HeaderValue::from_str(&token) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("held token is not a valid header value; sending anonymously");
                    None
                }
            });

        match value {
            Some(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            None => {
                headers.remove(AUTHORIZATION);
            }
        }
    }

    pub fn on_outgoing_request<B>(&self, mut request: Request<B>) -> Request<B> {
        self.authorize_headers(request.headers_mut());
        request
    }

    /// Apply the token signal carried by `headers`, if any. Removal wins
    /// over a fresh token.
    pub fn observe(&self, headers: &HeaderMap) -> Option<TokenSignal> {
        let signal = self.convention.token_signal(headers)?;
        match &signal {
            TokenSignal::Remove => {
                debug!("server removed the token");
                self.holder.logout();
            }
            TokenSignal::Store(token) => {
                debug!("server sent a token");
                self.holder.set_token(token);
            }
        }
        Some(signal)
    }

    pub fn on_incoming_response<B>(&self, response: Response<B>) -> Response<B> {
        self.observe(response.headers());
        response
    }

    /// Apply any signal on the response embedded in `error`, then hand the
    /// error back unchanged.
    pub fn on_incoming_error<T, E>(&self, error: E) -> Result<T, E>
    where
        E: ResponseCarrier,
    {
        if let Some(headers) = error.response_headers() {
            self.observe(headers);
        }
        Err(error)
    }
}
