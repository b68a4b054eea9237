use http::{HeaderMap, HeaderValue};
use serde::Serialize;

use crate::error::{IssuerError, IssuerResult};
use crate::issuer::{BearerToken, TokenIssuer};

impl TokenIssuer {
    /// Issue a token for `claims` and attach it to the response headers as a
    /// newly created session.
    pub fn authenticate<C>(&self, headers: &mut HeaderMap, claims: &C) -> IssuerResult<BearerToken>
    where
        C: Serialize + ?Sized,
    {
        let token = self.issue(claims)?;
        headers.insert(self.config().convention.create_header(), header_value(&token)?);
        Ok(token)
    }

    /// Issue a replacement token and attach it as a renewal.
    pub fn renew<C>(&self, headers: &mut HeaderMap, claims: &C) -> IssuerResult<BearerToken>
    where
        C: Serialize + ?Sized,
    {
        let token = self.issue(claims)?;
        headers.insert(self.config().convention.update_header(), header_value(&token)?);
        Ok(token)
    }

    /// Tell the client to drop whatever token it holds.
    pub fn deauthenticate(&self, headers: &mut HeaderMap) {
        let convention = self.config().convention;
        headers.insert(
            convention.remove_header(),
            HeaderValue::from_static(convention.removal_value()),
        );
    }
}

pub(crate) fn header_value(token: &BearerToken) -> IssuerResult<HeaderValue> {
    HeaderValue::from_str(token.as_str())
        .map_err(|err| IssuerError::Signing(format!("token is not a valid header value: {err}")))
}
