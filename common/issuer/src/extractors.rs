use std::convert::Infallible;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::claims::ClaimSet;
use crate::error::IssuerError;

/// Identity attached by [`crate::middleware::manage_auth`]; `None` for
/// anonymous requests. Extracting it never fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity(pub Option<ClaimSet>);

impl Identity {
    pub fn claims(&self) -> Option<&ClaimSet> {
        self.0.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.0.is_some()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Identity>().cloned().unwrap_or_default())
    }
}

/// Claims of an authenticated request; rejects anonymous requests with 401.
#[derive(Debug, Clone)]
pub struct Authenticated(pub ClaimSet);

impl Authenticated {
    pub fn into_claims(self) -> ClaimSet {
        self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = IssuerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .and_then(|identity| identity.0.clone())
            .map(Authenticated)
            .ok_or(IssuerError::Unauthenticated)
    }
}
