use serde::Serialize;
use serde_json::{Map, Value};

use crate::claims::ClaimSet;
use crate::issuer::TokenIssuer;

/// Identity resolved from websocket connection params.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionIdentity {
    pub user: Option<ClaimSet>,
}

impl TokenIssuer {
    /// Verify the `authorization` entry of a websocket connection-params
    /// object. Lowercase wins over `Authorization`; anything unusable yields
    /// an anonymous identity.
    pub fn decode_connection_params(&self, params: &Map<String, Value>) -> ConnectionIdentity {
        let token = ["authorization", "Authorization"]
            .iter()
            .find_map(|key| params.get(*key).and_then(Value::as_str))
            .filter(|value| !value.trim().is_empty());

        let user = token.and_then(|token| self.verify(token).ok());
        ConnectionIdentity { user }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IssuerConfig;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn verified_params_yield_user() {
        let issuer = TokenIssuer::new(IssuerConfig::new("ws-secret")).expect("issuer");
        let token = issuer.issue(&json!({ "sub": "u1" })).expect("issue");

        let identity =
            issuer.decode_connection_params(&params(json!({ "Authorization": token.as_str() })));
        let user = identity.user.expect("user");
        assert_eq!(user.get("sub"), Some(&json!("u1")));
    }

    #[test]
    fn null_or_foreign_token_is_anonymous() {
        let issuer = TokenIssuer::new(IssuerConfig::new("ws-secret")).expect("issuer");
        let other = TokenIssuer::new(IssuerConfig::new("other-secret")).expect("issuer");
        let foreign = other.issue(&json!({ "sub": "u1" })).expect("issue");

        assert_eq!(
            issuer.decode_connection_params(&params(json!({ "authorization": null }))),
            ConnectionIdentity::default()
        );
        assert_eq!(
            issuer
                .decode_connection_params(&params(json!({ "authorization": foreign.as_str() })))
                .user,
            None
        );
    }
}
