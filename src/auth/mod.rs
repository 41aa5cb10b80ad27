//! Credential verification
//!
//! The hub does not authorize feed access; it only needs to know who is
//! subscribing, if anyone. `Authenticator` is that capability: verify a
//! token, get a `Principal` back. `JwtAuthenticator` implements it with
//! HS256 tokens signed with the configured secret.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::utils::error::AuthError;

/// The verified identity behind a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub admin: bool,
}

pub trait Authenticator: Send + Sync {
    fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Mint a token for `sub` valid for `ttl`.
    pub fn issue(&self, sub: &str, admin: bool, ttl: chrono::Duration) -> Result<String, AuthError> {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (Utc::now() + ttl).timestamp() as usize,
            admin,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }
}

impl Authenticator for JwtAuthenticator {
    fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        if data.claims.sub.is_empty() {
            return Err(AuthError::MissingSubject);
        }
        Ok(Principal {
            user_id: data.claims.sub,
            is_admin: data.claims.admin,
        })
    }
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify() {
        let auth = JwtAuthenticator::new("secret");
        let token = auth.issue("17", true, chrono::Duration::hours(1)).unwrap();
        let principal = auth.verify(&token).unwrap();
        assert_eq!(principal.user_id, "17");
        assert!(principal.is_admin);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = JwtAuthenticator::new("one")
            .issue("17", false, chrono::Duration::hours(1))
            .unwrap();
        let err = JwtAuthenticator::new("two").verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let auth = JwtAuthenticator::new("secret");
        let token = auth.issue("17", false, chrono::Duration::hours(-2)).unwrap();
        assert!(auth.verify(&token).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let auth = JwtAuthenticator::new("secret");
        assert!(auth.verify("invalid.token.here").is_err());
    }
}
