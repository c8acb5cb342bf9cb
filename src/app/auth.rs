use anyhow::Result;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};

use crate::domain::user::UserId;

const ACCESS_TOKEN_TYPE: &str = "access";

/// PASETO v4.local access tokens. Issuing and login live elsewhere; this
/// service only needs to turn a bearer token into a caller identity.
#[derive(Clone)]
pub struct TokenVerifier {
    key: [u8; 32],
    issuer: String,
}

impl TokenVerifier {
    pub fn new(key: [u8; 32], issuer: impl Into<String>) -> Self {
        Self {
            key,
            issuer: issuer.into(),
        }
    }

    /// `Ok(None)` for any token that is malformed, expired, forged, of the
    /// wrong type or carries an unusable subject.
    pub fn verify(&self, token: &str) -> Result<Option<UserId>> {
        let claims = match self.decrypt_claims(token)? {
            Some(claims) => claims,
            None => return Ok(None),
        };
        if !has_token_type(&claims, ACCESS_TOKEN_TYPE) {
            return Ok(None);
        }
        let subject = claims.get_claim("sub").and_then(|value| value.as_str());
        Ok(subject.and_then(|sub| UserId::parse(sub).ok()))
    }

    fn decrypt_claims(&self, token: &str) -> Result<Option<Claims>> {
        let key = SymmetricKey::<V4>::from(&self.key)?;
        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(&self.issuer);
        rules.validate_audience_with(&self.issuer);

        let untrusted = match UntrustedToken::<Local, V4>::try_from(token) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        let trusted = match local::decrypt(&key, &untrusted, &rules, None, None) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        Ok(trusted.payload_claims().cloned())
    }
}

fn has_token_type(claims: &Claims, expected: &str) -> bool {
    claims
        .get_claim("typ")
        .and_then(|value| value.as_str())
        .map(|value| value == expected)
        .unwrap_or(false)
}
