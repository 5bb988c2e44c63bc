use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, decode, Header, EncodingKey, DecodingKey, Validation, Algorithm};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AuthError};

/// Claims carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // User ID
    pub iat: i64,     // Issued at
    pub exp: i64,     // Expiration time
}

/// Issues and verifies stateless HS256 access tokens.
///
/// Validity is purely a function of the signature and the embedded
/// expiry; nothing is persisted and nothing can be revoked early.
pub struct TokenSigner {
    secret: String,
}

impl TokenSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// Build and sign an access token for `user_id` expiring `ttl_minutes`
    /// from now. Returns the serialized token and its absolute expiry.
    pub fn issue_access(
        &self,
        user_id: &str,
        ttl_minutes: i64,
    ) -> Result<(String, DateTime<Utc>), AppError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(ttl_minutes);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok((token, exp))
    }

    /// Check signature and expiry, returning the claims on success.
    ///
    /// An expired-but-well-formed token yields `TokenExpired`; everything
    /// else (bad signature, malformed structure, empty subject) collapses
    /// to `TokenInvalid`.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // No leeway: a token past its exp is expired, full stop.
        validation.leeway = 0;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid,
        })?;

        if data.claims.sub.is_empty() {
            return Err(AuthError::TokenInvalid.into());
        }

        Ok(data.claims)
    }
}

/// Mint an opaque refresh token: 32 bytes of OS randomness, hex-encoded
/// to 64 ASCII characters. Carries no embedded structure.
pub fn new_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_verify_roundtrip() {
        let signer = TokenSigner::new("test_secret");
        let (token, exp) = signer.issue_access("u-123", 15).unwrap();

        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, "u-123");
        assert_eq!(claims.exp, exp.timestamp());
        assert!(claims.iat <= claims.exp);
    }

    #[test]
    fn tampered_signature_is_invalid() {
        let signer = TokenSigner::new("test_secret");
        let (token, _) = signer.issue_access("u-123", 15).unwrap();

        let mut chars: Vec<char> = token.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();

        match signer.verify(&tampered) {
            Err(AppError::Auth(AuthError::TokenInvalid)) => {}
            other => panic!("expected TokenInvalid, got {:?}", other),
        }
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let signer = TokenSigner::new("test_secret");
        let (token, _) = signer.issue_access("u-123", 15).unwrap();

        let other = TokenSigner::new("other_secret");
        match other.verify(&token) {
            Err(AppError::Auth(AuthError::TokenInvalid)) => {}
            other => panic!("expected TokenInvalid, got {:?}", other),
        }
    }

    #[test]
    fn negative_ttl_is_immediately_expired() {
        let signer = TokenSigner::new("test_secret");
        let (token, _) = signer.issue_access("u-123", -1).unwrap();

        match signer.verify(&token) {
            Err(AppError::Auth(AuthError::TokenExpired)) => {}
            other => panic!("expected TokenExpired, got {:?}", other),
        }
    }

    #[test]
    fn empty_subject_is_invalid() {
        let signer = TokenSigner::new("test_secret");
        let claims = Claims {
            sub: String::new(),
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::minutes(15)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test_secret"),
        )
        .unwrap();

        match signer.verify(&token) {
            Err(AppError::Auth(AuthError::TokenInvalid)) => {}
            other => panic!("expected TokenInvalid, got {:?}", other),
        }
    }

    #[test]
    fn malformed_token_is_invalid() {
        let signer = TokenSigner::new("test_secret");
        match signer.verify("not.a.jwt") {
            Err(AppError::Auth(AuthError::TokenInvalid)) => {}
            other => panic!("expected TokenInvalid, got {:?}", other),
        }
    }

    #[test]
    fn refresh_token_is_64_hex_chars() {
        let token = new_refresh_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        // High-entropy: two mints never collide
        assert_ne!(token, new_refresh_token());
    }
}
