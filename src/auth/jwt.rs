use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub tid: Uuid,
    pub rid: Uuid,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(identity: Identity, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: identity.user_id,
            tid: identity.tenant_id,
            rid: identity.role_id,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.sub,
            tenant_id: self.tid,
            role_id: self.rid,
        }
    }
}

pub fn encode_token(claims: &Claims, secret: &[u8]) -> Result<String, AppError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AppError::internal(format!("JWT encode failed: {e}")))
}

/// Signature and expiry only; no storage lookup.
pub fn decode_token(token: &str, secret: &[u8]) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            JwtErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidSignature,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"unit-test-secret-unit-test-secret";

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::now_v7(),
            tenant_id: Uuid::now_v7(),
            role_id: Uuid::now_v7(),
        }
    }

    #[test]
    fn claims_carry_identity() {
        let id = identity();
        let token = encode_token(&Claims::new(id, Utc::now(), Duration::minutes(5)), SECRET).unwrap();
        let claims = decode_token(&token, SECRET).unwrap();
        assert_eq!(claims.identity(), id);
        assert_eq!(claims.exp - claims.iat, 300);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let issued = Utc::now() - Duration::hours(1);
        let token = encode_token(&Claims::new(identity(), issued, Duration::minutes(5)), SECRET).unwrap();
        assert!(matches!(decode_token(&token, SECRET), Err(AppError::TokenExpired)));
    }

    #[test]
    fn wrong_secret_is_invalid_signature() {
        let token = encode_token(&Claims::new(identity(), Utc::now(), Duration::minutes(5)), SECRET).unwrap();
        let result = decode_token(&token, b"another-secret-another-secret-xx");
        assert!(matches!(result, Err(AppError::InvalidSignature)));
        assert!(matches!(decode_token("not.a.jwt", SECRET), Err(AppError::InvalidSignature)));
    }
}
