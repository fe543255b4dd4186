//! JWT issue/verify (HS256)

use chrono::prelude::*;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;
use crate::error::ApiError;

/// 토큰 클레임
///
/// role은 발급 시점 스냅샷: 권한 검사는 항상 DB의 현재 역할로 한다.
#[derive(Debug, Deserialize, Serialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

pub fn create_jwt(
    user_id: Uuid,
    role: Role,
    secret: &str,
    ttl_secs: i64,
) -> Result<String, ApiError> {
    let expiration = Utc::now()
        .checked_add_signed(chrono::Duration::seconds(ttl_secs))
        .ok_or(ApiError::InternalError)?
        .timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.as_str().to_string(),
        exp: expiration as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("JWT creation failed: {:?}", e);
        ApiError::InternalError
    })
}

pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_jwt_roundtrip() {
        let uid = Uuid::new_v4();
        let token = create_jwt(uid, Role::Appraiser, SECRET, 3600).unwrap();
        let claims = decode_jwt(&token, SECRET).unwrap();
        assert_eq!(claims.sub, uid.to_string());
        assert_eq!(claims.role, "appraiser");
    }

    #[test]
    fn test_jwt_wrong_secret_rejected() {
        let token = create_jwt(Uuid::new_v4(), Role::User, SECRET, 3600).unwrap();
        assert!(decode_jwt(&token, "other-secret").is_err());
    }

    #[test]
    fn test_jwt_expired_rejected() {
        // jsonwebtoken 기본 leeway(60s)를 넘겨서 만료시킴
        let token = create_jwt(Uuid::new_v4(), Role::User, SECRET, -120).unwrap();
        assert!(decode_jwt(&token, SECRET).is_err());
    }
}
