//! Auth Module
//!
//! Bearer JWT 인증 + 역할 기반 권한 검사.
//!
//! # Interview Q&A
//!
//! Q: 토큰에 role이 있는데 왜 매 요청 DB에서 사용자를 다시 읽는가?
//! A: 관리자가 역할을 바꾸거나 계정을 정리한 직후에도 이전 토큰이
//!    만료 전까지 살아있기 때문. 권한 판단은 항상 DB의 현재 상태 기준,
//!    토큰은 신원 증명으로만 쓴다.

pub mod jwt;
pub mod password;

use std::fmt;

use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
use uuid::Uuid;

use crate::{error::ApiError, AppState};

const BEARER: &str = "Bearer ";

/// 사용자 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
    Appraiser,
    Distributor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Appraiser => "appraiser",
            Role::Distributor => "distributor",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            "appraiser" => Some(Role::Appraiser),
            "distributor" => Some(Role::Distributor),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 인증된 요청 주체
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub wallet_address: Option<String>,
}

/// Bearer 토큰을 검증하고 현재 사용자 로드
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, ApiError> {
    let token = jwt_from_header(headers)?;
    let claims = jwt::decode_jwt(&token, &state.config.jwt_secret)?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized)?;

    // 역할 변경/탈퇴 반영을 위해 DB 기준으로 재조회
    let user = state
        .db
        .get_user_by_id(user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let role = Role::parse(&user.role).unwrap_or(Role::User);

    Ok(AuthUser {
        id: user.id,
        email: user.email,
        role,
        wallet_address: user.wallet_address,
    })
}

/// 허용된 역할인지 확인 (admin은 항상 통과)
pub fn require_role(user: &AuthUser, allowed: &[Role]) -> Result<(), ApiError> {
    if user.role == Role::Admin || allowed.contains(&user.role) {
        return Ok(());
    }
    let roles = allowed
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Err(ApiError::Forbidden(format!(
        "requires one of roles: {}",
        roles
    )))
}

fn jwt_from_header(headers: &HeaderMap) -> Result<String, ApiError> {
    let header: &HeaderValue = headers.get(AUTHORIZATION).ok_or(ApiError::Unauthorized)?;
    let auth_header = std::str::from_utf8(header.as_bytes()).map_err(|_| ApiError::Unauthorized)?;
    if !auth_header.starts_with(BEARER) {
        return Err(ApiError::Unauthorized);
    }
    Ok(auth_header.trim_start_matches(BEARER).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_user(role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: "t@example.com".to_string(),
            role,
            wallet_address: None,
        }
    }

    #[test]
    fn test_role_roundtrip() {
        for r in [Role::User, Role::Admin, Role::Appraiser, Role::Distributor] {
            assert_eq!(Role::parse(r.as_str()), Some(r));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn test_require_role_admin_always_passes() {
        let admin = auth_user(Role::Admin);
        assert!(require_role(&admin, &[Role::Distributor]).is_ok());
    }

    #[test]
    fn test_require_role_denies_other_roles() {
        let user = auth_user(Role::User);
        assert!(require_role(&user, &[Role::Appraiser]).is_err());
        let appraiser = auth_user(Role::Appraiser);
        assert!(require_role(&appraiser, &[Role::Appraiser]).is_ok());
    }

    #[test]
    fn test_jwt_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(jwt_from_header(&headers).unwrap(), "abc.def.ghi");

        let mut bad = HeaderMap::new();
        bad.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert!(jwt_from_header(&bad).is_err());

        assert!(jwt_from_header(&HeaderMap::new()).is_err());
    }
}
