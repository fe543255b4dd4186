//! Auth Endpoints
//!
//! 회원가입 / 로그인 / 프로필 / 비밀번호·지갑 변경.
//! 가입 시 역할은 항상 user: 상위 역할은 관리자 경로에서만 부여된다.

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{self, jwt, password, Role},
    db::User,
    error::ApiError,
    types::EthAddress,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/password", put(change_password))
        .route("/wallet", put(update_wallet))
}

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub wallet_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub role: String,
    pub wallet_address: Option<String>,
    pub created_at: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email,
            role: user.role,
            wallet_address: user.wallet_address,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWalletRequest {
    pub wallet_address: String,
}

// ============ Handlers ============

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(axum::http::StatusCode, Json<AuthResponse>), ApiError> {
    validate_email(&req.email)?;
    validate_password(&req.password)?;

    if state.db.email_exists(&req.email).await? {
        return Err(ApiError::BadRequest("email already registered".to_string()));
    }

    let hash = password::hash_password(&req.password)?;
    let user = state
        .db
        .create_user(&req.email, &hash, Role::User.as_str())
        .await?;

    // 지갑 주소는 선택: 형식이 틀리면 가입 자체를 거부
    let user = match &req.wallet_address {
        Some(addr) => {
            let addr = EthAddress::new(addr).map_err(ApiError::ValidationError)?;
            state
                .db
                .update_wallet(user.id, addr.as_str())
                .await?
                .unwrap_or(user)
        }
        None => user,
    };

    tracing::info!("User registered: {}", user.email);

    let token = jwt::create_jwt(
        user.id,
        Role::User,
        &state.config.jwt_secret,
        state.config.jwt_ttl_secs,
    )?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state
        .db
        .get_user_by_email(&req.email)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::Unauthorized);
    }

    let role = Role::parse(&user.role).unwrap_or(Role::User);
    let token = jwt::create_jwt(
        user.id,
        role,
        &state.config.jwt_secret,
        state.config.jwt_ttl_secs,
    )?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>, ApiError> {
    let auth_user = auth::require_user(&state, &headers).await?;
    let user = state
        .db
        .get_user_by_id(auth_user.id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(user.into()))
}

/// PUT /api/auth/password
pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let auth_user = auth::require_user(&state, &headers).await?;
    validate_password(&req.new_password)?;

    let user = state
        .db
        .get_user_by_id(auth_user.id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if !password::verify_password(&req.current_password, &user.password_hash)? {
        return Err(ApiError::BadRequest("current password is wrong".to_string()));
    }

    let hash = password::hash_password(&req.new_password)?;
    state.db.update_password(user.id, &hash).await?;

    Ok(Json(serde_json::json!({ "updated": true })))
}

/// PUT /api/auth/wallet
pub async fn update_wallet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateWalletRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let auth_user = auth::require_user(&state, &headers).await?;

    let addr = EthAddress::new(&req.wallet_address).map_err(ApiError::ValidationError)?;
    let user = state
        .db
        .update_wallet(auth_user.id, addr.as_str())
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(user.into()))
}

// ============ Helpers ============

fn validate_email(email: &str) -> Result<(), ApiError> {
    let valid = email.contains('@')
        && email.len() <= 254
        && !email.starts_with('@')
        && !email.ends_with('@');
    if valid {
        Ok(())
    } else {
        Err(ApiError::ValidationError("invalid email".to_string()))
    }
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::ValidationError(
            "password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@leading.com").is_err());
        assert!(validate_email("trailing@").is_err());
    }

    #[test]
    fn test_validate_password_length() {
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("short").is_err());
    }
}
