//! Admin Endpoints
//!
//! 전부 admin 역할 전용: 사용자 관리 + 플랫폼 개요

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::UserProfile;
use crate::{
    auth::{self, Role},
    error::ApiError,
    types::{PageQuery, Pagination},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/role", put(update_user_role))
        .route("/overview", get(overview))
}

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserProfile>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub users_by_role: Vec<CountRow>,
    pub properties_by_status: Vec<CountRow>,
    pub distributions_by_status: Vec<CountRow>,
}

#[derive(Debug, Serialize)]
pub struct CountRow {
    pub key: String,
    pub count: i64,
}

// ============ Handlers ============

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    auth::require_role(&user, &[Role::Admin])?;

    let (page, limit) = (query.page(), query.limit());
    let (users, total) = state.db.list_users(page, limit).await?;

    Ok(Json(UserListResponse {
        users: users.into_iter().map(Into::into).collect(),
        pagination: Pagination::build(page, limit, total),
    }))
}

/// PUT /api/admin/users/:id/role
pub async fn update_user_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    auth::require_role(&user, &[Role::Admin])?;

    let role = Role::parse(&req.role)
        .ok_or_else(|| ApiError::ValidationError(format!("unknown role: {}", req.role)))?;

    let updated = state
        .db
        .update_role(id, role.as_str())
        .await?
        .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

    tracing::info!("Role of {} changed to {} by {}", id, role, user.id);

    Ok(Json(updated.into()))
}

/// GET /api/admin/overview
pub async fn overview(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OverviewResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    auth::require_role(&user, &[Role::Admin])?;

    let users_by_role = state.db.count_users_by_role().await?;
    let properties_by_status = state.db.count_properties_by_status().await?;
    let distributions_by_status = state.db.count_distributions_by_status().await?;

    let rows = |v: Vec<(String, i64)>| {
        v.into_iter()
            .map(|(key, count)| CountRow { key, count })
            .collect::<Vec<_>>()
    };

    Ok(Json(OverviewResponse {
        users_by_role: rows(users_by_role),
        properties_by_status: rows(properties_by_status),
        distributions_by_status: rows(distributions_by_status),
    }))
}
