//! Notification Endpoints
//!
//! 본인 알림 조회/읽음 처리. 알림 생성은 각 도메인 핸들러가
//! 이벤트(평가 승인, 분배 완료, 매매 정산) 시점에 한다.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{auth, db::Notification, error::ApiError, types::Pagination, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", post(mark_read))
        .route("/read-all", post(mark_all_read))
}

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    /// true면 안 읽은 알림만
    pub unread: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct NotificationView {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: String,
}

impl From<Notification> for NotificationView {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id.to_string(),
            kind: n.kind,
            title: n.title,
            body: n.body,
            read: n.read,
            created_at: n.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationView>,
    pub unread_count: i64,
    pub pagination: Pagination,
}

// ============ Handlers ============

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;

    let page = query.page.unwrap_or(0);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let unread_only = query.unread.unwrap_or(false);

    let (notifications, total) = state
        .db
        .list_notifications(user.id, unread_only, page, limit)
        .await?;
    let unread_count = state.db.unread_notification_count(user.id).await?;

    Ok(Json(NotificationListResponse {
        notifications: notifications.into_iter().map(Into::into).collect(),
        unread_count,
        pagination: Pagination::build(page, limit, total),
    }))
}

/// POST /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;

    // 남의 알림은 404로 취급
    let updated = state.db.mark_notification_read(id, user.id).await?;
    if !updated {
        return Err(ApiError::NotFound("Notification".to_string()));
    }

    Ok(Json(serde_json::json!({ "read": true })))
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    let updated = state.db.mark_all_notifications_read(user.id).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}
