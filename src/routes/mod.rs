//! API Routes Module
//!
//! 모든 HTTP 엔드포인트 정의
//!
//! # Routes
//! - `/health` - 헬스 체크
//! - `/api/auth/*` - 가입/로그인/프로필
//! - `/api/properties/*` - 부동산 등록/승인/토큰화
//! - `/api/shares/*` - 지분 매매/보유 현황
//! - `/api/tokens/*` - 토큰 메타데이터/거래 이력
//! - `/api/valuations/*` - 감정평가 승인 워크플로우
//! - `/api/incomes/*` - 수익 분배 라이프사이클
//! - `/api/analytics/*` - 플랫폼/부동산/포트폴리오 지표
//! - `/api/notifications/*` - 알림
//! - `/api/search/*` - 부동산 검색
//! - `/api/admin/*` - 사용자/플랫폼 관리

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod health;
pub mod incomes;
pub mod notifications;
pub mod properties;
pub mod search;
pub mod shares;
pub mod tokens;
pub mod valuations;

use uuid::Uuid;

use crate::AppState;

/// 알림 생성: 실패해도 호출한 작업을 막지 않는다 (로그만)
pub(crate) async fn notify_quietly(
    state: &AppState,
    user_id: Uuid,
    kind: &str,
    title: &str,
    body: &str,
) {
    if let Err(e) = state
        .db
        .insert_notification(user_id, kind, title, body)
        .await
    {
        tracing::warn!("Failed to insert notification: {:?}", e);
    }
}
