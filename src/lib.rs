//! Real Estate Tokenization Platform API Library
//!
//! # Overview
//!
//! 부동산 토큰화 플랫폼의 백엔드 API를 제공합니다.
//! 부동산 등록/승인/토큰화, 지분 매매, 감정평가 승인 워크플로우,
//! 수익 분배 라이프사이클, 그리고 체인 기록을 담당합니다.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                         API                              │
//! │                                                          │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐    │
//! │  │ Routes  │  │Services │  │   DB    │  │  Auth   │    │
//! │  └────┬────┘  └────┬────┘  └────┬────┘  └────┬────┘    │
//! │       │            │            │            │          │
//! │       └────────────┴────────────┴────────────┘          │
//! │                         │                                │
//! └─────────────────────────┼────────────────────────────────┘
//!                           │
//!                           ▼
//!                  ┌────────────────┐
//!                  │   Contracts    │
//!                  └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입 및 처리
//! - `auth`: JWT 인증 + 역할 기반 권한
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `services`: 비즈니스 로직 (체인 게이트웨이, 정산 계산)
//! - `db`: 데이터베이스 연동
//! - `types`: 공통 타입 정의

use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use db::Database;
pub use error::ApiError;
pub use services::BlockchainService;

/// 애플리케이션 전역 상태
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub chain: Arc<BlockchainService>,
    pub config: Arc<Config>,
}
