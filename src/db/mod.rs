//! Database Module
//!
//! # Interview Q&A
//!
//! Q: 문서형 원본 데이터를 왜 PostgreSQL에 얹었는가?
//! A: 부동산/지분/분배 레코드는 관계가 명확한 정형 데이터고,
//!    임베디드 배열(수령자, 평가 요소 등)은 JSONB가 그대로 받아준다.
//!
//!    1. ACID 트랜잭션: 금융 데이터 무결성 보장
//!    2. JSONB: 수령자 배열/스냅샷 같은 문서형 필드 저장 용이
//!    3. 조건부 UPDATE ... RETURNING: 상태 전이 선점(claim)을 한 문장으로
//!    4. 인덱싱: 부동산별, 사용자별 조회 최적화
//!    5. 생태계: SQLx, Diesel 등 Rust 라이브러리 지원
//!
//! Q: 커넥션 풀은 어떻게 관리하는가?
//! A: SQLx의 PgPool 사용
//!    - 최소/최대 커넥션 수 설정
//!    - 커넥션 재사용 (오버헤드 감소)
//!    - 자동 health check
//!    - 타임아웃 처리

mod distributions;
mod models;
mod notifications;
mod properties;
pub mod repository;
mod shares;
mod tokens;
mod users;
mod valuations;

pub use distributions::NewDistribution;
pub use models::*;
pub use properties::NewProperty;
pub use repository::{Holder, HoldingsSource};
pub use shares::HoldingView;
pub use valuations::NewValuation;

use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// 데이터베이스 연결 및 쿼리 담당
///
/// 도메인별 쿼리는 같은 타입에 대한 impl 블록으로 나뉘어 있다:
/// users / properties / shares / tokens / valuations / distributions /
/// notifications
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 10 (트래픽에 따라 조정)
    /// - min_connections: 1 (idle 시 최소 유지)
    /// - acquire_timeout: 3초 (커넥션 획득 대기)
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
