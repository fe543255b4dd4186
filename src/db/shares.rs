//! Share tranche + holdings queries
//!
//! 가용 수량과 보유 수량 변경은 전부 조건부 UPDATE 한 문장.
//! 읽고 나서 쓰는 방식은 동시 매수 요청이 같은 잔량을 두 번 파는
//! 경쟁을 만든다: 여기서는 문장 단위 원자성으로 막는다.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::{Database, Share, ShareHolding};

/// 포트폴리오 조회용 조인 행
#[derive(Debug, Clone, FromRow)]
pub struct HoldingView {
    pub share_id: Uuid,
    pub property_id: Uuid,
    pub property_name: String,
    pub quantity: i64,
    pub total_shares: i64,
    /// wei 문자열
    pub price_per_share: String,
    pub updated_at: DateTime<Utc>,
}

impl Database {
    pub async fn create_share(
        &self,
        property_id: Uuid,
        token_id: Uuid,
        total_shares: i64,
        price_per_share: &str,
    ) -> Result<Share> {
        let share = sqlx::query_as::<_, Share>(
            r#"
            INSERT INTO shares (
                id, property_id, token_id, total_shares, available_shares,
                price_per_share, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $4, $5, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(property_id)
        .bind(token_id)
        .bind(total_shares)
        .bind(price_per_share)
        .fetch_one(&self.pool)
        .await?;

        Ok(share)
    }

    pub async fn get_share(&self, id: Uuid) -> Result<Option<Share>> {
        let share = sqlx::query_as::<_, Share>("SELECT * FROM shares WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(share)
    }

    pub async fn get_share_by_property(&self, property_id: Uuid) -> Result<Option<Share>> {
        let share = sqlx::query_as::<_, Share>("SELECT * FROM shares WHERE property_id = $1")
            .bind(property_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(share)
    }

    /// 가용 지분 선점: 잔량이 충분할 때만 차감하고 행을 돌려준다
    ///
    /// None = 잔량 부족 (또는 없는 트랜치)
    pub async fn claim_available_shares(&self, share_id: Uuid, qty: i64) -> Result<Option<Share>> {
        let share = sqlx::query_as::<_, Share>(
            r#"
            UPDATE shares
            SET available_shares = available_shares - $2, updated_at = NOW()
            WHERE id = $1 AND available_shares >= $2
            RETURNING *
            "#,
        )
        .bind(share_id)
        .bind(qty)
        .fetch_optional(&self.pool)
        .await?;
        Ok(share)
    }

    /// 가용 지분 복원 (체인 전송 실패 보상, 매도)
    pub async fn restore_available_shares(&self, share_id: Uuid, qty: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE shares
            SET available_shares = LEAST(available_shares + $2, total_shares),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(share_id)
        .bind(qty)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_holding(
        &self,
        share_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ShareHolding>> {
        let holding = sqlx::query_as::<_, ShareHolding>(
            "SELECT share_id, user_id, quantity, updated_at FROM share_holdings WHERE share_id = $1 AND user_id = $2",
        )
        .bind(share_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(holding)
    }

    /// 보유량 증가 (없으면 생성)
    pub async fn add_to_holding(&self, share_id: Uuid, user_id: Uuid, qty: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO share_holdings (share_id, user_id, quantity, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (share_id, user_id)
            DO UPDATE SET quantity = share_holdings.quantity + EXCLUDED.quantity,
                          updated_at = NOW()
            "#,
        )
        .bind(share_id)
        .bind(user_id)
        .bind(qty)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 보유량 차감 선점: 충분할 때만 차감
    ///
    /// false = 보유량 부족
    pub async fn take_from_holding(
        &self,
        share_id: Uuid,
        user_id: Uuid,
        qty: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE share_holdings
            SET quantity = quantity - $3, updated_at = NOW()
            WHERE share_id = $1 AND user_id = $2 AND quantity >= $3
            "#,
        )
        .bind(share_id)
        .bind(user_id)
        .bind(qty)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 사용자의 전체 보유 현황 (부동산 이름 포함)
    pub async fn holdings_for_user(&self, user_id: Uuid) -> Result<Vec<HoldingView>> {
        let rows = sqlx::query_as::<_, HoldingView>(
            r#"
            SELECT h.share_id, s.property_id, p.name AS property_name,
                   h.quantity, s.total_shares, s.price_per_share, h.updated_at
            FROM share_holdings h
            JOIN shares s ON s.id = h.share_id
            JOIN properties p ON p.id = s.property_id
            WHERE h.user_id = $1 AND h.quantity > 0
            ORDER BY h.updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
