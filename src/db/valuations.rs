//! Property valuation queries
//!
//! 승인 워크플로우의 상태 전이는 조건부 UPDATE ... RETURNING으로만 일어난다.

use anyhow::Result;
use sqlx::types::Json;
use uuid::Uuid;

use super::{Database, PropertyValuation, ValuationDocument, ValuationFactor};

/// 평가 생성 입력
pub struct NewValuation<'a> {
    pub property_id: Uuid,
    pub appraiser_id: Option<Uuid>,
    pub requested_by: Option<Uuid>,
    pub value: Option<&'a str>,
    pub method: Option<&'a str>,
    pub status: &'a str,
    pub factors: Vec<ValuationFactor>,
    pub documents: Vec<ValuationDocument>,
    pub previous_valuation_id: Option<Uuid>,
}

impl Database {
    pub async fn create_valuation(&self, new: NewValuation<'_>) -> Result<PropertyValuation> {
        let valuation = sqlx::query_as::<_, PropertyValuation>(
            r#"
            INSERT INTO property_valuations (
                id, property_id, appraiser_id, requested_by, value, method,
                status, factors, documents, previous_valuation_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.property_id)
        .bind(new.appraiser_id)
        .bind(new.requested_by)
        .bind(new.value)
        .bind(new.method)
        .bind(new.status)
        .bind(Json(new.factors))
        .bind(Json(new.documents))
        .bind(new.previous_valuation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(valuation)
    }

    pub async fn get_valuation(&self, id: Uuid) -> Result<Option<PropertyValuation>> {
        let valuation =
            sqlx::query_as::<_, PropertyValuation>("SELECT * FROM property_valuations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(valuation)
    }

    /// 부동산의 가장 최근 평가 (previous_valuation 링크용)
    pub async fn latest_valuation_for_property(
        &self,
        property_id: Uuid,
    ) -> Result<Option<PropertyValuation>> {
        let valuation = sqlx::query_as::<_, PropertyValuation>(
            r#"
            SELECT * FROM property_valuations
            WHERE property_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(property_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(valuation)
    }

    pub async fn list_valuations_for_property(
        &self,
        property_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<PropertyValuation>, i64)> {
        let offset = (page as i64) * (limit as i64);

        let valuations = sqlx::query_as::<_, PropertyValuation>(
            r#"
            SELECT * FROM property_valuations
            WHERE property_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(property_id)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM property_valuations WHERE property_id = $1")
                .bind(property_id)
                .fetch_one(&self.pool)
                .await?;

        Ok((valuations, count.0))
    }

    /// 상태 전이 선점: `from` 상태일 때만 `to`로
    pub async fn transition_valuation_status(
        &self,
        id: Uuid,
        from: &str,
        to: &str,
    ) -> Result<Option<PropertyValuation>> {
        let valuation = sqlx::query_as::<_, PropertyValuation>(
            r#"
            UPDATE property_valuations
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;
        Ok(valuation)
    }

    /// 반려 처리 (pending_review에서만)
    pub async fn reject_valuation(
        &self,
        id: Uuid,
        reason: &str,
    ) -> Result<Option<PropertyValuation>> {
        let valuation = sqlx::query_as::<_, PropertyValuation>(
            r#"
            UPDATE property_valuations
            SET status = 'rejected', rejection_reason = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending_review'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?;
        Ok(valuation)
    }

    /// 체인 기록 완료: approved → published + 트랜잭션 해시 기록
    ///
    /// None = 이미 다른 요청이 기록함 (선점 실패)
    pub async fn mark_valuation_recorded(
        &self,
        id: Uuid,
        tx_hash: &str,
        onchain_valuation_id: i64,
    ) -> Result<Option<PropertyValuation>> {
        let valuation = sqlx::query_as::<_, PropertyValuation>(
            r#"
            UPDATE property_valuations
            SET status = 'published', record_tx_hash = $2,
                onchain_valuation_id = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'approved'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(tx_hash)
        .bind(onchain_valuation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(valuation)
    }
}
