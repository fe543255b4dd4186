//! Income distribution queries
//!
//! 실행/취소는 scheduled 행 선점으로 시작한다: 같은 분배를 두 요청이
//! 동시에 집행하는 경쟁이 원천적으로 불가능하다.

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::types::Json;
use uuid::Uuid;

use super::{Database, IncomeDistribution, OwnershipSnapshot, Receiver};

/// 분배 생성 입력
pub struct NewDistribution<'a> {
    pub property_id: Uuid,
    pub income_type: &'a str,
    pub total_amount: &'a str,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub receivers: Vec<Receiver>,
    pub snapshot: OwnershipSnapshot,
    pub created_by: Uuid,
}

impl Database {
    pub async fn create_distribution(
        &self,
        new: NewDistribution<'_>,
    ) -> Result<IncomeDistribution> {
        let distribution = sqlx::query_as::<_, IncomeDistribution>(
            r#"
            INSERT INTO income_distributions (
                id, property_id, income_type, total_amount, period_start,
                period_end, status, receivers, ownership_snapshot, metadata,
                created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'scheduled', $7, $8, '{}'::jsonb, $9, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.property_id)
        .bind(new.income_type)
        .bind(new.total_amount)
        .bind(new.period_start)
        .bind(new.period_end)
        .bind(Json(new.receivers))
        .bind(Json(new.snapshot))
        .bind(new.created_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(distribution)
    }

    pub async fn get_distribution(&self, id: Uuid) -> Result<Option<IncomeDistribution>> {
        let distribution = sqlx::query_as::<_, IncomeDistribution>(
            "SELECT * FROM income_distributions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(distribution)
    }

    pub async fn list_distributions_for_property(
        &self,
        property_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<IncomeDistribution>, i64)> {
        let offset = (page as i64) * (limit as i64);

        let distributions = sqlx::query_as::<_, IncomeDistribution>(
            r#"
            SELECT * FROM income_distributions
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
            sqlx::query_as("SELECT COUNT(*) FROM income_distributions WHERE property_id = $1")
                .bind(property_id)
                .fetch_one(&self.pool)
                .await?;

        Ok((distributions, count.0))
    }

    /// 체인 등록 결과 기록
    pub async fn mark_distribution_registered(
        &self,
        id: Uuid,
        onchain_distribution_id: i64,
        tx_hash: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE income_distributions
            SET onchain_distribution_id = $2, register_tx_hash = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(onchain_distribution_id)
        .bind(tx_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 실행 선점: scheduled → in_progress
    ///
    /// None = 이미 다른 요청이 선점했거나 scheduled가 아님
    pub async fn claim_distribution_for_execution(
        &self,
        id: Uuid,
    ) -> Result<Option<IncomeDistribution>> {
        let distribution = sqlx::query_as::<_, IncomeDistribution>(
            r#"
            UPDATE income_distributions
            SET status = 'in_progress', updated_at = NOW()
            WHERE id = $1 AND status = 'scheduled'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(distribution)
    }

    /// 취소 선점: scheduled → cancelled
    pub async fn claim_distribution_for_cancel(
        &self,
        id: Uuid,
    ) -> Result<Option<IncomeDistribution>> {
        let distribution = sqlx::query_as::<_, IncomeDistribution>(
            r#"
            UPDATE income_distributions
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status = 'scheduled'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(distribution)
    }

    /// 실행 성공 기록: in_progress → completed + 정산된 수령자 배열
    pub async fn complete_distribution(
        &self,
        id: Uuid,
        receivers: &[Receiver],
        execute_tx_hash: Option<&str>,
    ) -> Result<Option<IncomeDistribution>> {
        let distribution = sqlx::query_as::<_, IncomeDistribution>(
            r#"
            UPDATE income_distributions
            SET status = 'completed', receivers = $2, execute_tx_hash = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'in_progress'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Json(receivers))
        .bind(execute_tx_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(distribution)
    }

    /// 실행 실패 기록: in_progress → failed + 에러를 metadata에 병합
    pub async fn fail_distribution(
        &self,
        id: Uuid,
        receivers: &[Receiver],
        error_message: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE income_distributions
            SET status = 'failed', receivers = $2,
                metadata = metadata || jsonb_build_object('error', $3::text),
                updated_at = NOW()
            WHERE id = $1 AND status = 'in_progress'
            "#,
        )
        .bind(id)
        .bind(Json(receivers))
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 취소 후 체인 호출 실패를 metadata에만 남김
    pub async fn record_distribution_error(&self, id: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE income_distributions
            SET metadata = metadata || jsonb_build_object('error', $2::text),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 부동산별 완료된 분배 총액 (wei 문자열)
    pub async fn sum_distributed_for_property(&self, property_id: Uuid) -> Result<String> {
        let sum: (String,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(total_amount::numeric), 0)::text
            FROM income_distributions
            WHERE property_id = $1 AND status = 'completed'
            "#,
        )
        .bind(property_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum.0)
    }

    /// 플랫폼 전체 완료된 분배 총액 (wei 문자열)
    pub async fn sum_distributed_total(&self) -> Result<String> {
        let sum: (String,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(total_amount::numeric), 0)::text
            FROM income_distributions
            WHERE status = 'completed'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(sum.0)
    }

    /// 사용자가 수령한 분배 총액 (완료된 분배의 receivers JSONB 집계)
    pub async fn sum_received_by_user(&self, user_id: Uuid) -> Result<String> {
        let sum: (String,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM((r->>'amount')::numeric), 0)::text
            FROM income_distributions d,
                 jsonb_array_elements(d.receivers) r
            WHERE d.status = 'completed'
              AND (r->>'user_id')::uuid = $1
              AND r->>'status' = 'completed'
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum.0)
    }

    /// 상태별 분배 수 (관리자 개요)
    pub async fn count_distributions_by_status(&self) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM income_distributions GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    pub async fn count_completed_distributions(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM income_distributions WHERE status = 'completed'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }
}
