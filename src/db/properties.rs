//! Property queries
//!
//! 상태 전이는 전부 조건부 UPDATE ... RETURNING: 읽고-쓰는 사이에 다른
//! 요청이 끼어들 수 없다. None이 돌아오면 선점 실패(이미 전이됨)다.

use anyhow::Result;
use sqlx::types::Json;
use uuid::Uuid;

use super::{Database, IncomeRecord, Property};

/// 부동산 생성 입력 (핸들러의 요청 타입과 분리)
pub struct NewProperty<'a> {
    pub owner_id: Uuid,
    pub name: &'a str,
    pub address: &'a str,
    pub property_type: &'a str,
    pub area_sqm: f64,
    pub description: Option<&'a str>,
    pub appraised_value: &'a str,
    pub status: &'a str,
}

impl Database {
    pub async fn create_property(&self, new: NewProperty<'_>) -> Result<Property> {
        let property = sqlx::query_as::<_, Property>(
            r#"
            INSERT INTO properties (
                id, owner_id, name, address, property_type, area_sqm,
                description, appraised_value, status, is_tokenized,
                income_history, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, '[]'::jsonb, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.owner_id)
        .bind(new.name)
        .bind(new.address)
        .bind(new.property_type)
        .bind(new.area_sqm)
        .bind(new.description)
        .bind(new.appraised_value)
        .bind(new.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(property)
    }

    pub async fn get_property(&self, id: Uuid) -> Result<Option<Property>> {
        let property = sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(property)
    }

    pub async fn list_properties(
        &self,
        status: Option<&str>,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Property>, i64)> {
        let offset = (page as i64) * (limit as i64);

        let properties = sqlx::query_as::<_, Property>(
            r#"
            SELECT * FROM properties
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM properties WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok((properties, count.0))
    }

    pub async fn update_property(
        &self,
        id: Uuid,
        name: &str,
        address: &str,
        property_type: &str,
        area_sqm: f64,
        description: Option<&str>,
    ) -> Result<Option<Property>> {
        let property = sqlx::query_as::<_, Property>(
            r#"
            UPDATE properties
            SET name = $2, address = $3, property_type = $4, area_sqm = $5,
                description = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(address)
        .bind(property_type)
        .bind(area_sqm)
        .bind(description)
        .fetch_optional(&self.pool)
        .await?;
        Ok(property)
    }

    /// 상태 전이 선점: `from` 상태일 때만 `to`로 바꾸고 행을 돌려준다
    pub async fn transition_property_status(
        &self,
        id: Uuid,
        from: &str,
        to: &str,
    ) -> Result<Option<Property>> {
        let property = sqlx::query_as::<_, Property>(
            r#"
            UPDATE properties
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
        Ok(property)
    }

    /// 토큰화 완료 처리
    pub async fn mark_tokenized(&self, id: Uuid, status: &str) -> Result<Option<Property>> {
        let property = sqlx::query_as::<_, Property>(
            r#"
            UPDATE properties
            SET status = $2, is_tokenized = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;
        Ok(property)
    }

    /// 감정가 갱신 (평가 체인 기록 후 호출)
    pub async fn set_appraised_value(&self, id: Uuid, value: &str) -> Result<()> {
        sqlx::query("UPDATE properties SET appraised_value = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 수익 분배 이력 추가 (JSONB 배열 뒤에 붙임)
    pub async fn append_income_history(&self, id: Uuid, record: &IncomeRecord) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE properties
            SET income_history = income_history || $2::jsonb, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(record))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 부동산 검색: 이름/주소 부분 일치 + 상태 + 감정가 범위
    ///
    /// 감정가는 TEXT로 저장되므로 범위 비교만 SQL에서 numeric으로 캐스팅
    pub async fn search_properties(
        &self,
        q: Option<&str>,
        status: Option<&str>,
        min_value: Option<&str>,
        max_value: Option<&str>,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Property>, i64)> {
        let offset = (page as i64) * (limit as i64);
        let pattern = q.map(|s| format!("%{}%", s));

        let properties = sqlx::query_as::<_, Property>(
            r#"
            SELECT * FROM properties
            WHERE ($1::text IS NULL OR name ILIKE $1 OR address ILIKE $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR appraised_value::numeric >= $3::numeric)
              AND ($4::text IS NULL OR appraised_value::numeric <= $4::numeric)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(pattern.as_deref())
        .bind(status)
        .bind(min_value)
        .bind(max_value)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM properties
            WHERE ($1::text IS NULL OR name ILIKE $1 OR address ILIKE $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR appraised_value::numeric >= $3::numeric)
              AND ($4::text IS NULL OR appraised_value::numeric <= $4::numeric)
            "#,
        )
        .bind(pattern.as_deref())
        .bind(status)
        .bind(min_value)
        .bind(max_value)
        .fetch_one(&self.pool)
        .await?;

        Ok((properties, count.0))
    }

    /// 상태별 부동산 수 (관리자 개요)
    pub async fn count_properties_by_status(&self) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM properties GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    pub async fn count_properties(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM properties")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    pub async fn count_tokenized_properties(&self) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM properties WHERE is_tokenized = TRUE")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    /// 토큰화된 부동산의 감정가 합계 (wei 문자열)
    pub async fn sum_tokenized_value(&self) -> Result<String> {
        let sum: (String,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(appraised_value::numeric), 0)::text
            FROM properties WHERE is_tokenized = TRUE
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(sum.0)
    }
}
