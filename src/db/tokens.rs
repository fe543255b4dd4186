//! Token + transaction log queries

use anyhow::Result;
use uuid::Uuid;

use super::{Database, Token, Transaction};

impl Database {
    /// 토큰 메타데이터 생성 (민팅 전: 체인 정보는 비어 있음)
    pub async fn create_token(
        &self,
        property_id: Uuid,
        name: &str,
        symbol: &str,
        total_supply: i64,
    ) -> Result<Token> {
        let token = sqlx::query_as::<_, Token>(
            r#"
            INSERT INTO tokens (id, property_id, name, symbol, total_supply, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(property_id)
        .bind(name)
        .bind(symbol)
        .bind(total_supply)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    /// 민팅 결과 기록
    pub async fn mark_token_minted(
        &self,
        id: Uuid,
        contract_address: &str,
        onchain_token_id: i64,
        tx_hash: &str,
    ) -> Result<Option<Token>> {
        let token = sqlx::query_as::<_, Token>(
            r#"
            UPDATE tokens
            SET contract_address = $2, onchain_token_id = $3, mint_tx_hash = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(contract_address)
        .bind(onchain_token_id)
        .bind(tx_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    pub async fn get_token(&self, id: Uuid) -> Result<Option<Token>> {
        let token = sqlx::query_as::<_, Token>("SELECT * FROM tokens WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(token)
    }

    pub async fn get_token_by_property(&self, property_id: Uuid) -> Result<Option<Token>> {
        let token = sqlx::query_as::<_, Token>("SELECT * FROM tokens WHERE property_id = $1")
            .bind(property_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(token)
    }

    pub async fn list_tokens(&self, page: u32, limit: u32) -> Result<(Vec<Token>, i64)> {
        let offset = (page as i64) * (limit as i64);

        let tokens = sqlx::query_as::<_, Token>(
            "SELECT * FROM tokens ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tokens")
            .fetch_one(&self.pool)
            .await?;

        Ok((tokens, count.0))
    }

    // ============ 거래 로그 ============

    pub async fn insert_transaction(
        &self,
        share_id: Uuid,
        user_id: Uuid,
        tx_type: &str,
        quantity: i64,
        amount: &str,
        status: &str,
    ) -> Result<Transaction> {
        let tx = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (id, share_id, user_id, tx_type, quantity, amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(share_id)
        .bind(user_id)
        .bind(tx_type)
        .bind(quantity)
        .bind(amount)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok(tx)
    }

    /// 거래 정산: 상태 + 체인 해시 기록
    pub async fn settle_transaction(
        &self,
        id: Uuid,
        status: &str,
        tx_hash: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE transactions SET status = $2, tx_hash = $3 WHERE id = $1")
            .bind(id)
            .bind(status)
            .bind(tx_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 토큰 기준 거래 이력 (share 경유 조인, 페이지네이션)
    pub async fn list_transactions_by_token(
        &self,
        token_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Transaction>, i64)> {
        let offset = (page as i64) * (limit as i64);

        let txs = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT t.* FROM transactions t
            JOIN shares s ON s.id = t.share_id
            WHERE s.token_id = $1
            ORDER BY t.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(token_id)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM transactions t
            JOIN shares s ON s.id = t.share_id
            WHERE s.token_id = $1
            "#,
        )
        .bind(token_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((txs, count.0))
    }

    pub async fn count_transactions(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transactions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
