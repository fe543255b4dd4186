//! Holdings source abstraction
//!
//! # Interview Q&A
//!
//! Q: Database에 직접 쿼리가 다 있는데 왜 이 trait만 따로 뺐는가?
//! A: 소유 스냅샷은 분배 금액 계산의 입력이고, 그 계산은 DB 없이
//!    검증할 수 있어야 한다.
//!
//!    - 정산 로직 테스트가 Postgres 없이 돈다 (Mock 구현)
//!    - 스냅샷을 "어디서 읽는가"와 "어떻게 나누는가"가 분리됨
//!
//!    나머지 쿼리는 단일 구현(PostgreSQL)뿐이라 trait로 추상화하지 않았다.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::Database;

/// 스냅샷 시점의 지분 보유자
#[derive(Debug, Clone)]
pub struct Holder {
    pub user_id: Uuid,
    pub wallet_address: Option<String>,
    pub quantity: i64,
}

/// 지분 보유 현황 조회 인터페이스
#[async_trait]
pub trait HoldingsSource: Send + Sync {
    async fn holders_of_share(&self, share_id: Uuid) -> Result<Vec<Holder>>;
}

#[async_trait]
impl HoldingsSource for Database {
    async fn holders_of_share(&self, share_id: Uuid) -> Result<Vec<Holder>> {
        let holders = sqlx::query_as::<_, (Uuid, Option<String>, i64)>(
            r#"
            SELECT h.user_id, u.wallet_address, h.quantity
            FROM share_holdings h
            JOIN users u ON u.id = h.user_id
            WHERE h.share_id = $1 AND h.quantity > 0
            ORDER BY h.quantity DESC, h.user_id
            "#,
        )
        .bind(share_id)
        .fetch_all(self.pool())
        .await?
        .into_iter()
        .map(|(user_id, wallet_address, quantity)| Holder {
            user_id,
            wallet_address,
            quantity,
        })
        .collect();

        Ok(holders)
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    pub struct MockHoldingsSource {
        holders: RwLock<HashMap<Uuid, Vec<Holder>>>,
    }

    impl MockHoldingsSource {
        pub fn new() -> Self {
            Self {
                holders: RwLock::new(HashMap::new()),
            }
        }

        pub fn set_holders(&self, share_id: Uuid, holders: Vec<Holder>) {
            self.holders.write().unwrap().insert(share_id, holders);
        }
    }

    #[async_trait]
    impl HoldingsSource for MockHoldingsSource {
        async fn holders_of_share(&self, share_id: Uuid) -> Result<Vec<Holder>> {
            let holders = self.holders.read().unwrap();
            Ok(holders.get(&share_id).cloned().unwrap_or_default())
        }
    }
}
