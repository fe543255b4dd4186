//! Database Models
//!
//! Data models for the tokenization platform.
//! 임베디드 배열(수령자, 평가 요소, 첨부 문서, 수익 이력)은 JSONB 컬럼으로
//! 저장하고 `sqlx::types::Json`으로 매핑한다.
//! 금액 컬럼은 전부 wei 10진수 문자열(TEXT): 모델에서는 String으로 들고
//! 핸들러/서비스에서 `Wei`로 파싱한다.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::ReceiverStatus;

/// 사용자 계정
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    /// Ethereum 지갑 주소 (lowercase, 선택)
    pub wallet_address: Option<String>,
    /// 역할
    /// - user: 일반 투자자
    /// - admin: 플랫폼 관리자
    /// - appraiser: 감정평가사
    /// - distributor: 수익 분배 담당자
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 부동산
#[derive(Debug, Clone, FromRow)]
pub struct Property {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub address: String,
    /// 건물 유형 (아파트, 오피스텔, 상가 등 자유 문자열)
    pub property_type: String,
    pub area_sqm: f64,
    pub description: Option<String>,
    /// 감정가 (wei 문자열)
    pub appraised_value: String,
    /// 상태: 등록대기 → 등록완료 → 토큰화대기 → 토큰화완료
    pub status: String,
    pub is_tokenized: bool,
    /// 수익 분배 이력 (임베디드 배열)
    pub income_history: Json<Vec<IncomeRecord>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 부동산에 누적되는 수익 분배 이력 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeRecord {
    pub distribution_id: Uuid,
    pub income_type: String,
    /// wei 문자열
    pub total_amount: String,
    pub distributed_at: DateTime<Utc>,
}

/// 토큰 (ERC 스타일 메타데이터)
#[derive(Debug, Clone, FromRow)]
pub struct Token {
    pub id: Uuid,
    pub property_id: Uuid,
    pub contract_address: Option<String>,
    /// 체인상 토큰 ID (민팅 후 채워짐)
    pub onchain_token_id: Option<i64>,
    pub name: String,
    pub symbol: String,
    pub total_supply: i64,
    pub mint_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 지분 트랜치: 토큰화된 부동산의 분할 소유권 단위
#[derive(Debug, Clone, FromRow)]
pub struct Share {
    pub id: Uuid,
    pub property_id: Uuid,
    pub token_id: Uuid,
    pub total_shares: i64,
    pub available_shares: i64,
    /// 1주 가격 (wei 문자열)
    pub price_per_share: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 사용자별 지분 보유량
#[derive(Debug, Clone, FromRow)]
pub struct ShareHolding {
    pub share_id: Uuid,
    pub user_id: Uuid,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

/// 지분 매매 거래 로그
#[derive(Debug, Clone, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub share_id: Uuid,
    pub user_id: Uuid,
    /// 거래 유형
    /// - buy: 매수
    /// - sell: 매도
    pub tx_type: String,
    pub quantity: i64,
    /// 거래 금액 (wei 문자열)
    pub amount: String,
    /// 상태: 대기중 / 완료 / 실패
    pub status: String,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 감정평가 이벤트
#[derive(Debug, Clone, FromRow)]
pub struct PropertyValuation {
    pub id: Uuid,
    pub property_id: Uuid,
    /// 평가를 작성한 감정평가사 (요청만 된 건은 None)
    pub appraiser_id: Option<Uuid>,
    /// 평가를 요청한 사용자
    pub requested_by: Option<Uuid>,
    /// 평가액 (wei 문자열, 요청 단계에서는 None)
    pub value: Option<String>,
    /// 평가 방법 (거래사례비교법, 수익환원법 등 자유 문자열)
    pub method: Option<String>,
    /// 상태: draft → pending_review → {approved, rejected}, approved → published
    pub status: String,
    pub factors: Json<Vec<ValuationFactor>>,
    pub documents: Json<Vec<ValuationDocument>>,
    /// 직전 평가로의 역참조 (소유 아님)
    pub previous_valuation_id: Option<Uuid>,
    pub rejection_reason: Option<String>,
    /// 체인 기록 트랜잭션 해시 (published 상태에서만 존재)
    pub record_tx_hash: Option<String>,
    pub onchain_valuation_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 평가 요소 (가중치는 basis point)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationFactor {
    pub name: String,
    pub weight_bps: i32,
    pub note: Option<String>,
}

/// 평가 첨부 문서
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationDocument {
    pub name: String,
    pub uri: String,
    pub doc_type: String,
}

/// 수익 분배 이벤트
#[derive(Debug, Clone, FromRow)]
pub struct IncomeDistribution {
    pub id: Uuid,
    pub property_id: Uuid,
    /// 수익 유형
    /// - rent: 임대 수익
    /// - sale: 매각 수익
    /// - other: 기타
    pub income_type: String,
    /// 분배 총액 (wei 문자열)
    pub total_amount: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// 상태: scheduled → in_progress → {completed, failed}, scheduled → cancelled
    pub status: String,
    pub receivers: Json<Vec<Receiver>>,
    pub ownership_snapshot: Json<OwnershipSnapshot>,
    /// 체인 등록 정보 (등록된 경우에만)
    pub onchain_distribution_id: Option<i64>,
    pub register_tx_hash: Option<String>,
    pub execute_tx_hash: Option<String>,
    pub metadata: Json<serde_json::Value>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 분배 수령자 (지분 비례 정산 단위)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receiver {
    pub user_id: Uuid,
    pub wallet_address: Option<String>,
    /// 스냅샷 시점 보유 지분 수
    pub shares: i64,
    /// 이 수령자 몫 (wei 문자열)
    pub amount: String,
    pub status: ReceiverStatus,
    pub failure_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 분배 생성 시점의 소유 구조 스냅샷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipSnapshot {
    pub taken_at: DateTime<Utc>,
    pub total_shares: i64,
    pub holder_count: i64,
}

/// 알림
#[derive(Debug, Clone, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    /// 알림 종류
    /// - valuation_approved / valuation_rejected / valuation_published
    /// - income_distributed
    /// - share_purchased / share_sold
    pub kind: String,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receiver_json_roundtrip() {
        let r = Receiver {
            user_id: Uuid::new_v4(),
            wallet_address: Some("0x1234567890123456789012345678901234567890".into()),
            shares: 300,
            amount: "428571428571428571".into(),
            status: ReceiverStatus::Pending,
            failure_reason: None,
            completed_at: None,
        };
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"pending\""));
        let back: Receiver = serde_json::from_str(&json).unwrap();
        assert_eq!(back.shares, 300);
        assert_eq!(back.status, ReceiverStatus::Pending);
    }
}
