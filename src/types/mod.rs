//! Common Types Module
//!
//! 애플리케이션 전반에서 사용되는 공통 타입 정의
//!
//! 금액은 전부 wei 단위의 10진수 문자열로 직렬화된다.
//! float이 돈을 만지는 경로는 없음: 수익률도 정수(basis point)로 계산.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 금액 타입 (wei, 문자열 인코딩)
///
/// # Interview Q&A
///
/// Q: 왜 u128이고 왜 문자열로 직렬화하는가?
/// A: wei 단위 부동산 가격은 i64 범위(9.2e18)를 쉽게 넘는다.
///    - u128: 1e38까지 표현, 체인의 uint256 실사용 범위를 커버
///    - JSON number는 f64로 해석되는 클라이언트가 많아 정밀도 손실
///    - 따라서 wire/DB 모두 10진수 문자열, 내부 연산만 u128
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Wei(u128);

impl Wei {
    pub const ZERO: Wei = Wei(0);

    pub fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn checked_add(&self, other: Wei) -> Option<Wei> {
        self.0.checked_add(other.0).map(Wei)
    }

    pub fn checked_sub(&self, other: Wei) -> Option<Wei> {
        self.0.checked_sub(other.0).map(Wei)
    }

    /// 정수 곱 (수량 x 단가 계산용)
    pub fn checked_mul_u64(&self, factor: u64) -> Option<Wei> {
        self.0.checked_mul(factor as u128).map(Wei)
    }

    /// floor(self * num / den): 지분 비례 배분 계산용
    ///
    /// den이 0이거나 중간 곱이 오버플로우하면 None
    pub fn mul_div_floor(&self, num: u64, den: u64) -> Option<Wei> {
        if den == 0 {
            return None;
        }
        self.0
            .checked_mul(num as u128)
            .map(|v| Wei(v / den as u128))
    }

    /// basis point 단위 비율: floor(part * 10_000 / self)
    ///
    /// self가 0이면 None (0원 대비 수익률은 정의하지 않음)
    pub fn ratio_bps(&self, part: Wei) -> Option<u64> {
        if self.0 == 0 {
            return None;
        }
        part.0
            .checked_mul(10_000)
            .map(|v| (v / self.0) as u64)
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Wei {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u128>()
            .map(Wei)
            .map_err(|_| format!("invalid wei amount: {}", s))
    }
}

impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Ethereum 주소 타입
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthAddress(String);

impl EthAddress {
    pub fn new(addr: &str) -> Result<Self, String> {
        let addr = addr.to_lowercase();
        if addr.starts_with("0x")
            && addr.len() == 42
            && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
        {
            Ok(Self(addr))
        } else {
            Err("Invalid Ethereum address format".to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

// ============ 페이지네이션 ============

/// 페이지네이션 쿼리 파라미터
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// 페이지 (0부터 시작)
    pub page: Option<u32>,
    /// 페이지 크기 (기본 20, 최대 100)
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(0)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }
}

/// 페이지네이션 응답
#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub has_next: bool,
}

impl Pagination {
    pub fn build(page: u32, limit: u32, total: i64) -> Self {
        let total = total.max(0) as u64;
        Self {
            page,
            limit,
            total,
            has_next: ((page as u64 + 1) * limit as u64) < total,
        }
    }
}

// ============ 상태값 ============

/// 부동산 등록/토큰화 상태 (원 플랫폼의 한국어 상태값 유지)
pub mod property_status {
    /// 등록 신청 직후
    pub const PENDING_REGISTRATION: &str = "등록대기";
    /// 관리자 승인 완료
    pub const REGISTERED: &str = "등록완료";
    /// 토큰화 진행 중 (체인 호출 전 선점 상태)
    pub const TOKENIZATION_PENDING: &str = "토큰화대기";
    /// 토큰화 완료: 지분 발행/수익 분배 가능
    pub const TOKENIZED: &str = "토큰화완료";

    pub const ALL: [&str; 4] = [
        PENDING_REGISTRATION,
        REGISTERED,
        TOKENIZATION_PENDING,
        TOKENIZED,
    ];

    pub fn is_valid(s: &str) -> bool {
        ALL.contains(&s)
    }
}

/// 거래 상태
pub mod tx_status {
    pub const PENDING: &str = "대기중";
    pub const COMPLETED: &str = "완료";
    pub const FAILED: &str = "실패";
}

/// 수익 분배 상태 머신
///
/// scheduled → in_progress → {completed, failed}
/// scheduled → cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    Scheduled,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl DistributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionStatus::Scheduled => "scheduled",
            DistributionStatus::InProgress => "in_progress",
            DistributionStatus::Completed => "completed",
            DistributionStatus::Failed => "failed",
            DistributionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(DistributionStatus::Scheduled),
            "in_progress" => Some(DistributionStatus::InProgress),
            "completed" => Some(DistributionStatus::Completed),
            "failed" => Some(DistributionStatus::Failed),
            "cancelled" => Some(DistributionStatus::Cancelled),
            _ => None,
        }
    }
}

/// 분배 수령자별 상태
///
/// pending → processing → {completed, failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ReceiverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiverStatus::Pending => "pending",
            ReceiverStatus::Processing => "processing",
            ReceiverStatus::Completed => "completed",
            ReceiverStatus::Failed => "failed",
        }
    }
}

/// 감정평가 승인 워크플로우 상태
///
/// draft → pending_review → {approved, rejected}
/// approved → published (체인 기록 완료)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationStatus {
    Draft,
    PendingReview,
    Approved,
    Rejected,
    Published,
}

impl ValuationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValuationStatus::Draft => "draft",
            ValuationStatus::PendingReview => "pending_review",
            ValuationStatus::Approved => "approved",
            ValuationStatus::Rejected => "rejected",
            ValuationStatus::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ValuationStatus::Draft),
            "pending_review" => Some(ValuationStatus::PendingReview),
            "approved" => Some(ValuationStatus::Approved),
            "rejected" => Some(ValuationStatus::Rejected),
            "published" => Some(ValuationStatus::Published),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wei_parse_and_display() {
        let w: Wei = "1000000000000000000".parse().unwrap();
        assert_eq!(w.value(), 1_000_000_000_000_000_000);
        assert_eq!(w.to_string(), "1000000000000000000");

        assert!("".parse::<Wei>().is_err());
        assert!("-5".parse::<Wei>().is_err());
        assert!("1.5".parse::<Wei>().is_err());
    }

    #[test]
    fn test_wei_serde_as_string() {
        let w = Wei::new(42);
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, "\"42\"");

        let back: Wei = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn test_wei_mul_div_floor() {
        let total = Wei::new(1_000);
        // 3/7 지분 → floor(1000 * 3 / 7) = 428
        assert_eq!(total.mul_div_floor(3, 7).unwrap().value(), 428);
        assert!(total.mul_div_floor(1, 0).is_none());
    }

    #[test]
    fn test_wei_ratio_bps() {
        let appraised = Wei::new(1_000_000);
        let income = Wei::new(55_000);
        // 5.5% = 550bp
        assert_eq!(appraised.ratio_bps(income).unwrap(), 550);
        assert!(Wei::ZERO.ratio_bps(income).is_none());
    }

    #[test]
    fn test_eth_address_valid() {
        let addr = EthAddress::new("0x1234567890123456789012345678901234567890");
        assert!(addr.is_ok());
    }

    #[test]
    fn test_eth_address_invalid() {
        assert!(EthAddress::new("invalid").is_err());
        assert!(EthAddress::new("0x12345").is_err());
    }

    #[test]
    fn test_pagination_has_next() {
        let p = Pagination::build(0, 20, 45);
        assert!(p.has_next);
        let p = Pagination::build(2, 20, 45);
        assert!(!p.has_next);
    }

    #[test]
    fn test_distribution_status_roundtrip() {
        for s in [
            DistributionStatus::Scheduled,
            DistributionStatus::InProgress,
            DistributionStatus::Completed,
            DistributionStatus::Failed,
            DistributionStatus::Cancelled,
        ] {
            assert_eq!(DistributionStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(DistributionStatus::parse("unknown"), None);
    }

    #[test]
    fn test_valuation_status_serde_matches_as_str() {
        let json = serde_json::to_string(&ValuationStatus::PendingReview).unwrap();
        assert_eq!(json, "\"pending_review\"");
        assert_eq!(ValuationStatus::PendingReview.as_str(), "pending_review");
    }

    #[test]
    fn test_property_status_values() {
        assert!(property_status::is_valid("토큰화완료"));
        assert!(!property_status::is_valid("없는상태"));
    }
}
