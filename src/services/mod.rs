//! Services Module
//!
//! 비즈니스 로직을 담당하는 서비스 레이어
//!
//! # Services
//! - `BlockchainService`: 블록체인 상호작용 (4개 컨트랙트 + 재시도 정책)
//! - `settlement`: 수익 분배 지분 비례 정산 계산

mod blockchain;
pub mod settlement;

pub use blockchain::{
    BlockchainService, ChainReceipt, MintedProperty, RecordedValuation, RegisteredDistribution,
};
pub use settlement::SettlementError;
