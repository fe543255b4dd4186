//! Pro-rata Settlement
//!
//! 수익 분배의 수령자 목록 계산.
//!
//! # Invariants
//!
//! 생성된 수령자 배열은 항상 다음을 만족한다 (위반은 버그, 저장 전 검증):
//! - Σ receivers[].shares == snapshot.total_shares
//! - Σ receivers[].amount == total_amount
//!
//! 정수 나눗셈 나머지는 최대 보유자(동률이면 먼저 온 쪽)에게 귀속된다.

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{Holder, HoldingsSource, OwnershipSnapshot, Receiver};
use crate::types::{ReceiverStatus, Wei};

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("no shareholders to distribute to")]
    NoHolders,

    #[error("settlement arithmetic overflow")]
    Overflow,

    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

/// 현재 보유 현황을 스냅샷해서 수령자 목록을 만든다
pub async fn snapshot_receivers(
    source: &dyn HoldingsSource,
    share_id: Uuid,
    total_amount: Wei,
) -> Result<(Vec<Receiver>, OwnershipSnapshot), SettlementError> {
    let holders = source.holders_of_share(share_id).await?;
    build_receivers(&holders, total_amount)
}

/// 보유자 목록 → 지분 비례 수령자 배열 + 스냅샷
pub fn build_receivers(
    holders: &[Holder],
    total_amount: Wei,
) -> Result<(Vec<Receiver>, OwnershipSnapshot), SettlementError> {
    let total_shares: i64 = holders.iter().map(|h| h.quantity).sum();
    if holders.is_empty() || total_shares <= 0 {
        return Err(SettlementError::NoHolders);
    }

    let mut receivers = Vec::with_capacity(holders.len());
    let mut assigned = Wei::ZERO;

    for holder in holders {
        let amount = total_amount
            .mul_div_floor(holder.quantity as u64, total_shares as u64)
            .ok_or(SettlementError::Overflow)?;
        assigned = assigned
            .checked_add(amount)
            .ok_or(SettlementError::Overflow)?;

        receivers.push(Receiver {
            user_id: holder.user_id,
            wallet_address: holder.wallet_address.clone(),
            shares: holder.quantity,
            amount: amount.to_string(),
            status: ReceiverStatus::Pending,
            failure_reason: None,
            completed_at: None,
        });
    }

    // floor 나눗셈 나머지 → 최대 보유자에게
    let remainder = total_amount
        .checked_sub(assigned)
        .ok_or(SettlementError::Overflow)?;
    if remainder.value() > 0 {
        let idx = receivers
            .iter()
            .enumerate()
            .max_by_key(|(i, r)| (r.shares, std::cmp::Reverse(*i)))
            .map(|(i, _)| i)
            .ok_or(SettlementError::NoHolders)?;
        let current: Wei = receivers[idx]
            .amount
            .parse()
            .map_err(|_| SettlementError::Overflow)?;
        receivers[idx].amount = current
            .checked_add(remainder)
            .ok_or(SettlementError::Overflow)?
            .to_string();
    }

    let snapshot = OwnershipSnapshot {
        taken_at: Utc::now(),
        total_shares,
        holder_count: holders.len() as i64,
    };

    debug_assert!(verify_receiver_sums(&receivers, &snapshot, total_amount));

    Ok((receivers, snapshot))
}

/// 수령자 합계 불변식 검증
pub fn verify_receiver_sums(
    receivers: &[Receiver],
    snapshot: &OwnershipSnapshot,
    total_amount: Wei,
) -> bool {
    let share_sum: i64 = receivers.iter().map(|r| r.shares).sum();
    if share_sum != snapshot.total_shares {
        return false;
    }

    let mut amount_sum = Wei::ZERO;
    for r in receivers {
        let amount: Wei = match r.amount.parse() {
            Ok(w) => w,
            Err(_) => return false,
        };
        amount_sum = match amount_sum.checked_add(amount) {
            Some(s) => s,
            None => return false,
        };
    }
    amount_sum == total_amount
}

/// 전원 processing으로 (실행 시작)
pub fn mark_processing(receivers: &mut [Receiver]) {
    for r in receivers.iter_mut() {
        r.status = ReceiverStatus::Processing;
    }
}

/// 전원 completed로 (실행 성공)
pub fn mark_completed(receivers: &mut [Receiver]) {
    let now = Utc::now();
    for r in receivers.iter_mut() {
        r.status = ReceiverStatus::Completed;
        r.completed_at = Some(now);
        r.failure_reason = None;
    }
}

/// 전원 failed로 (실행 실패: 사유 기록)
pub fn mark_failed(receivers: &mut [Receiver], reason: &str) {
    for r in receivers.iter_mut() {
        r.status = ReceiverStatus::Failed;
        r.failure_reason = Some(reason.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::mock::MockHoldingsSource;

    fn holder(quantity: i64) -> Holder {
        Holder {
            user_id: Uuid::new_v4(),
            wallet_address: None,
            quantity,
        }
    }

    #[test]
    fn test_build_receivers_exact_split() {
        let holders = vec![holder(600), holder(300), holder(100)];
        let total = Wei::new(1_000_000);
        let (receivers, snapshot) = build_receivers(&holders, total).unwrap();

        assert_eq!(snapshot.total_shares, 1000);
        assert_eq!(snapshot.holder_count, 3);
        assert_eq!(receivers[0].amount, "600000");
        assert_eq!(receivers[1].amount, "300000");
        assert_eq!(receivers[2].amount, "100000");
        assert!(verify_receiver_sums(&receivers, &snapshot, total));
    }

    #[test]
    fn test_build_receivers_remainder_goes_to_largest() {
        // 1000 / 3 → 333씩, 나머지 1은 최대 보유자(첫 번째)에게
        let holders = vec![holder(100), holder(100), holder(100)];
        let total = Wei::new(1_000);
        let (receivers, snapshot) = build_receivers(&holders, total).unwrap();

        assert_eq!(receivers[0].amount, "334");
        assert_eq!(receivers[1].amount, "333");
        assert_eq!(receivers[2].amount, "333");
        assert!(verify_receiver_sums(&receivers, &snapshot, total));
    }

    #[test]
    fn test_build_receivers_uneven_split_preserves_total() {
        let holders = vec![holder(7), holder(3), holder(11), holder(2)];
        let total: Wei = "999999999999999999".parse().unwrap();
        let (receivers, snapshot) = build_receivers(&holders, total).unwrap();
        assert!(verify_receiver_sums(&receivers, &snapshot, total));
    }

    #[test]
    fn test_build_receivers_no_holders() {
        assert!(matches!(
            build_receivers(&[], Wei::new(1_000)),
            Err(SettlementError::NoHolders)
        ));
    }

    #[test]
    fn test_receiver_status_transitions() {
        let holders = vec![holder(10), holder(10)];
        let (mut receivers, _) = build_receivers(&holders, Wei::new(100)).unwrap();
        assert!(receivers
            .iter()
            .all(|r| r.status == ReceiverStatus::Pending));

        mark_processing(&mut receivers);
        assert!(receivers
            .iter()
            .all(|r| r.status == ReceiverStatus::Processing));

        mark_failed(&mut receivers, "deposit reverted");
        assert!(receivers.iter().all(|r| {
            r.status == ReceiverStatus::Failed
                && r.failure_reason.as_deref() == Some("deposit reverted")
        }));

        mark_completed(&mut receivers);
        assert!(receivers.iter().all(|r| {
            r.status == ReceiverStatus::Completed
                && r.completed_at.is_some()
                && r.failure_reason.is_none()
        }));
    }

    #[tokio::test]
    async fn test_snapshot_receivers_with_mock_source() {
        let source = MockHoldingsSource::new();
        let share_id = Uuid::new_v4();
        source.set_holders(share_id, vec![holder(750), holder(250)]);

        let total = Wei::new(4_000);
        let (receivers, snapshot) = snapshot_receivers(&source, share_id, total).await.unwrap();

        assert_eq!(snapshot.total_shares, 1000);
        assert_eq!(receivers[0].amount, "3000");
        assert_eq!(receivers[1].amount, "1000");
    }

    #[tokio::test]
    async fn test_snapshot_receivers_empty_share() {
        let source = MockHoldingsSource::new();
        let result = snapshot_receivers(&source, Uuid::new_v4(), Wei::new(100)).await;
        assert!(matches!(result, Err(SettlementError::NoHolders)));
    }
}
