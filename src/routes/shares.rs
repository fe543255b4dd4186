//! Share Endpoints
//!
//! 지분 매수/매도. 가용 수량 차감은 DB 조건부 UPDATE 한 문장으로만
//! 일어난다: 같은 잔량을 두 요청이 동시에 사는 경쟁이 없다.
//!
//! 체인이 설정되어 있고 사용자 지갑이 있으면 온체인 이전까지 수행,
//! 아니면 보관(custodial) 방식으로 DB에서만 정산한다.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notify_quietly;
use crate::{
    auth,
    db::{Share, Transaction},
    error::ApiError,
    types::{tx_status, Wei},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/property/:property_id", get(get_share_by_property))
        .route("/mine", get(my_holdings))
        .route("/purchase", post(purchase_shares))
        .route("/sell", post(sell_shares))
}

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct TradeRequest {
    pub share_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub id: String,
    pub property_id: String,
    pub token_id: String,
    pub total_shares: i64,
    pub available_shares: i64,
    pub price_per_share: String,
}

impl From<Share> for ShareResponse {
    fn from(s: Share) -> Self {
        Self {
            id: s.id.to_string(),
            property_id: s.property_id.to_string(),
            token_id: s.token_id.to_string(),
            total_shares: s.total_shares,
            available_shares: s.available_shares,
            price_per_share: s.price_per_share,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TradeResponse {
    pub transaction_id: String,
    pub share_id: String,
    pub tx_type: String,
    pub quantity: i64,
    /// 거래 금액 (wei 문자열)
    pub amount: String,
    pub status: String,
    pub tx_hash: Option<String>,
}

impl From<Transaction> for TradeResponse {
    fn from(t: Transaction) -> Self {
        Self {
            transaction_id: t.id.to_string(),
            share_id: t.share_id.to_string(),
            tx_type: t.tx_type,
            quantity: t.quantity,
            amount: t.amount,
            status: t.status,
            tx_hash: t.tx_hash,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HoldingResponse {
    pub share_id: String,
    pub property_id: String,
    pub property_name: String,
    pub quantity: i64,
    pub total_shares: i64,
    pub price_per_share: String,
    /// 보유 지분 평가액 (quantity * price_per_share, wei 문자열)
    pub position_value: String,
}

// ============ Handlers ============

/// GET /api/shares/property/:property_id
pub async fn get_share_by_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
) -> Result<Json<ShareResponse>, ApiError> {
    let share = state
        .db
        .get_share_by_property(property_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Share".to_string()))?;
    Ok(Json(share.into()))
}

/// GET /api/shares/mine
pub async fn my_holdings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<HoldingResponse>>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;

    let holdings = state.db.holdings_for_user(user.id).await?;
    let mut out = Vec::with_capacity(holdings.len());
    for h in holdings {
        let price: Wei = h
            .price_per_share
            .parse()
            .map_err(ApiError::ValidationError)?;
        let position_value = price
            .checked_mul_u64(h.quantity.max(0) as u64)
            .ok_or_else(|| ApiError::ValidationError("position value overflow".to_string()))?;
        out.push(HoldingResponse {
            share_id: h.share_id.to_string(),
            property_id: h.property_id.to_string(),
            property_name: h.property_name,
            quantity: h.quantity,
            total_shares: h.total_shares,
            price_per_share: h.price_per_share,
            position_value: position_value.to_string(),
        });
    }
    Ok(Json(out))
}

/// POST /api/shares/purchase
///
/// # Flow
///
/// 1. 가용 지분 선점 차감 (조건부 UPDATE: 부족하면 400)
/// 2. 대기중 거래 기록
/// 3. 체인 이전 (가능한 경우)
/// 4. 성공: 보유량 증가 + 거래 완료 / 실패: 잔량 복원 + 거래 실패 + 500
pub async fn purchase_shares(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TradeRequest>,
) -> Result<Json<TradeResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;

    if req.quantity <= 0 {
        return Err(ApiError::ValidationError(
            "quantity must be positive".to_string(),
        ));
    }

    let share = state
        .db
        .get_share(req.share_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Share".to_string()))?;

    let price: Wei = share
        .price_per_share
        .parse()
        .map_err(ApiError::ValidationError)?;
    let amount = price
        .checked_mul_u64(req.quantity as u64)
        .ok_or_else(|| ApiError::ValidationError("trade amount overflow".to_string()))?;

    // 잔량 선점
    let claimed = state
        .db
        .claim_available_shares(req.share_id, req.quantity)
        .await?;
    if claimed.is_none() {
        return Err(ApiError::BadRequest(
            "not enough available shares".to_string(),
        ));
    }

    let tx = state
        .db
        .insert_transaction(
            req.share_id,
            user.id,
            "buy",
            req.quantity,
            &amount.to_string(),
            tx_status::PENDING,
        )
        .await?;

    // 체인 이전 (토큰이 민팅되어 있고, 지갑과 게이트웨이가 있을 때만)
    let chain_hash = match chain_transfer_for_purchase(&state, &share, &user.wallet_address, req.quantity).await {
        Ok(hash) => hash,
        Err(e) => {
            // 보상: 잔량 복원 + 거래 실패 기록
            tracing::error!("Share purchase chain transfer failed: {:#}", e);
            state
                .db
                .restore_available_shares(req.share_id, req.quantity)
                .await?;
            state
                .db
                .settle_transaction(tx.id, tx_status::FAILED, None)
                .await?;
            return Err(ApiError::ChainError(e.to_string()));
        }
    };

    state
        .db
        .add_to_holding(req.share_id, user.id, req.quantity)
        .await?;
    state
        .db
        .settle_transaction(tx.id, tx_status::COMPLETED, chain_hash.as_deref())
        .await?;

    notify_quietly(
        &state,
        user.id,
        "share_purchased",
        "지분 매수 완료",
        &format!("{}주 매수가 완료되었습니다.", req.quantity),
    )
    .await;

    Ok(Json(TradeResponse {
        transaction_id: tx.id.to_string(),
        share_id: tx.share_id.to_string(),
        tx_type: tx.tx_type,
        quantity: tx.quantity,
        amount: tx.amount,
        status: tx_status::COMPLETED.to_string(),
        tx_hash: chain_hash,
    }))
}

/// POST /api/shares/sell
///
/// 보유 지분을 풀에 되팔기: 매수의 역방향
pub async fn sell_shares(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TradeRequest>,
) -> Result<Json<TradeResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;

    if req.quantity <= 0 {
        return Err(ApiError::ValidationError(
            "quantity must be positive".to_string(),
        ));
    }

    let share = state
        .db
        .get_share(req.share_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Share".to_string()))?;

    let price: Wei = share
        .price_per_share
        .parse()
        .map_err(ApiError::ValidationError)?;
    let amount = price
        .checked_mul_u64(req.quantity as u64)
        .ok_or_else(|| ApiError::ValidationError("trade amount overflow".to_string()))?;

    // 보유량 선점 차감
    let taken = state
        .db
        .take_from_holding(req.share_id, user.id, req.quantity)
        .await?;
    if !taken {
        return Err(ApiError::BadRequest("not enough shares held".to_string()));
    }

    let tx = state
        .db
        .insert_transaction(
            req.share_id,
            user.id,
            "sell",
            req.quantity,
            &amount.to_string(),
            tx_status::PENDING,
        )
        .await?;

    let chain_hash = match chain_transfer_for_sale(&state, &share, &user.wallet_address, req.quantity).await {
        Ok(hash) => hash,
        Err(e) => {
            // 보상: 보유량 복원 + 거래 실패 기록
            tracing::error!("Share sale chain transfer failed: {:#}", e);
            state
                .db
                .add_to_holding(req.share_id, user.id, req.quantity)
                .await?;
            state
                .db
                .settle_transaction(tx.id, tx_status::FAILED, None)
                .await?;
            return Err(ApiError::ChainError(e.to_string()));
        }
    };

    state
        .db
        .restore_available_shares(req.share_id, req.quantity)
        .await?;
    state
        .db
        .settle_transaction(tx.id, tx_status::COMPLETED, chain_hash.as_deref())
        .await?;

    notify_quietly(
        &state,
        user.id,
        "share_sold",
        "지분 매도 완료",
        &format!("{}주 매도가 완료되었습니다.", req.quantity),
    )
    .await;

    Ok(Json(TradeResponse {
        transaction_id: tx.id.to_string(),
        share_id: tx.share_id.to_string(),
        tx_type: tx.tx_type,
        quantity: tx.quantity,
        amount: tx.amount,
        status: tx_status::COMPLETED.to_string(),
        tx_hash: chain_hash,
    }))
}

// ============ Helpers ============

/// 매수 체인 이전: 트레저리 → 구매자 지갑
///
/// 체인 미설정 / 지갑 없음 / 토큰 미민팅이면 보관 방식: None 반환
async fn chain_transfer_for_purchase(
    state: &AppState,
    share: &Share,
    wallet: &Option<String>,
    quantity: i64,
) -> anyhow::Result<Option<String>> {
    let (onchain_token_id, wallet) = match chain_context(state, share, wallet).await? {
        Some(ctx) => ctx,
        None => return Ok(None),
    };
    let receipt = state
        .chain
        .transfer_shares(onchain_token_id, None, &wallet, quantity)
        .await?;
    Ok(Some(receipt.tx_hash))
}

/// 매도 체인 이전: 판매자 지갑 → 트레저리
async fn chain_transfer_for_sale(
    state: &AppState,
    share: &Share,
    wallet: &Option<String>,
    quantity: i64,
) -> anyhow::Result<Option<String>> {
    let (onchain_token_id, wallet) = match chain_context(state, share, wallet).await? {
        Some(ctx) => ctx,
        None => return Ok(None),
    };
    let treasury = match state.chain.treasury_address() {
        Some(addr) => addr,
        None => return Ok(None),
    };
    let receipt = state
        .chain
        .transfer_shares(onchain_token_id, Some(&wallet), &treasury, quantity)
        .await?;
    Ok(Some(receipt.tx_hash))
}

async fn chain_context(
    state: &AppState,
    share: &Share,
    wallet: &Option<String>,
) -> anyhow::Result<Option<(i64, String)>> {
    if !state.chain.is_configured() {
        return Ok(None);
    }
    let wallet = match wallet {
        Some(w) => w.clone(),
        None => return Ok(None),
    };
    let token = state.db.get_token(share.token_id).await?;
    match token.and_then(|t| t.onchain_token_id) {
        Some(id) => Ok(Some((id, wallet))),
        None => Ok(None),
    }
}
