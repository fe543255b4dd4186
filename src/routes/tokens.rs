//! Token Endpoints
//!
//! 토큰 메타데이터 + 거래 이력 조회 (읽기 전용)

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::{Token, Transaction},
    error::ApiError,
    types::{PageQuery, Pagination},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tokens))
        .route("/:id", get(get_token))
        .route("/:id/transactions", get(token_transactions))
}

// ============ Response Types ============

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id: String,
    pub property_id: String,
    pub contract_address: Option<String>,
    pub onchain_token_id: Option<i64>,
    pub name: String,
    pub symbol: String,
    pub total_supply: i64,
    pub mint_tx_hash: Option<String>,
    pub created_at: String,
}

impl From<Token> for TokenResponse {
    fn from(t: Token) -> Self {
        Self {
            id: t.id.to_string(),
            property_id: t.property_id.to_string(),
            contract_address: t.contract_address,
            onchain_token_id: t.onchain_token_id,
            name: t.name,
            symbol: t.symbol,
            total_supply: t.total_supply,
            mint_tx_hash: t.mint_tx_hash,
            created_at: t.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenListResponse {
    pub tokens: Vec<TokenResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub id: String,
    pub share_id: String,
    pub user_id: String,
    pub tx_type: String,
    pub quantity: i64,
    pub amount: String,
    pub status: String,
    pub tx_hash: Option<String>,
    pub created_at: String,
}

impl From<Transaction> for TransactionView {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id.to_string(),
            share_id: t.share_id.to_string(),
            user_id: t.user_id.to_string(),
            tx_type: t.tx_type,
            quantity: t.quantity,
            amount: t.amount,
            status: t.status,
            tx_hash: t.tx_hash,
            created_at: t.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub token_id: String,
    pub transactions: Vec<TransactionView>,
    pub pagination: Pagination,
}

// ============ Handlers ============

/// GET /api/tokens
pub async fn list_tokens(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<TokenListResponse>, ApiError> {
    let (page, limit) = (query.page(), query.limit());
    let (tokens, total) = state.db.list_tokens(page, limit).await?;

    Ok(Json(TokenListResponse {
        tokens: tokens.into_iter().map(Into::into).collect(),
        pagination: Pagination::build(page, limit, total),
    }))
}

/// GET /api/tokens/:id
pub async fn get_token(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state
        .db
        .get_token(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Token".to_string()))?;
    Ok(Json(token.into()))
}

/// GET /api/tokens/:id/transactions
pub async fn token_transactions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    // 404와 빈 목록을 구분
    state
        .db
        .get_token(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Token".to_string()))?;

    let (page, limit) = (query.page(), query.limit());
    let (transactions, total) = state.db.list_transactions_by_token(id, page, limit).await?;

    Ok(Json(TransactionListResponse {
        token_id: id.to_string(),
        transactions: transactions.into_iter().map(Into::into).collect(),
        pagination: Pagination::build(page, limit, total),
    }))
}
