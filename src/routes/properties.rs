//! Property Endpoints
//!
//! 등록 → 관리자 승인 → 토큰화의 상태 머신을 관리한다.
//! 상태값은 원 플랫폼의 한국어 enum을 그대로 쓴다:
//! 등록대기 → 등록완료 → 토큰화대기 → 토큰화완료

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{self, Role},
    db::{IncomeRecord, NewProperty, Property},
    error::ApiError,
    types::{property_status, Pagination, Wei},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_property).get(list_properties))
        .route("/:id", get(get_property).put(update_property))
        .route("/:id/approve", post(approve_property))
        .route("/:id/tokenize", post(tokenize_property))
        .route("/:id/income-history", get(income_history))
}

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct CreatePropertyRequest {
    pub name: String,
    pub address: String,
    pub property_type: String,
    pub area_sqm: f64,
    pub description: Option<String>,
    /// 감정가 (wei 문자열)
    pub appraised_value: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePropertyRequest {
    pub name: String,
    pub address: String,
    pub property_type: String,
    pub area_sqm: f64,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    /// 페이지 (0부터 시작)
    pub page: Option<u32>,
    /// 페이지 크기 (기본 20, 최대 100)
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct TokenizeRequest {
    /// 토큰 이름 (기본: 부동산 이름)
    pub token_name: Option<String>,
    /// 토큰 심볼 (기본: "RET")
    pub token_symbol: Option<String>,
    pub total_shares: i64,
    /// 1주 가격 (wei 문자열)
    pub price_per_share: String,
}

#[derive(Debug, Serialize)]
pub struct PropertyResponse {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub address: String,
    pub property_type: String,
    pub area_sqm: f64,
    pub description: Option<String>,
    pub appraised_value: String,
    pub status: String,
    pub is_tokenized: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Property> for PropertyResponse {
    fn from(p: Property) -> Self {
        Self {
            id: p.id.to_string(),
            owner_id: p.owner_id.to_string(),
            name: p.name,
            address: p.address,
            property_type: p.property_type,
            area_sqm: p.area_sqm,
            description: p.description,
            appraised_value: p.appraised_value,
            status: p.status,
            is_tokenized: p.is_tokenized,
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PropertyListResponse {
    pub properties: Vec<PropertyResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct TokenizeResponse {
    pub property: PropertyResponse,
    pub token_id: String,
    pub onchain_token_id: i64,
    pub mint_tx_hash: String,
    pub share_id: String,
}

#[derive(Debug, Serialize)]
pub struct IncomeHistoryResponse {
    pub property_id: String,
    pub income_history: Vec<IncomeRecord>,
}

// ============ Handlers ============

/// POST /api/properties
///
/// 부동산 등록 (상태: 등록대기)
pub async fn create_property(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreatePropertyRequest>,
) -> Result<(axum::http::StatusCode, Json<PropertyResponse>), ApiError> {
    let user = auth::require_user(&state, &headers).await?;

    // 입력 검증
    if req.name.trim().is_empty() || req.address.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "name and address are required".to_string(),
        ));
    }
    if req.area_sqm <= 0.0 {
        return Err(ApiError::ValidationError(
            "area_sqm must be positive".to_string(),
        ));
    }
    let appraised: Wei = req
        .appraised_value
        .parse()
        .map_err(ApiError::ValidationError)?;

    let property = state
        .db
        .create_property(NewProperty {
            owner_id: user.id,
            name: req.name.trim(),
            address: req.address.trim(),
            property_type: &req.property_type,
            area_sqm: req.area_sqm,
            description: req.description.as_deref(),
            appraised_value: &appraised.to_string(),
            status: property_status::PENDING_REGISTRATION,
        })
        .await?;

    tracing::info!("Property registered: {} ({})", property.name, property.id);

    Ok((axum::http::StatusCode::CREATED, Json(property.into())))
}

/// GET /api/properties
pub async fn list_properties(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PropertyListResponse>, ApiError> {
    if let Some(status) = &query.status {
        if !property_status::is_valid(status) {
            return Err(ApiError::ValidationError(format!(
                "unknown status: {}",
                status
            )));
        }
    }

    let page = query.page.unwrap_or(0);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let (properties, total) = state
        .db
        .list_properties(query.status.as_deref(), page, limit)
        .await?;

    Ok(Json(PropertyListResponse {
        properties: properties.into_iter().map(Into::into).collect(),
        pagination: Pagination::build(page, limit, total),
    }))
}

/// GET /api/properties/:id
pub async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PropertyResponse>, ApiError> {
    let property = state
        .db
        .get_property(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property".to_string()))?;
    Ok(Json(property.into()))
}

/// PUT /api/properties/:id
///
/// 소유자 또는 관리자만, 토큰화 이후에는 수정 불가
pub async fn update_property(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePropertyRequest>,
) -> Result<Json<PropertyResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;

    let property = state
        .db
        .get_property(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property".to_string()))?;

    if property.owner_id != user.id && user.role != Role::Admin {
        return Err(ApiError::Forbidden(
            "only the owner or an admin can update a property".to_string(),
        ));
    }
    if property.is_tokenized {
        return Err(ApiError::BadRequest(
            "tokenized properties cannot be updated".to_string(),
        ));
    }
    if req.area_sqm <= 0.0 {
        return Err(ApiError::ValidationError(
            "area_sqm must be positive".to_string(),
        ));
    }

    let property = state
        .db
        .update_property(
            id,
            req.name.trim(),
            req.address.trim(),
            &req.property_type,
            req.area_sqm,
            req.description.as_deref(),
        )
        .await?
        .ok_or_else(|| ApiError::NotFound("Property".to_string()))?;

    Ok(Json(property.into()))
}

/// POST /api/properties/:id/approve
///
/// 관리자 승인: 등록대기 → 등록완료
pub async fn approve_property(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<PropertyResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    auth::require_role(&user, &[Role::Admin])?;

    // 존재 확인을 먼저 해서 404와 400을 구분
    state
        .db
        .get_property(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property".to_string()))?;

    let property = state
        .db
        .transition_property_status(
            id,
            property_status::PENDING_REGISTRATION,
            property_status::REGISTERED,
        )
        .await?
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "property must be in {} status",
                property_status::PENDING_REGISTRATION
            ))
        })?;

    tracing::info!("Property approved: {}", id);

    Ok(Json(property.into()))
}

/// POST /api/properties/:id/tokenize
///
/// 관리자 전용. 등록완료 상태에서만.
///
/// # Flow
///
/// 1. 등록완료 → 토큰화대기 선점 (동시 토큰화 차단)
/// 2. NFT 민팅 + 지분 발행 (체인)
/// 3. 토큰/지분 트랜치 생성, 토큰화완료로 전이
/// 4. 체인 실패 시 등록완료로 되돌리고 500
pub async fn tokenize_property(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<TokenizeRequest>,
) -> Result<Json<TokenizeResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    auth::require_role(&user, &[Role::Admin])?;

    if !state.chain.is_configured() {
        return Err(ApiError::ServiceUnavailable("chain gateway".to_string()));
    }
    if req.total_shares <= 0 {
        return Err(ApiError::ValidationError(
            "total_shares must be positive".to_string(),
        ));
    }
    let price: Wei = req
        .price_per_share
        .parse()
        .map_err(ApiError::ValidationError)?;

    let property = state
        .db
        .get_property(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property".to_string()))?;

    if state.db.get_share_by_property(id).await?.is_some() {
        return Err(ApiError::BadRequest(
            "property already has a share tranche".to_string(),
        ));
    }

    // 토큰화 선점
    let claimed = state
        .db
        .transition_property_status(
            id,
            property_status::REGISTERED,
            property_status::TOKENIZATION_PENDING,
        )
        .await?;
    if claimed.is_none() {
        return Err(ApiError::BadRequest(format!(
            "property must be in {} status",
            property_status::REGISTERED
        )));
    }

    // 소유자 지갑이 있으면 소유자 앞으로, 없으면 트레저리로 민팅
    let owner_wallet = state
        .db
        .get_user_by_id(property.owner_id)
        .await?
        .and_then(|u| u.wallet_address);
    let metadata_uri = format!("realty://property/{}", id);

    let chain_result = async {
        let minted = state
            .chain
            .mint_property(owner_wallet.as_deref(), &metadata_uri)
            .await?;
        state
            .chain
            .issue_shares(minted.onchain_token_id, req.total_shares, price)
            .await?;
        Ok::<_, anyhow::Error>(minted)
    }
    .await;

    let minted = match chain_result {
        Ok(minted) => minted,
        Err(e) => {
            // 체인 실패 → 상태 복원 후 에러 전파
            tracing::error!("Tokenization chain calls failed for {}: {:#}", id, e);
            state
                .db
                .transition_property_status(
                    id,
                    property_status::TOKENIZATION_PENDING,
                    property_status::REGISTERED,
                )
                .await?;
            return Err(ApiError::ChainError(e.to_string()));
        }
    };

    // 토큰 행은 체인 성공 이후에만 생성 (tokens.property_id는 unique)
    let token_name = req
        .token_name
        .clone()
        .unwrap_or_else(|| property.name.clone());
    let token_symbol = req.token_symbol.clone().unwrap_or_else(|| "RET".to_string());
    let token = state
        .db
        .create_token(id, &token_name, &token_symbol, req.total_shares)
        .await?;

    let nft_contract = state.chain.nft_contract_address().unwrap_or_default();
    state
        .db
        .mark_token_minted(
            token.id,
            &nft_contract,
            minted.onchain_token_id,
            &minted.receipt.tx_hash,
        )
        .await?;

    let share = state
        .db
        .create_share(id, token.id, req.total_shares, &price.to_string())
        .await?;

    let property = state
        .db
        .mark_tokenized(id, property_status::TOKENIZED)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property".to_string()))?;

    tracing::info!(
        "Property tokenized: {} (onchain token {})",
        id,
        minted.onchain_token_id
    );

    Ok(Json(TokenizeResponse {
        property: property.into(),
        token_id: token.id.to_string(),
        onchain_token_id: minted.onchain_token_id,
        mint_tx_hash: minted.receipt.tx_hash,
        share_id: share.id.to_string(),
    }))
}

/// GET /api/properties/:id/income-history
pub async fn income_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<IncomeHistoryResponse>, ApiError> {
    let property = state
        .db
        .get_property(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property".to_string()))?;

    Ok(Json(IncomeHistoryResponse {
        property_id: id.to_string(),
        income_history: property.income_history.0,
    }))
}
