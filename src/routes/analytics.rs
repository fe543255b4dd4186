//! Analytics Endpoints
//!
//! 플랫폼/부동산/포트폴리오 지표. 돈 계산은 전부 정수 wei -
//! 수익률은 basis point(1/10000)로 돌려준다.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{auth, error::ApiError, types::Wei, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/platform", get(platform_stats))
        .route("/property/:id", get(property_stats))
        .route("/portfolio", get(portfolio))
}

// ============ Response Types ============

#[derive(Debug, Serialize)]
pub struct PlatformStats {
    pub total_users: i64,
    pub total_properties: i64,
    pub tokenized_properties: i64,
    pub total_transactions: i64,
    pub completed_distributions: i64,
    /// 토큰화된 부동산 감정가 합계 (wei 문자열)
    pub tokenized_value: String,
    /// 완료된 분배 총액 (wei 문자열)
    pub total_distributed: String,
}

#[derive(Debug, Serialize)]
pub struct PropertyStats {
    pub property_id: String,
    pub appraised_value: String,
    /// 완료된 분배 총액 (wei 문자열)
    pub total_income: String,
    /// 누적 수익률 (basis point, 감정가 0이면 None)
    pub roi_bps: Option<u64>,
    pub distribution_count: usize,
    pub holder_count: i64,
}

#[derive(Debug, Serialize)]
pub struct PortfolioResponse {
    pub holdings: Vec<PortfolioPosition>,
    /// 보유 지분 평가액 합계 (wei 문자열)
    pub total_position_value: String,
    /// 수령한 분배 총액 (wei 문자열)
    pub total_income_received: String,
}

#[derive(Debug, Serialize)]
pub struct PortfolioPosition {
    pub property_id: String,
    pub property_name: String,
    pub share_id: String,
    pub quantity: i64,
    pub total_shares: i64,
    pub price_per_share: String,
    pub position_value: String,
    /// 지분율 (basis point)
    pub ownership_bps: u64,
}

// ============ Handlers ============

/// GET /api/analytics/platform
pub async fn platform_stats(
    State(state): State<AppState>,
) -> Result<Json<PlatformStats>, ApiError> {
    let total_users = state.db.count_users().await?;
    let total_properties = state.db.count_properties().await?;
    let tokenized_properties = state.db.count_tokenized_properties().await?;
    let total_transactions = state.db.count_transactions().await?;
    let completed_distributions = state.db.count_completed_distributions().await?;
    let tokenized_value = state.db.sum_tokenized_value().await?;
    let total_distributed = state.db.sum_distributed_total().await?;

    Ok(Json(PlatformStats {
        total_users,
        total_properties,
        tokenized_properties,
        total_transactions,
        completed_distributions,
        tokenized_value,
        total_distributed,
    }))
}

/// GET /api/analytics/property/:id
pub async fn property_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PropertyStats>, ApiError> {
    let property = state
        .db
        .get_property(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property".to_string()))?;

    let total_income_str = state.db.sum_distributed_for_property(id).await?;
    let total_income: Wei = total_income_str
        .parse()
        .map_err(ApiError::ValidationError)?;
    let appraised: Wei = property
        .appraised_value
        .parse()
        .map_err(ApiError::ValidationError)?;

    // 정수 나눗셈만: float이 돈을 만지지 않는다
    let roi_bps = appraised.ratio_bps(total_income);

    let holder_count = match state.db.get_share_by_property(id).await? {
        Some(share) => {
            use crate::db::HoldingsSource;
            state.db.holders_of_share(share.id).await?.len() as i64
        }
        None => 0,
    };

    Ok(Json(PropertyStats {
        property_id: id.to_string(),
        appraised_value: property.appraised_value,
        total_income: total_income.to_string(),
        roi_bps,
        distribution_count: property.income_history.0.len(),
        holder_count,
    }))
}

/// GET /api/analytics/portfolio
pub async fn portfolio(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PortfolioResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;

    let holdings = state.db.holdings_for_user(user.id).await?;

    let mut positions = Vec::with_capacity(holdings.len());
    let mut total_value = Wei::ZERO;
    for h in holdings {
        let price: Wei = h
            .price_per_share
            .parse()
            .map_err(ApiError::ValidationError)?;
        let position_value = price
            .checked_mul_u64(h.quantity.max(0) as u64)
            .ok_or_else(|| ApiError::ValidationError("position value overflow".to_string()))?;
        total_value = total_value
            .checked_add(position_value)
            .ok_or_else(|| ApiError::ValidationError("portfolio value overflow".to_string()))?;

        let ownership_bps = if h.total_shares > 0 {
            ((h.quantity.max(0) as u128 * 10_000) / h.total_shares as u128) as u64
        } else {
            0
        };

        positions.push(PortfolioPosition {
            property_id: h.property_id.to_string(),
            property_name: h.property_name,
            share_id: h.share_id.to_string(),
            quantity: h.quantity,
            total_shares: h.total_shares,
            price_per_share: h.price_per_share,
            position_value: position_value.to_string(),
            ownership_bps,
        });
    }

    let total_income_received = state.db.sum_received_by_user(user.id).await?;

    Ok(Json(PortfolioResponse {
        holdings: positions,
        total_position_value: total_value.to_string(),
        total_income_received,
    }))
}
