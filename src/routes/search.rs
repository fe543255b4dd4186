//! Search Endpoints
//!
//! 부동산 검색: 이름/주소 부분 일치 + 상태 + 감정가(wei) 범위

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::properties::{PropertyListResponse, PropertyResponse};
use crate::{
    error::ApiError,
    types::{property_status, Pagination, Wei},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/properties", get(search_properties))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// 이름/주소 부분 일치
    pub q: Option<String>,
    pub status: Option<String>,
    /// 감정가 하한 (wei 문자열)
    pub min_value: Option<String>,
    /// 감정가 상한 (wei 문자열)
    pub max_value: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// GET /api/search/properties
pub async fn search_properties(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<PropertyListResponse>, ApiError> {
    if let Some(status) = &query.status {
        if !property_status::is_valid(status) {
            return Err(ApiError::ValidationError(format!(
                "unknown status: {}",
                status
            )));
        }
    }
    // 범위 값은 파싱만 해서 형식 검증: 쿼리에는 문자열 그대로 바인딩
    let min_value = query
        .min_value
        .as_deref()
        .map(|v| v.parse::<Wei>().map(|w| w.to_string()))
        .transpose()
        .map_err(ApiError::ValidationError)?;
    let max_value = query
        .max_value
        .as_deref()
        .map(|v| v.parse::<Wei>().map(|w| w.to_string()))
        .transpose()
        .map_err(ApiError::ValidationError)?;

    let q = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let page = query.page.unwrap_or(0);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (properties, total) = state
        .db
        .search_properties(
            q,
            query.status.as_deref(),
            min_value.as_deref(),
            max_value.as_deref(),
            page,
            limit,
        )
        .await?;

    Ok(Json(PropertyListResponse {
        properties: properties
            .into_iter()
            .map(PropertyResponse::from)
            .collect(),
        pagination: Pagination::build(page, limit, total),
    }))
}
