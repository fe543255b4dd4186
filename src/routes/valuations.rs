//! Property Valuation Endpoints
//!
//! 감정평가 승인 워크플로우:
//! draft → pending_review → {approved, rejected}, approved → published
//!
//! 전이는 전부 조건부 UPDATE 선점: 같은 평가를 두 요청이 동시에
//! 승인/기록하면 한쪽은 409를 받는다.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notify_quietly;
use crate::{
    auth::{self, Role},
    db::{NewValuation, PropertyValuation, ValuationDocument, ValuationFactor},
    error::ApiError,
    types::{PageQuery, Pagination, ValuationStatus, Wei},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_valuation))
        .route("/request", post(request_valuation))
        .route("/:id", get(get_valuation))
        .route("/:id/submit", post(submit_valuation))
        .route("/:id/approve", post(approve_valuation))
        .route("/:id/reject", post(reject_valuation))
        .route("/:id/record-onchain", post(record_valuation_onchain))
        .route("/property/:property_id", get(list_for_property))
}

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct RequestValuationRequest {
    pub property_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateValuationRequest {
    pub property_id: Uuid,
    /// 평가액 (wei 문자열)
    pub value: String,
    pub method: String,
    #[serde(default)]
    pub factors: Vec<ValuationFactor>,
    #[serde(default)]
    pub documents: Vec<ValuationDocument>,
}

#[derive(Debug, Deserialize)]
pub struct RejectValuationRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ValuationResponse {
    pub id: String,
    pub property_id: String,
    pub appraiser_id: Option<String>,
    pub requested_by: Option<String>,
    pub value: Option<String>,
    pub method: Option<String>,
    pub status: String,
    pub factors: Vec<ValuationFactor>,
    pub documents: Vec<ValuationDocument>,
    pub previous_valuation_id: Option<String>,
    pub rejection_reason: Option<String>,
    pub record_tx_hash: Option<String>,
    pub onchain_valuation_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PropertyValuation> for ValuationResponse {
    fn from(v: PropertyValuation) -> Self {
        Self {
            id: v.id.to_string(),
            property_id: v.property_id.to_string(),
            appraiser_id: v.appraiser_id.map(|u| u.to_string()),
            requested_by: v.requested_by.map(|u| u.to_string()),
            value: v.value,
            method: v.method,
            status: v.status,
            factors: v.factors.0,
            documents: v.documents.0,
            previous_valuation_id: v.previous_valuation_id.map(|u| u.to_string()),
            rejection_reason: v.rejection_reason,
            record_tx_hash: v.record_tx_hash,
            onchain_valuation_id: v.onchain_valuation_id,
            created_at: v.created_at.to_rfc3339(),
            updated_at: v.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValuationListResponse {
    pub property_id: String,
    pub valuations: Vec<ValuationResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct RecordOnchainResponse {
    pub valuation: ValuationResponse,
    pub tx_hash: String,
}

// ============ Handlers ============

/// POST /api/valuations/request
///
/// 소유자/관리자가 재평가 요청: pending_review 상태의 평가를 만들고
/// 직전 평가를 previous_valuation으로 연결한다. 평가액은 감정평가사가
/// 별도 draft로 작성한다.
pub async fn request_valuation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RequestValuationRequest>,
) -> Result<(axum::http::StatusCode, Json<ValuationResponse>), ApiError> {
    let user = auth::require_user(&state, &headers).await?;

    let property = state
        .db
        .get_property(req.property_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property".to_string()))?;

    if property.owner_id != user.id && user.role != Role::Admin {
        return Err(ApiError::Forbidden(
            "only the owner or an admin can request a valuation".to_string(),
        ));
    }

    let previous = state
        .db
        .latest_valuation_for_property(req.property_id)
        .await?;

    let valuation = state
        .db
        .create_valuation(NewValuation {
            property_id: req.property_id,
            appraiser_id: None,
            requested_by: Some(user.id),
            value: None,
            method: None,
            status: ValuationStatus::PendingReview.as_str(),
            factors: vec![],
            documents: vec![],
            previous_valuation_id: previous.map(|p| p.id),
        })
        .await?;

    tracing::info!(
        "Valuation requested for property {} by {}",
        req.property_id,
        user.id
    );

    Ok((axum::http::StatusCode::CREATED, Json(valuation.into())))
}

/// POST /api/valuations
///
/// 감정평가사가 평가서 작성 (draft)
pub async fn create_valuation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateValuationRequest>,
) -> Result<(axum::http::StatusCode, Json<ValuationResponse>), ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    auth::require_role(&user, &[Role::Appraiser])?;

    state
        .db
        .get_property(req.property_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property".to_string()))?;

    let value: Wei = req.value.parse().map_err(ApiError::ValidationError)?;
    if req.method.trim().is_empty() {
        return Err(ApiError::ValidationError("method is required".to_string()));
    }

    let previous = state
        .db
        .latest_valuation_for_property(req.property_id)
        .await?;

    let valuation = state
        .db
        .create_valuation(NewValuation {
            property_id: req.property_id,
            appraiser_id: Some(user.id),
            requested_by: None,
            value: Some(&value.to_string()),
            method: Some(req.method.trim()),
            status: ValuationStatus::Draft.as_str(),
            factors: req.factors,
            documents: req.documents,
            previous_valuation_id: previous.map(|p| p.id),
        })
        .await?;

    Ok((axum::http::StatusCode::CREATED, Json(valuation.into())))
}

/// GET /api/valuations/:id
pub async fn get_valuation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ValuationResponse>, ApiError> {
    let valuation = state
        .db
        .get_valuation(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Valuation".to_string()))?;
    Ok(Json(valuation.into()))
}

/// POST /api/valuations/:id/submit
///
/// 작성자 본인만: draft → pending_review
pub async fn submit_valuation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ValuationResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    auth::require_role(&user, &[Role::Appraiser])?;

    let valuation = state
        .db
        .get_valuation(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Valuation".to_string()))?;

    if valuation.appraiser_id != Some(user.id) && user.role != Role::Admin {
        return Err(ApiError::Forbidden(
            "only the authoring appraiser can submit".to_string(),
        ));
    }

    let valuation = state
        .db
        .transition_valuation_status(
            id,
            ValuationStatus::Draft.as_str(),
            ValuationStatus::PendingReview.as_str(),
        )
        .await?
        .ok_or_else(|| {
            ApiError::BadRequest("only draft valuations can be submitted".to_string())
        })?;

    Ok(Json(valuation.into()))
}

/// POST /api/valuations/:id/approve
///
/// 관리자: pending_review → approved (평가액 없는 요청 건은 승인 불가)
pub async fn approve_valuation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ValuationResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    auth::require_role(&user, &[Role::Admin])?;

    let valuation = state
        .db
        .get_valuation(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Valuation".to_string()))?;

    if valuation.value.is_none() {
        return Err(ApiError::BadRequest(
            "valuation has no value yet: an appraiser must fill it in".to_string(),
        ));
    }

    let valuation = state
        .db
        .transition_valuation_status(
            id,
            ValuationStatus::PendingReview.as_str(),
            ValuationStatus::Approved.as_str(),
        )
        .await?
        .ok_or_else(|| {
            ApiError::BadRequest("only pending_review valuations can be approved".to_string())
        })?;

    tracing::info!("Valuation approved: {}", id);

    if let Some(appraiser) = valuation.appraiser_id {
        notify_quietly(
            &state,
            appraiser,
            "valuation_approved",
            "감정평가 승인",
            "작성하신 감정평가가 승인되었습니다.",
        )
        .await;
    }

    Ok(Json(valuation.into()))
}

/// POST /api/valuations/:id/reject
///
/// 관리자: pending_review → rejected
pub async fn reject_valuation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectValuationRequest>,
) -> Result<Json<ValuationResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    auth::require_role(&user, &[Role::Admin])?;

    if req.reason.trim().is_empty() {
        return Err(ApiError::ValidationError("reason is required".to_string()));
    }

    state
        .db
        .get_valuation(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Valuation".to_string()))?;

    let valuation = state
        .db
        .reject_valuation(id, req.reason.trim())
        .await?
        .ok_or_else(|| {
            ApiError::BadRequest("only pending_review valuations can be rejected".to_string())
        })?;

    if let Some(appraiser) = valuation.appraiser_id {
        notify_quietly(
            &state,
            appraiser,
            "valuation_rejected",
            "감정평가 반려",
            &format!("감정평가가 반려되었습니다: {}", req.reason.trim()),
        )
        .await;
    }

    Ok(Json(valuation.into()))
}

/// POST /api/valuations/:id/record-onchain
///
/// 관리자/감정평가사. approved 상태 + 토큰화된 부동산만.
///
/// # Flow
///
/// 1. 체인에 평가 기록
/// 2. approved → published 선점 (진 쪽은 409)
/// 3. 부동산 감정가를 평가액으로 갱신
pub async fn record_valuation_onchain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<RecordOnchainResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    auth::require_role(&user, &[Role::Admin, Role::Appraiser])?;

    if !state.chain.is_configured() {
        return Err(ApiError::ServiceUnavailable("chain gateway".to_string()));
    }

    let valuation = state
        .db
        .get_valuation(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Valuation".to_string()))?;

    if valuation.status != ValuationStatus::Approved.as_str() {
        return Err(ApiError::BadRequest(
            "only approved valuations can be recorded on chain".to_string(),
        ));
    }
    let value: Wei = valuation
        .value
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("valuation has no value".to_string()))?
        .parse()
        .map_err(ApiError::ValidationError)?;

    let token = state
        .db
        .get_token_by_property(valuation.property_id)
        .await?
        .and_then(|t| t.onchain_token_id)
        .ok_or_else(|| {
            ApiError::BadRequest("property is not tokenized: nothing to record against".to_string())
        })?;

    let recorded = state
        .chain
        .record_valuation(token, value)
        .await
        .map_err(|e| ApiError::ChainError(e.to_string()))?;

    let valuation = state
        .db
        .mark_valuation_recorded(
            id,
            &recorded.receipt.tx_hash,
            recorded.onchain_valuation_id,
        )
        .await?
        .ok_or_else(|| {
            // 체인 기록과 published 전이 사이에 다른 요청이 선점한 경우
            ApiError::Conflict("valuation was already recorded".to_string())
        })?;

    // 부동산 감정가 갱신: 평가 published 이후의 베스트에포트 쓰기
    state
        .db
        .set_appraised_value(valuation.property_id, &value.to_string())
        .await?;

    let property = state.db.get_property(valuation.property_id).await?;
    if let Some(property) = property {
        notify_quietly(
            &state,
            property.owner_id,
            "valuation_published",
            "감정평가 체인 기록 완료",
            &format!("새 감정가 {} wei가 체인에 기록되었습니다.", value),
        )
        .await;
    }

    tracing::info!("Valuation recorded on chain: {} -> {}", id, recorded.receipt.tx_hash);

    Ok(Json(RecordOnchainResponse {
        valuation: valuation.into(),
        tx_hash: recorded.receipt.tx_hash,
    }))
}

/// GET /api/valuations/property/:property_id
pub async fn list_for_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ValuationListResponse>, ApiError> {
    state
        .db
        .get_property(property_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property".to_string()))?;

    let (page, limit) = (query.page(), query.limit());
    let (valuations, total) = state
        .db
        .list_valuations_for_property(property_id, page, limit)
        .await?;

    Ok(Json(ValuationListResponse {
        property_id: property_id.to_string(),
        valuations: valuations.into_iter().map(Into::into).collect(),
        pagination: Pagination::build(page, limit, total),
    }))
}
