//! Income Distribution Endpoints
//!
//! 수익 분배 라이프사이클:
//! scheduled → in_progress → {completed, failed}, scheduled → cancelled
//!
//! 실행과 취소는 scheduled 행 선점(조건부 UPDATE)으로 시작한다 -
//! 같은 분배에 대한 동시 실행/취소는 한쪽만 이긴다.
//!
//! 생성 시 보유 현황을 스냅샷해서 지분 비례 수령자 배열을 만들고,
//! Σ shares / Σ amount 불변식을 저장 전에 검증한다.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notify_quietly;
use crate::{
    auth::{self, Role},
    db::{IncomeDistribution, IncomeRecord, NewDistribution, OwnershipSnapshot, Receiver},
    error::ApiError,
    services::{settlement, SettlementError},
    types::{property_status, DistributionStatus, PageQuery, Pagination, Wei},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_distribution))
        .route("/:id", get(get_distribution))
        .route("/:id/execute", post(execute_distribution))
        .route("/:id/cancel", post(cancel_distribution))
        .route("/property/:property_id", get(list_for_property))
}

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct CreateDistributionRequest {
    pub property_id: Uuid,
    /// rent / sale / other
    pub income_type: String,
    /// 분배 총액 (wei 문자열)
    pub total_amount: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct DistributionResponse {
    pub id: String,
    pub property_id: String,
    pub income_type: String,
    pub total_amount: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: String,
    pub receivers: Vec<Receiver>,
    pub ownership_snapshot: OwnershipSnapshot,
    pub onchain_distribution_id: Option<i64>,
    pub register_tx_hash: Option<String>,
    pub execute_tx_hash: Option<String>,
    pub metadata: serde_json::Value,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<IncomeDistribution> for DistributionResponse {
    fn from(d: IncomeDistribution) -> Self {
        Self {
            id: d.id.to_string(),
            property_id: d.property_id.to_string(),
            income_type: d.income_type,
            total_amount: d.total_amount,
            period_start: d.period_start,
            period_end: d.period_end,
            status: d.status,
            receivers: d.receivers.0,
            ownership_snapshot: d.ownership_snapshot.0,
            onchain_distribution_id: d.onchain_distribution_id,
            register_tx_hash: d.register_tx_hash,
            execute_tx_hash: d.execute_tx_hash,
            metadata: d.metadata.0,
            created_by: d.created_by.to_string(),
            created_at: d.created_at.to_rfc3339(),
            updated_at: d.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DistributionListResponse {
    pub property_id: String,
    pub distributions: Vec<DistributionResponse>,
    pub pagination: Pagination,
}

// ============ Handlers ============

/// POST /api/incomes
///
/// 분배 생성 (distributor/admin). 토큰화 완료된 부동산만.
///
/// # Flow
///
/// 1. 보유 현황 스냅샷 → 지분 비례 수령자 계산 (합계 불변식 검증)
/// 2. scheduled 상태로 저장
/// 3. 체인 게이트웨이가 있으면 등록 시도: 실패는 로그만 남기고
///    분배 자체는 살아있다 (등록 안 된 분배는 오프체인으로 실행됨)
pub async fn create_distribution(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateDistributionRequest>,
) -> Result<(axum::http::StatusCode, Json<DistributionResponse>), ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    auth::require_role(&user, &[Role::Distributor])?;

    if !matches!(req.income_type.as_str(), "rent" | "sale" | "other") {
        return Err(ApiError::ValidationError(format!(
            "unknown income_type: {}",
            req.income_type
        )));
    }
    if req.period_end < req.period_start {
        return Err(ApiError::ValidationError(
            "period_end must not be before period_start".to_string(),
        ));
    }
    let total_amount: Wei = req
        .total_amount
        .parse()
        .map_err(ApiError::ValidationError)?;
    if total_amount == Wei::ZERO {
        return Err(ApiError::ValidationError(
            "total_amount must be positive".to_string(),
        ));
    }

    let property = state
        .db
        .get_property(req.property_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property".to_string()))?;

    if property.status != property_status::TOKENIZED {
        return Err(ApiError::BadRequest(
            "property must be tokenized before distributing income".to_string(),
        ));
    }

    let share = state
        .db
        .get_share_by_property(req.property_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Share".to_string()))?;

    // 보유 현황 스냅샷 → 수령자 계산
    let (receivers, snapshot) =
        settlement::snapshot_receivers(state.db.as_ref(), share.id, total_amount)
            .await
            .map_err(|e| match e {
                SettlementError::NoHolders => {
                    ApiError::BadRequest("no shareholders to distribute to".to_string())
                }
                SettlementError::Overflow => {
                    ApiError::ValidationError("distribution amount overflow".to_string())
                }
                SettlementError::Source(err) => err.into(),
            })?;

    // 저장 전 최종 불변식 확인: 위반은 계산 버그
    if !settlement::verify_receiver_sums(&receivers, &snapshot, total_amount) {
        tracing::error!(
            "Receiver sum invariant violated for property {}",
            req.property_id
        );
        return Err(ApiError::InternalError);
    }

    let distribution = state
        .db
        .create_distribution(NewDistribution {
            property_id: req.property_id,
            income_type: &req.income_type,
            total_amount: &total_amount.to_string(),
            period_start: req.period_start,
            period_end: req.period_end,
            receivers,
            snapshot,
            created_by: user.id,
        })
        .await?;

    tracing::info!(
        "Income distribution created: {} ({} wei, {} receivers)",
        distribution.id,
        distribution.total_amount,
        distribution.receivers.0.len()
    );

    // 체인 등록은 베스트에포트: 실패해도 분배는 scheduled로 남는다
    let distribution = match try_register_onchain(&state, &distribution, total_amount).await {
        Some(registered) => registered,
        None => distribution,
    };

    Ok((axum::http::StatusCode::CREATED, Json(distribution.into())))
}

/// GET /api/incomes/:id
pub async fn get_distribution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DistributionResponse>, ApiError> {
    let distribution = state
        .db
        .get_distribution(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Distribution".to_string()))?;
    Ok(Json(distribution.into()))
}

/// POST /api/incomes/:id/execute
///
/// 분배 실행 (distributor/admin). scheduled 상태만.
///
/// # Flow
///
/// 1. scheduled → in_progress 선점 (진 쪽은 409)
/// 2. 체인 등록된 분배: 자금 예치 → 체인 실행
/// 3. 성공: completed + 수령자 전원 completed + 부동산 수익 이력 추가
/// 4. 실패: failed + 에러를 metadata에 기록 + 500
pub async fn execute_distribution(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<DistributionResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    auth::require_role(&user, &[Role::Distributor])?;

    let distribution = state
        .db
        .get_distribution(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Distribution".to_string()))?;

    if distribution.status != DistributionStatus::Scheduled.as_str() {
        return Err(ApiError::BadRequest(
            "only scheduled distributions can be executed".to_string(),
        ));
    }

    // 체인 등록된 분배는 게이트웨이 없이 실행할 수 없다: 선점 전에 거른다
    if distribution.onchain_distribution_id.is_some() && !state.chain.is_configured() {
        return Err(ApiError::ServiceUnavailable("chain gateway".to_string()));
    }

    let total_amount: Wei = distribution
        .total_amount
        .parse()
        .map_err(ApiError::ValidationError)?;

    // 실행 선점: 동시 실행 차단
    let mut claimed = state
        .db
        .claim_distribution_for_execution(id)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict("distribution is already being executed".to_string())
        })?;

    let mut receivers = claimed.receivers.0.clone();
    settlement::mark_processing(&mut receivers);

    // 체인 등록된 분배: 예치 → 실행
    let chain_result: Result<Option<String>, anyhow::Error> = match claimed
        .onchain_distribution_id
    {
        Some(onchain_id) => {
            async {
                state
                    .chain
                    .deposit_distribution_funds(onchain_id, total_amount)
                    .await?;
                let receipt = state.chain.execute_distribution(onchain_id).await?;
                Ok(Some(receipt.tx_hash))
            }
            .await
        }
        None => Ok(None),
    };

    let execute_tx_hash = match chain_result {
        Ok(hash) => hash,
        Err(e) => {
            // 실패 기록 후 에러 전파
            let message = format!("{:#}", e);
            tracing::error!("Distribution execution failed: {} ({})", id, message);
            settlement::mark_failed(&mut receivers, &message);
            state.db.fail_distribution(id, &receivers, &message).await?;
            return Err(ApiError::ChainError(message));
        }
    };

    settlement::mark_completed(&mut receivers);
    claimed = state
        .db
        .complete_distribution(id, &receivers, execute_tx_hash.as_deref())
        .await?
        .ok_or(ApiError::InternalError)?;

    // 부동산 수익 이력 추가
    state
        .db
        .append_income_history(
            claimed.property_id,
            &IncomeRecord {
                distribution_id: claimed.id,
                income_type: claimed.income_type.clone(),
                total_amount: claimed.total_amount.clone(),
                distributed_at: chrono::Utc::now(),
            },
        )
        .await?;

    // 수령자 알림: 실패는 로그만
    for receiver in &receivers {
        notify_quietly(
            &state,
            receiver.user_id,
            "income_distributed",
            "수익 분배 완료",
            &format!("{} wei가 분배되었습니다.", receiver.amount),
        )
        .await;
    }

    tracing::info!("Income distribution executed: {}", id);

    Ok(Json(claimed.into()))
}

/// POST /api/incomes/:id/cancel
///
/// 분배 취소 (distributor/admin). scheduled 상태만.
/// scheduled → cancelled 선점 후 체인 등록분이면 체인도 취소.
/// 체인 취소 실패는 metadata에 남기고 500: 로컬 상태는 cancelled 유지.
pub async fn cancel_distribution(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<DistributionResponse>, ApiError> {
    let user = auth::require_user(&state, &headers).await?;
    auth::require_role(&user, &[Role::Distributor])?;

    let distribution = state
        .db
        .get_distribution(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Distribution".to_string()))?;

    if distribution.status != DistributionStatus::Scheduled.as_str() {
        return Err(ApiError::BadRequest(
            "only scheduled distributions can be cancelled".to_string(),
        ));
    }
    if distribution.onchain_distribution_id.is_some() && !state.chain.is_configured() {
        return Err(ApiError::ServiceUnavailable("chain gateway".to_string()));
    }

    let claimed = state
        .db
        .claim_distribution_for_cancel(id)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict("distribution is no longer scheduled".to_string())
        })?;

    if let Some(onchain_id) = claimed.onchain_distribution_id {
        if let Err(e) = state.chain.cancel_distribution(onchain_id).await {
            let message = format!("{:#}", e);
            tracing::error!("On-chain cancel failed for {}: {}", id, message);
            state.db.record_distribution_error(id, &message).await?;
            return Err(ApiError::ChainError(message));
        }
    }

    tracing::info!("Income distribution cancelled: {}", id);

    Ok(Json(claimed.into()))
}

/// GET /api/incomes/property/:property_id
pub async fn list_for_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<DistributionListResponse>, ApiError> {
    state
        .db
        .get_property(property_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property".to_string()))?;

    let (page, limit) = (query.page(), query.limit());
    let (distributions, total) = state
        .db
        .list_distributions_for_property(property_id, page, limit)
        .await?;

    Ok(Json(DistributionListResponse {
        property_id: property_id.to_string(),
        distributions: distributions.into_iter().map(Into::into).collect(),
        pagination: Pagination::build(page, limit, total),
    }))
}

// ============ Helpers ============

/// 체인 등록 시도: 실패하면 None (분배는 scheduled로 유지)
async fn try_register_onchain(
    state: &AppState,
    distribution: &IncomeDistribution,
    total_amount: Wei,
) -> Option<IncomeDistribution> {
    if !state.chain.is_configured() {
        return None;
    }

    let onchain_token_id = match state
        .db
        .get_token_by_property(distribution.property_id)
        .await
    {
        Ok(token) => token.and_then(|t| t.onchain_token_id)?,
        Err(e) => {
            tracing::warn!("Token lookup failed during chain registration: {:?}", e);
            return None;
        }
    };

    match state
        .chain
        .register_distribution(onchain_token_id, total_amount)
        .await
    {
        Ok(registered) => {
            if let Err(e) = state
                .db
                .mark_distribution_registered(
                    distribution.id,
                    registered.onchain_distribution_id,
                    &registered.receipt.tx_hash,
                )
                .await
            {
                tracing::warn!("Failed to persist chain registration: {:?}", e);
                return None;
            }
            tracing::info!(
                "Distribution {} registered on chain as {}",
                distribution.id,
                registered.onchain_distribution_id
            );
            state.db.get_distribution(distribution.id).await.ok().flatten()
        }
        Err(e) => {
            // 원 설계 유지: 등록 실패는 호출자에게 드러내지 않는다
            tracing::warn!(
                "On-chain registration failed for {}: {:#}",
                distribution.id,
                e
            );
            None
        }
    }
}
