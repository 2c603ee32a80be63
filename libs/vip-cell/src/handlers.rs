use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::{require_admin, user_uuid};
use shared_utils::rate_limit::RateLimiter;

use crate::models::{
    CancelSubscriptionRequest, SubscribeRequest, SweepReport, VipPlan, VipStatusResponse,
    VipSubscription,
};
use crate::services::VipSubscriptionService;

pub struct VipState {
    pub config: Arc<AppConfig>,
    pub subscriptions: Arc<VipSubscriptionService>,
    pub rate_limiter: Arc<RateLimiter>,
}

pub async fn list_plans(
    State(state): State<Arc<VipState>>,
) -> Json<Vec<VipPlan>> {
    Json(state.subscriptions.plans())
}

pub async fn subscribe(
    State(state): State<Arc<VipState>>,
    Extension(user): Extension<User>,
    Json(request): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<VipSubscription>), AppError> {
    let user_id = user_uuid(&user)?;
    let subscription = state.subscriptions.subscribe(user_id, request).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn cancel_subscription(
    State(state): State<Arc<VipState>>,
    Extension(user): Extension<User>,
    request: Option<Json<CancelSubscriptionRequest>>,
) -> Result<Json<VipSubscription>, AppError> {
    let user_id = user_uuid(&user)?;
    let Json(request) = request.unwrap_or_default();
    let subscription = state.subscriptions.cancel(user_id, request.reason).await?;
    Ok(Json(subscription))
}

pub async fn get_status(
    State(state): State<Arc<VipState>>,
    Extension(user): Extension<User>,
) -> Result<Json<VipStatusResponse>, AppError> {
    let user_id = user_uuid(&user)?;
    let status = state.subscriptions.current_status(user_id).await?;
    Ok(Json(status))
}

pub async fn run_expiry_sweep(
    State(state): State<Arc<VipState>>,
    Extension(user): Extension<User>,
) -> Result<Json<SweepReport>, AppError> {
    require_admin(&user)?;
    let report = state.subscriptions.sweep_expired().await?;
    Ok(Json(report))
}
