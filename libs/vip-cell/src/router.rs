use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::rate_limit::rate_limit_middleware;

use crate::handlers::{self, VipState};

pub fn vip_routes(state: Arc<VipState>) -> Router {
    let limited_routes = Router::new()
        .route("/subscribe", post(handlers::subscribe))
        .route_layer(middleware::from_fn_with_state(state.rate_limiter.clone(), rate_limit_middleware));

    Router::new()
        .route("/plans", get(handlers::list_plans))
        .route("/status", get(handlers::get_status))
        .route("/cancel", post(handlers::cancel_subscription))
        .route("/jobs/sweep", post(handlers::run_expiry_sweep))
        .merge(limited_routes)
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
