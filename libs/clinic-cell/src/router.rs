use std::sync::Arc;

use axum::{
    Router,
    routing::{get, put},
    middleware,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, ClinicState};

pub fn clinic_routes(state: Arc<ClinicState>) -> Router {
    Router::new()
        .route("/", get(handlers::list_clinics).post(handlers::create_clinic))
        .route("/{clinic_id}", get(handlers::get_clinic))
        .route("/{clinic_id}/services", get(handlers::list_services).post(handlers::create_service))
        .route("/services/{service_id}", put(handlers::update_service))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
