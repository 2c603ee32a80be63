// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, patch},
    middleware,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::rate_limit::rate_limit_middleware;

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    // Booking writes are throttled per user
    let limited_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route_layer(middleware::from_fn_with_state(state.rate_limiter.clone(), rate_limit_middleware));

    Router::new()
        .route("/search", get(handlers::search_appointments))
        .route("/availability", get(handlers::get_availability))
        .route("/{appointment_id}", get(handlers::get_appointment).put(handlers::update_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/confirm", post(handlers::confirm_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .route("/jobs/reminders", post(handlers::send_reminders))
        .merge(limited_routes)
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
