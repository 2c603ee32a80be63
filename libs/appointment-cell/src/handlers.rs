// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::time::format_hhmm;
use shared_utils::extractor::require_admin;
use shared_utils::rate_limit::RateLimiter;

use crate::models::{
    Actor, Appointment, AppointmentSearchQuery, AvailabilityQuery, AvailabilityResponse,
    CancelAppointmentRequest, CompleteAppointmentRequest, CreateAppointmentRequest, ReminderReport,
    RescheduleAppointmentRequest, UpdateAppointmentRequest,
};
use crate::services::BookingService;

pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub booking: Arc<BookingService>,
    pub rate_limiter: Arc<RateLimiter>,
}

// ==============================================================================
// BOOKING
// ==============================================================================

pub async fn book_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    let actor = Actor::from_user(&user)?;
    let appointment = state.booking.create(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn get_availability(
    State(state): State<Arc<AppointmentState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let slots = state.booking.availability()
        .available_slots(query.clinic_id, query.date, query.service_id)
        .await?;

    Ok(Json(AvailabilityResponse {
        clinic_id: query.clinic_id,
        service_id: query.service_id,
        date: query.date,
        slots: slots.iter().map(format_hhmm).collect(),
    }))
}

pub async fn search_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentSearchQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let actor = Actor::from_user(&user)?;
    let appointments = state.booking.search(&actor, query).await?;
    Ok(Json(appointments))
}

pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    let actor = Actor::from_user(&user)?;
    let appointment = state.booking.get(&actor, appointment_id).await?;
    Ok(Json(appointment))
}

// ==============================================================================
// LIFECYCLE
// ==============================================================================

pub async fn update_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    let actor = Actor::from_user(&user)?;
    let appointment = state.booking.update(&actor, appointment_id, request).await?;
    Ok(Json(appointment))
}

pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    request: Option<Json<CancelAppointmentRequest>>,
) -> Result<Json<Appointment>, AppError> {
    let actor = Actor::from_user(&user)?;
    let Json(request) = request.unwrap_or_default();
    let appointment = state.booking.cancel(&actor, appointment_id, request.reason).await?;
    Ok(Json(appointment))
}

pub async fn confirm_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    let actor = Actor::from_user(&user)?;
    let appointment = state.booking.confirm(&actor, appointment_id).await?;
    Ok(Json(appointment))
}

pub async fn complete_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    request: Option<Json<CompleteAppointmentRequest>>,
) -> Result<Json<Appointment>, AppError> {
    let actor = Actor::from_user(&user)?;
    let Json(request) = request.unwrap_or_default();
    let appointment = state.booking.complete(&actor, appointment_id, request.notes).await?;
    Ok(Json(appointment))
}

pub async fn reschedule_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    let actor = Actor::from_user(&user)?;
    let appointment = state.booking.reschedule(&actor, appointment_id, request).await?;
    Ok(Json(appointment))
}

// ==============================================================================
// JOBS
// ==============================================================================

pub async fn send_reminders(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
) -> Result<Json<ReminderReport>, AppError> {
    require_admin(&user)?;
    let report = state.booking.send_upcoming_reminders().await?;
    Ok(Json(report))
}
