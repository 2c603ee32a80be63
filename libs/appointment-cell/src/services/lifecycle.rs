// libs/appointment-cell/src/services/lifecycle.rs
use chrono::Utc;
use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// Status changes staff may apply through an update.
pub fn valid_transitions(current: AppointmentStatus) -> &'static [AppointmentStatus] {
    match current {
        AppointmentStatus::Scheduled => &[
            AppointmentStatus::Confirmed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ],
        AppointmentStatus::Confirmed => &[
            AppointmentStatus::InProgress,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ],
        AppointmentStatus::InProgress => &[AppointmentStatus::Completed],
        // Terminal states
        AppointmentStatus::Completed
        | AppointmentStatus::Cancelled
        | AppointmentStatus::NoShow => &[],
    }
}

pub fn validate_status_transition(
    current: AppointmentStatus,
    next: AppointmentStatus,
) -> Result<(), AppointmentError> {
    debug!("Validating status transition {} -> {}", current, next);

    if !valid_transitions(current).contains(&next) {
        warn!("Invalid status transition attempted: {} -> {}", current, next);
        return Err(AppointmentError::InvalidStatusTransition { from: current, to: next });
    }
    Ok(())
}

pub fn ensure_cancellable(appointment: &Appointment) -> Result<(), AppointmentError> {
    match appointment.status {
        AppointmentStatus::Cancelled => Err(AppointmentError::AlreadyCancelled),
        AppointmentStatus::Completed => Err(AppointmentError::InvalidState(
            "completed appointments cannot be cancelled".to_string(),
        )),
        AppointmentStatus::NoShow => Err(AppointmentError::InvalidState(
            "no-show appointments cannot be cancelled".to_string(),
        )),
        _ => Ok(()),
    }
}

pub fn ensure_confirmable(appointment: &Appointment) -> Result<(), AppointmentError> {
    if appointment.status != AppointmentStatus::Scheduled {
        return Err(AppointmentError::InvalidState(
            "only scheduled appointments can be confirmed".to_string(),
        ));
    }
    Ok(())
}

pub fn ensure_completable(appointment: &Appointment) -> Result<(), AppointmentError> {
    match appointment.status {
        AppointmentStatus::Confirmed | AppointmentStatus::InProgress => Ok(()),
        _ => Err(AppointmentError::InvalidState(
            "only confirmed or in-progress appointments can be completed".to_string(),
        )),
    }
}

pub fn ensure_reschedulable(appointment: &Appointment) -> Result<(), AppointmentError> {
    match appointment.status {
        AppointmentStatus::Scheduled | AppointmentStatus::Confirmed => Ok(()),
        other => Err(AppointmentError::InvalidState(format!(
            "{} appointments cannot be rescheduled",
            other
        ))),
    }
}

/// Moves the appointment to `next` and stamps the matching timestamp.
pub fn apply_status(appointment: &mut Appointment, next: AppointmentStatus) {
    let now = Utc::now();
    match next {
        AppointmentStatus::Confirmed => appointment.confirmed_at = Some(now),
        AppointmentStatus::Completed => appointment.completed_at = Some(now),
        AppointmentStatus::Cancelled => appointment.cancelled_at = Some(now),
        AppointmentStatus::Scheduled => appointment.confirmed_at = None,
        AppointmentStatus::InProgress | AppointmentStatus::NoShow => {}
    }
    appointment.status = next;
}
