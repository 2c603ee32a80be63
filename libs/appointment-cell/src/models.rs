// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use clinic_cell::CatalogError;
use shared_database::DatabaseError;
use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;
use shared_models::time::{hhmm, parse_hhmm};
use shared_models::validation::ValidationErrors;
use shared_utils::extractor::user_uuid;
use vip_cell::VipError;

use crate::services::pricing::PriceQuote;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ==============================================================================
// APPOINTMENT
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const OCCUPYING: [AppointmentStatus; 3] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow)
    }

    /// Non-terminal appointments hold their clinic slot.
    pub fn occupies_slot(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::InProgress => "IN_PROGRESS",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::NoShow => "NO_SHOW",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub clinic_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    /// Clinic-local start time.
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    pub original_price: f64,
    pub final_price: f64,
    pub vip_discount_percent: f64,
    pub notes: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn scheduled(booking: &NewAppointment, user_id: Uuid, quote: PriceQuote) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            clinic_id: booking.clinic_id,
            service_id: booking.service_id,
            date: booking.date,
            time: booking.time,
            status: AppointmentStatus::Scheduled,
            original_price: quote.original_price,
            final_price: quote.final_price,
            vip_discount_percent: quote.applied_discount_percent,
            notes: booking.notes.clone(),
            confirmed_at: None,
            cancelled_at: None,
            cancel_reason: None,
            completed_at: None,
            reminder_sent_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_quote(&mut self, quote: PriceQuote) {
        self.original_price = quote.original_price;
        self.final_price = quote.final_price;
        self.vip_discount_percent = quote.applied_discount_percent;
    }

    pub fn append_note(&mut self, note: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, note),
            _ => note.to_string(),
        });
    }
}

/// Who is acting on an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn from_user(user: &User) -> Result<Self, AppError> {
        Ok(Self::new(user_uuid(user)?, user.user_role()))
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn can_access(&self, appointment: &Appointment) -> bool {
        self.is_staff() || appointment.user_id == self.user_id
    }
}

// ==============================================================================
// REQUESTS
// ==============================================================================

fn parse_date(errors: &mut ValidationErrors, field: &str, raw: &str) -> Option<NaiveDate> {
    let parsed = NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok();
    if parsed.is_none() {
        errors.add(field, "expected YYYY-MM-DD");
    }
    parsed
}

fn parse_time(errors: &mut ValidationErrors, field: &str, raw: &str) -> Option<NaiveTime> {
    let parsed = parse_hhmm(raw.trim());
    if parsed.is_none() {
        errors.add(field, "expected HH:MM");
    }
    parsed
}

fn check_notes(errors: &mut ValidationErrors, notes: &Option<String>) {
    if matches!(notes, Some(n) if n.chars().count() > 2000) {
        errors.add("notes", "must be at most 2000 characters");
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointmentRequest {
    /// Staff may book on behalf of a client; defaults to the caller.
    pub user_id: Option<Uuid>,
    pub clinic_id: Uuid,
    pub service_id: Uuid,
    pub date: String,
    pub time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub user_id: Option<Uuid>,
    pub clinic_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub notes: Option<String>,
}

impl CreateAppointmentRequest {
    pub fn validate(self) -> Result<NewAppointment, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let date = parse_date(&mut errors, "date", &self.date);
        let time = parse_time(&mut errors, "time", &self.time);
        check_notes(&mut errors, &self.notes);

        match (date, time) {
            (Some(date), Some(time)) if errors.is_empty() => Ok(NewAppointment {
                user_id: self.user_id,
                clinic_id: self.clinic_id,
                service_id: self.service_id,
                date,
                time,
                notes: self.notes,
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub date: Option<String>,
    pub time: Option<String>,
    pub service_id: Option<Uuid>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentChanges {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub service_id: Option<Uuid>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentChanges {
    pub fn moves_slot(&self) -> bool {
        self.date.is_some() || self.time.is_some()
    }

    pub fn touches_schedule(&self) -> bool {
        self.moves_slot() || self.service_id.is_some()
    }
}

impl UpdateAppointmentRequest {
    pub fn validate(self) -> Result<AppointmentChanges, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.date.is_none() && self.time.is_none() && self.service_id.is_none()
            && self.notes.is_none() && self.status.is_none()
        {
            errors.add("body", "at least one field must be provided");
        }

        let date = self.date.as_deref().and_then(|raw| parse_date(&mut errors, "date", raw));
        let time = self.time.as_deref().and_then(|raw| parse_time(&mut errors, "time", raw));
        check_notes(&mut errors, &self.notes);

        errors.into_result(AppointmentChanges {
            date,
            time,
            service_id: self.service_id,
            notes: self.notes,
            status: self.status,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteAppointmentRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub date: String,
    pub time: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RescheduleTo {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub reason: Option<String>,
}

impl RescheduleAppointmentRequest {
    pub fn validate(self) -> Result<RescheduleTo, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let date = parse_date(&mut errors, "date", &self.date);
        let time = parse_time(&mut errors, "time", &self.time);

        match (date, time) {
            (Some(date), Some(time)) => Ok(RescheduleTo { date, time, reason: self.reason }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub clinic_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityResponse {
    pub clinic_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentSearchQuery {
    pub clinic_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AppointmentSearchQuery {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 200;

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.clinic_id.map_or(true, |id| appointment.clinic_id == id)
            && self.user_id.map_or(true, |id| appointment.user_id == id)
            && self.status.map_or(true, |status| appointment.status == status)
            && self.from_date.map_or(true, |from| appointment.date >= from)
            && self.to_date.map_or(true, |to| appointment.date <= to)
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReminderReport {
    pub reminders_sent: usize,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment slot not available")]
    SlotUnavailable,

    #[error("Appointment is already cancelled")]
    AlreadyCancelled,

    #[error("Appointment was modified concurrently, reload and retry")]
    ConcurrentModification,

    #[error("Cannot change status from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("{0}")]
    InvalidState(String),

    #[error("Appointment must be in the future")]
    InPast,

    #[error("{0}")]
    Forbidden(String),

    #[error("Service is reserved for VIP members")]
    VipOnly,

    #[error("Invalid request: {0}")]
    Invalid(#[from] ValidationErrors),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Vip(#[from] VipError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => AppError::NotFound(err.to_string()),
            AppointmentError::SlotUnavailable
            | AppointmentError::AlreadyCancelled
            | AppointmentError::ConcurrentModification => AppError::Conflict(err.to_string()),
            AppointmentError::InvalidStatusTransition { .. }
            | AppointmentError::InvalidState(_)
            | AppointmentError::InPast => AppError::ValidationError(err.to_string()),
            AppointmentError::Forbidden(_) | AppointmentError::VipOnly => AppError::Forbidden(err.to_string()),
            AppointmentError::Invalid(errors) => AppError::InvalidFields(errors),
            AppointmentError::Catalog(e) => e.into(),
            AppointmentError::Vip(e) => e.into(),
            AppointmentError::Database(e) => AppError::Database(e.to_string()),
        }
    }
}
