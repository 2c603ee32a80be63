// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use shared_database::{DatabaseError, SupabaseClient};

use crate::models::{Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus, DATE_FORMAT};

/// Appointment persistence. Implementations enforce the one-occupant-per-slot
/// rule atomically: the check and the write cannot interleave with another
/// writer.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// `SlotUnavailable` when a non-terminal appointment already holds
    /// `(clinic_id, date, time)`.
    async fn insert_if_slot_free(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Writes `appointment` if the stored version still equals
    /// `expected_version`; the stored version is bumped.
    async fn update(&self, appointment: Appointment, expected_version: i32) -> Result<Appointment, AppointmentError>;

    /// Non-terminal appointments of a clinic on a date.
    async fn list_occupying(&self, clinic_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, AppointmentError>;

    async fn search(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError>;

    async fn list_for_user_since(&self, user_id: Uuid, since: NaiveDate) -> Result<Vec<Appointment>, AppointmentError>;

    /// Non-terminal appointments dated within `from..=to` without a reminder.
    async fn list_pending_reminders(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Appointment>, AppointmentError>;
}

fn occupying_filter() -> String {
    let statuses: Vec<String> = AppointmentStatus::OCCUPYING.iter().map(|s| s.to_string()).collect();
    format!("status=in.({})", statuses.join(","))
}

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// ==============================================================================
// SUPABASE
// ==============================================================================

/// Relies on the partial unique index
/// `appointments(clinic_id, date, time) WHERE status IN ('SCHEDULED','CONFIRMED','IN_PROGRESS')`,
/// which makes PostgREST answer 409 for a taken slot.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, path, None, None).await?;
        Ok(rows)
    }
}

fn map_write_error(e: DatabaseError) -> AppointmentError {
    if e.is_conflict() {
        debug!("Slot uniqueness violated: {}", e);
        AppointmentError::SlotUnavailable
    } else {
        error!("Appointment write failed: {}", e);
        AppointmentError::Database(e)
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn insert_if_slot_free(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let body = serde_json::to_value(&appointment).map_err(DatabaseError::from)?;

        let rows: Vec<Appointment> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            None,
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(map_write_error)?;

        rows.into_iter().next().ok_or_else(|| {
            AppointmentError::Database(DatabaseError::NotFound("appointment insert returned no rows".to_string()))
        })
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let rows = self.fetch(&format!("/rest/v1/appointments?id=eq.{}", appointment_id)).await?;
        Ok(rows.into_iter().next())
    }

    async fn update(&self, mut appointment: Appointment, expected_version: i32) -> Result<Appointment, AppointmentError> {
        appointment.version = expected_version + 1;
        appointment.updated_at = Utc::now();

        let body = serde_json::to_value(&appointment).map_err(DatabaseError::from)?;
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&version=eq.{}",
            appointment.id, expected_version
        );

        let rows: Vec<Appointment> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            None,
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(map_write_error)?;

        rows.into_iter().next().ok_or(AppointmentError::ConcurrentModification)
    }

    async fn list_occupying(&self, clinic_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?clinic_id=eq.{}&date=eq.{}&{}&order=time.asc",
            clinic_id,
            fmt_date(date),
            occupying_filter()
        );
        self.fetch(&path).await
    }

    async fn search(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let mut filters = Vec::new();
        if let Some(clinic_id) = query.clinic_id {
            filters.push(format!("clinic_id=eq.{}", clinic_id));
        }
        if let Some(user_id) = query.user_id {
            filters.push(format!("user_id=eq.{}", user_id));
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(from) = query.from_date {
            filters.push(format!("date=gte.{}", fmt_date(from)));
        }
        if let Some(to) = query.to_date {
            filters.push(format!("date=lte.{}", fmt_date(to)));
        }
        filters.push("order=date.asc,time.asc".to_string());
        filters.push(format!("limit={}", query.effective_limit()));
        filters.push(format!("offset={}", query.effective_offset()));

        self.fetch(&format!("/rest/v1/appointments?{}", filters.join("&"))).await
    }

    async fn list_for_user_since(&self, user_id: Uuid, since: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?user_id=eq.{}&date=gte.{}",
            user_id,
            fmt_date(since)
        );
        self.fetch(&path).await
    }

    async fn list_pending_reminders(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?{}&reminder_sent_at=is.null&date=gte.{}&date=lte.{}",
            occupying_filter(),
            fmt_date(from),
            fmt_date(to)
        );
        self.fetch(&path).await
    }
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

/// Check-and-write under a single mutex guard.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: Mutex<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn slot_held_by_other(appointments: &HashMap<Uuid, Appointment>, candidate: &Appointment) -> bool {
    candidate.status.occupies_slot()
        && appointments.values().any(|existing| {
            existing.id != candidate.id
                && existing.status.occupies_slot()
                && existing.clinic_id == candidate.clinic_id
                && existing.date == candidate.date
                && existing.time == candidate.time
        })
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn insert_if_slot_free(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.lock().await;

        if slot_held_by_other(&appointments, &appointment) {
            return Err(AppointmentError::SlotUnavailable);
        }

        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointments.lock().await.get(&appointment_id).cloned())
    }

    async fn update(&self, mut appointment: Appointment, expected_version: i32) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.lock().await;

        let current_version = appointments.get(&appointment.id)
            .map(|stored| stored.version)
            .ok_or(AppointmentError::NotFound)?;
        if current_version != expected_version {
            return Err(AppointmentError::ConcurrentModification);
        }
        if slot_held_by_other(&appointments, &appointment) {
            return Err(AppointmentError::SlotUnavailable);
        }

        appointment.version = expected_version + 1;
        appointment.updated_at = Utc::now();
        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn list_occupying(&self, clinic_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.lock().await;
        let mut list: Vec<Appointment> = appointments.values()
            .filter(|a| a.clinic_id == clinic_id && a.date == date && a.status.occupies_slot())
            .cloned()
            .collect();
        list.sort_by_key(|a| a.time);
        Ok(list)
    }

    async fn search(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.lock().await;
        let mut list: Vec<Appointment> = appointments.values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        list.sort_by_key(|a| (a.date, a.time));

        Ok(list.into_iter()
            .skip(query.effective_offset())
            .take(query.effective_limit())
            .collect())
    }

    async fn list_for_user_since(&self, user_id: Uuid, since: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.lock().await;
        Ok(appointments.values()
            .filter(|a| a.user_id == user_id && a.date >= since)
            .cloned()
            .collect())
    }

    async fn list_pending_reminders(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.lock().await;
        Ok(appointments.values()
            .filter(|a| a.status.occupies_slot() && a.reminder_sent_at.is_none())
            .filter(|a| a.date >= from && a.date <= to)
            .cloned()
            .collect())
    }
}
