// libs/appointment-cell/src/services/booking.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use clinic_cell::{CatalogService, Clinic, Service};
use notification_cell::{Notification, NotificationDispatcher, NotificationKind};
use vip_cell::VipStatusProvider;

use crate::models::{
    Actor, Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    CreateAppointmentRequest, ReminderReport, RescheduleAppointmentRequest, UpdateAppointmentRequest,
};
use crate::services::availability::AvailabilityChecker;
use crate::services::lifecycle;
use crate::services::pricing::calculate_price;
use crate::services::store::AppointmentStore;

/// Reminders go out for appointments starting within this window.
const REMINDER_WINDOW_HOURS: i64 = 24;

pub struct BookingService {
    catalog: CatalogService,
    store: Arc<dyn AppointmentStore>,
    availability: AvailabilityChecker,
    vip: Arc<dyn VipStatusProvider>,
    notifications: NotificationDispatcher,
}

impl BookingService {
    pub fn new(
        catalog: CatalogService,
        store: Arc<dyn AppointmentStore>,
        vip: Arc<dyn VipStatusProvider>,
        notifications: NotificationDispatcher,
    ) -> Self {
        let availability = AvailabilityChecker::new(catalog.clone(), Arc::clone(&store));
        Self {
            catalog,
            store,
            availability,
            vip,
            notifications,
        }
    }

    pub fn availability(&self) -> &AvailabilityChecker {
        &self.availability
    }

    pub async fn create(&self, actor: &Actor, request: CreateAppointmentRequest) -> Result<Appointment, AppointmentError> {
        let booking = request.validate()?;

        let user_id = booking.user_id.unwrap_or(actor.user_id);
        if user_id != actor.user_id && !actor.is_staff() {
            return Err(AppointmentError::Forbidden("clients can only book for themselves".to_string()));
        }

        let (clinic, service) = self.catalog.bookable(booking.clinic_id, booking.service_id).await?;
        ensure_future(&clinic, booking.date, booking.time)?;

        let is_vip = self.vip.is_vip(user_id).await?;
        if service.is_vip_only && !is_vip {
            return Err(AppointmentError::VipOnly);
        }

        if !self.availability.is_slot_available(&clinic, &service, booking.date, booking.time, None).await? {
            return Err(AppointmentError::SlotUnavailable);
        }

        let quote = calculate_price(service.price, service.vip_discount_percent, is_vip);
        let appointment = Appointment::scheduled(&booking, user_id, quote);

        // The store re-checks the slot atomically; a concurrent booking loses here
        let appointment = self.store.insert_if_slot_free(appointment).await?;

        info!(
            "Appointment {} booked for user {} at clinic {} on {} {} ({:.2})",
            appointment.id, user_id, clinic.id, appointment.date, appointment.time, appointment.final_price
        );
        self.notify(NotificationKind::AppointmentBooked, &appointment);

        Ok(appointment)
    }

    pub async fn get(&self, actor: &Actor, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        authorize(actor, &appointment)?;
        Ok(appointment)
    }

    /// Clients only ever see their own appointments.
    pub async fn search(&self, actor: &Actor, mut query: AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError> {
        if !actor.is_staff() {
            query.user_id = Some(actor.user_id);
        }
        debug!("Searching appointments: {:?}", query);
        self.store.search(&query).await
    }

    pub async fn update(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let changes = request.validate()?;
        let current = self.load(appointment_id).await?;
        authorize(actor, &current)?;

        if changes.status.is_some() && !actor.is_staff() {
            return Err(AppointmentError::Forbidden("only staff can change appointment status".to_string()));
        }
        if changes.touches_schedule() && current.status.is_terminal() {
            return Err(AppointmentError::InvalidState(format!(
                "{} appointments cannot be modified",
                current.status
            )));
        }

        let mut next = current.clone();

        if let Some(status) = changes.status.filter(|status| *status != current.status) {
            lifecycle::validate_status_transition(current.status, status)?;
            lifecycle::apply_status(&mut next, status);
        }

        if changes.touches_schedule() {
            next.date = changes.date.unwrap_or(current.date);
            next.time = changes.time.unwrap_or(current.time);
            next.service_id = changes.service_id.unwrap_or(current.service_id);

            let (clinic, service) = if changes.service_id.is_some() {
                self.catalog.bookable(next.clinic_id, next.service_id).await?
            } else {
                self.schedule_context(&next).await?
            };

            if changes.moves_slot() {
                ensure_future(&clinic, next.date, next.time)?;
            }
            if next.status.occupies_slot()
                && !self.availability.is_slot_available(&clinic, &service, next.date, next.time, Some(current.id)).await?
            {
                return Err(AppointmentError::SlotUnavailable);
            }

            // A moved appointment needs a fresh confirmation, as with reschedule
            let slot_moved = next.date != current.date || next.time != current.time;
            if slot_moved && changes.status.is_none() && next.status == AppointmentStatus::Confirmed {
                lifecycle::apply_status(&mut next, AppointmentStatus::Scheduled);
            }

            if changes.service_id.is_some() && changes.service_id != Some(current.service_id) {
                // Priced for the appointment owner, not the actor
                let is_vip = self.vip.is_vip(current.user_id).await?;
                if service.is_vip_only && !is_vip {
                    return Err(AppointmentError::VipOnly);
                }
                next.apply_quote(calculate_price(service.price, service.vip_discount_percent, is_vip));
            }
        }

        if let Some(notes) = changes.notes {
            next.notes = Some(notes);
        }

        let updated = self.store.update(next, current.version).await?;
        info!("Appointment {} updated by {}", updated.id, actor.user_id);

        let kind = if updated.status != current.status {
            status_notification(updated.status)
        } else if updated.date != current.date || updated.time != current.time {
            NotificationKind::AppointmentRescheduled
        } else {
            NotificationKind::AppointmentUpdated
        };
        self.notify(kind, &updated);

        Ok(updated)
    }

    pub async fn cancel(&self, actor: &Actor, appointment_id: Uuid, reason: Option<String>) -> Result<Appointment, AppointmentError> {
        let current = self.load(appointment_id).await?;
        authorize(actor, &current)?;
        lifecycle::ensure_cancellable(&current)?;

        let mut next = current.clone();
        lifecycle::apply_status(&mut next, AppointmentStatus::Cancelled);
        next.cancel_reason = reason;

        let cancelled = self.store.update(next, current.version).await?;
        info!("Appointment {} cancelled by {}", cancelled.id, actor.user_id);
        self.notify(NotificationKind::AppointmentCancelled, &cancelled);

        Ok(cancelled)
    }

    pub async fn confirm(&self, actor: &Actor, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let current = self.load(appointment_id).await?;
        authorize(actor, &current)?;
        lifecycle::ensure_confirmable(&current)?;

        let mut next = current.clone();
        lifecycle::apply_status(&mut next, AppointmentStatus::Confirmed);

        let confirmed = self.store.update(next, current.version).await?;
        info!("Appointment {} confirmed", confirmed.id);
        self.notify(NotificationKind::AppointmentConfirmed, &confirmed);

        Ok(confirmed)
    }

    pub async fn complete(&self, actor: &Actor, appointment_id: Uuid, notes: Option<String>) -> Result<Appointment, AppointmentError> {
        if !actor.is_staff() {
            return Err(AppointmentError::Forbidden("only staff can complete appointments".to_string()));
        }

        let current = self.load(appointment_id).await?;
        lifecycle::ensure_completable(&current)?;

        let mut next = current.clone();
        lifecycle::apply_status(&mut next, AppointmentStatus::Completed);
        if let Some(notes) = notes.as_deref().filter(|n| !n.trim().is_empty()) {
            next.append_note(notes);
        }

        let completed = self.store.update(next, current.version).await?;
        info!("Appointment {} completed", completed.id);
        self.notify(NotificationKind::AppointmentCompleted, &completed);

        Ok(completed)
    }

    /// Moves the appointment to a new slot; it goes back to SCHEDULED.
    pub async fn reschedule(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let target = request.validate()?;
        let current = self.load(appointment_id).await?;
        authorize(actor, &current)?;
        lifecycle::ensure_reschedulable(&current)?;

        let (clinic, service) = self.schedule_context(&current).await?;
        ensure_future(&clinic, target.date, target.time)?;

        if !self.availability.is_slot_available(&clinic, &service, target.date, target.time, Some(current.id)).await? {
            return Err(AppointmentError::SlotUnavailable);
        }

        let mut next = current.clone();
        next.date = target.date;
        next.time = target.time;
        lifecycle::apply_status(&mut next, AppointmentStatus::Scheduled);
        if let Some(reason) = target.reason.as_deref().filter(|r| !r.trim().is_empty()) {
            next.append_note(&format!("Rescheduled: {}", reason));
        }

        let rescheduled = self.store.update(next, current.version).await?;
        info!(
            "Appointment {} rescheduled from {} {} to {} {}",
            rescheduled.id, current.date, current.time, rescheduled.date, rescheduled.time
        );
        self.notify(NotificationKind::AppointmentRescheduled, &rescheduled);

        Ok(rescheduled)
    }

    /// Batch job: reminds clients of appointments starting within the next
    /// 24 hours, clinic local time. Each appointment is reminded once.
    pub async fn send_upcoming_reminders(&self) -> Result<ReminderReport, AppointmentError> {
        let now = Utc::now();
        let today = now.date_naive();
        // Clinic offsets are within a day of UTC
        let candidates = self.store
            .list_pending_reminders(today - Duration::days(1), today + Duration::days(2))
            .await?;

        let mut clinics: HashMap<Uuid, Clinic> = HashMap::new();
        let mut report = ReminderReport::default();

        for appointment in candidates {
            let clinic = match clinics.get(&appointment.clinic_id) {
                Some(clinic) => clinic.clone(),
                None => match self.catalog.get_clinic(appointment.clinic_id).await {
                    Ok(clinic) => {
                        clinics.insert(clinic.id, clinic.clone());
                        clinic
                    }
                    Err(e) => {
                        warn!("Skipping reminder for appointment {}: {}", appointment.id, e);
                        continue;
                    }
                },
            };

            let local_now = clinic.local_time_at(now);
            let starts_at = appointment.date.and_time(appointment.time);
            if starts_at <= local_now || starts_at > local_now + Duration::hours(REMINDER_WINDOW_HOURS) {
                continue;
            }

            let (id, version) = (appointment.id, appointment.version);
            let mut stamped = appointment;
            stamped.reminder_sent_at = Some(now);

            match self.store.update(stamped, version).await {
                Ok(updated) => {
                    self.notify(NotificationKind::AppointmentReminder, &updated);
                    report.reminders_sent += 1;
                }
                Err(AppointmentError::ConcurrentModification) => {
                    warn!("Appointment changed while sending reminders, skipping");
                }
                Err(e) => {
                    error!("Failed to stamp reminder for appointment {}: {}", id, e);
                }
            }
        }

        info!("Sent {} appointment reminders", report.reminders_sent);
        Ok(report)
    }

    async fn load(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store.get(appointment_id).await?
            .ok_or(AppointmentError::NotFound)
    }

    /// Clinic and service of an existing appointment, whether or not the
    /// service is still offered.
    async fn schedule_context(&self, appointment: &Appointment) -> Result<(Clinic, Service), AppointmentError> {
        let clinic = self.catalog.get_clinic(appointment.clinic_id).await?;
        let service = self.catalog.get_service(appointment.service_id).await?;
        Ok((clinic, service))
    }

    fn notify(&self, kind: NotificationKind, appointment: &Appointment) {
        self.notifications.dispatch(Notification::for_appointment(
            kind,
            appointment.user_id,
            appointment.id,
            appointment,
        ));
    }
}

fn authorize(actor: &Actor, appointment: &Appointment) -> Result<(), AppointmentError> {
    if actor.can_access(appointment) {
        Ok(())
    } else {
        warn!("User {} ({}) denied access to appointment {}", actor.user_id, actor.role, appointment.id);
        Err(AppointmentError::Forbidden("appointment belongs to another user".to_string()))
    }
}

/// The slot must start strictly after the current clinic-local time.
fn ensure_future(clinic: &Clinic, date: NaiveDate, time: NaiveTime) -> Result<(), AppointmentError> {
    if date.and_time(time) <= clinic.local_now() {
        return Err(AppointmentError::InPast);
    }
    Ok(())
}

fn status_notification(status: AppointmentStatus) -> NotificationKind {
    match status {
        AppointmentStatus::Confirmed => NotificationKind::AppointmentConfirmed,
        AppointmentStatus::Cancelled => NotificationKind::AppointmentCancelled,
        AppointmentStatus::Completed => NotificationKind::AppointmentCompleted,
        AppointmentStatus::Scheduled => NotificationKind::AppointmentRescheduled,
        AppointmentStatus::InProgress | AppointmentStatus::NoShow => NotificationKind::AppointmentUpdated,
    }
}
