// libs/appointment-cell/src/services/availability.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Timelike};
use tracing::debug;
use uuid::Uuid;

use clinic_cell::{CatalogService, Clinic, Service};

use crate::models::AppointmentError;
use crate::services::store::AppointmentStore;

/// Slots start every 30 minutes from opening time.
pub const SLOT_INTERVAL_MINUTES: u32 = 30;

fn minutes_of(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

fn time_of(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

/// Start times from opening to closing whose service fits before close.
pub fn candidate_slots(clinic: &Clinic, duration_minutes: i32) -> Vec<NaiveTime> {
    let open = minutes_of(clinic.open_time);
    let close = minutes_of(clinic.close_time);
    let duration = duration_minutes.max(1) as u32;

    (open..close)
        .step_by(SLOT_INTERVAL_MINUTES as usize)
        .filter(|start| start + duration <= close)
        .filter_map(time_of)
        .collect()
}

/// Whether `time` is one of the clinic's slots for this service on `date`,
/// ignoring existing bookings.
pub fn is_bookable_slot(clinic: &Clinic, service: &Service, date: NaiveDate, time: NaiveTime) -> bool {
    if !clinic.is_working_day(date) || time.second() != 0 {
        return false;
    }

    let open = minutes_of(clinic.open_time);
    let start = minutes_of(time);
    start >= open
        && (start - open) % SLOT_INTERVAL_MINUTES == 0
        && start + service.duration_minutes.max(1) as u32 <= minutes_of(clinic.close_time)
}

/// Free slots on `date`, earliest first, given the start times already held.
pub fn free_slots(clinic: &Clinic, service: &Service, date: NaiveDate, taken: &[NaiveTime]) -> Vec<NaiveTime> {
    if !clinic.is_working_day(date) {
        return Vec::new();
    }

    candidate_slots(clinic, service.duration_minutes)
        .into_iter()
        .filter(|slot| !taken.contains(slot))
        .collect()
}

/// Computes availability from the live appointment book on every call.
#[derive(Clone)]
pub struct AvailabilityChecker {
    catalog: CatalogService,
    store: Arc<dyn AppointmentStore>,
}

impl AvailabilityChecker {
    pub fn new(catalog: CatalogService, store: Arc<dyn AppointmentStore>) -> Self {
        Self { catalog, store }
    }

    pub async fn available_slots(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        service_id: Uuid,
    ) -> Result<Vec<NaiveTime>, AppointmentError> {
        let (clinic, service) = self.catalog.bookable(clinic_id, service_id).await?;

        if !clinic.is_working_day(date) {
            debug!("Clinic {} closed on {}", clinic_id, date);
            return Ok(Vec::new());
        }

        let taken: Vec<NaiveTime> = self.store.list_occupying(clinic_id, date).await?
            .into_iter()
            .map(|appointment| appointment.time)
            .collect();

        let slots = free_slots(&clinic, &service, date, &taken);
        debug!("{} free slots at clinic {} on {}", slots.len(), clinic_id, date);
        Ok(slots)
    }

    /// Authoritative single-slot check. `exclude` skips the appointment being
    /// moved so it does not block itself.
    pub async fn is_slot_available(
        &self,
        clinic: &Clinic,
        service: &Service,
        date: NaiveDate,
        time: NaiveTime,
        exclude: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        if !is_bookable_slot(clinic, service, date, time) {
            return Ok(false);
        }

        let occupied = self.store.list_occupying(clinic.id, date).await?
            .into_iter()
            .any(|appointment| Some(appointment.id) != exclude && appointment.time == time);

        Ok(!occupied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn clinic() -> Clinic {
        let now = Utc::now();
        Clinic {
            id: Uuid::new_v4(),
            name: "Centro".to_string(),
            address: None,
            phone: None,
            open_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            close_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            working_days: vec![1, 2, 3, 4, 5],
            timezone: "UTC".to_string(),
            utc_offset_minutes: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn service(duration_minutes: i32) -> Service {
        let now = Utc::now();
        Service {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            name: "Consulta".to_string(),
            description: None,
            price: 8500.0,
            duration_minutes,
            vip_discount_percent: 20.0,
            is_vip_only: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2030-01-07 is a Monday
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
    }

    #[test]
    fn test_saturday_has_no_slots() {
        let saturday = NaiveDate::from_ymd_opt(2030, 1, 5).unwrap();
        assert!(free_slots(&clinic(), &service(30), saturday, &[]).is_empty());
    }

    #[test]
    fn test_slots_cover_opening_hours() {
        let slots = free_slots(&clinic(), &service(30), monday(), &[]);
        assert_eq!(slots.len(), 18);
        assert_eq!(slots.first(), Some(&t(9, 0)));
        assert_eq!(slots.last(), Some(&t(17, 30)));
    }

    #[test]
    fn test_long_service_must_end_before_close() {
        let slots = free_slots(&clinic(), &service(90), monday(), &[]);
        assert_eq!(slots.last(), Some(&t(16, 30)));
    }

    #[test]
    fn test_taken_slots_are_excluded() {
        let slots = free_slots(&clinic(), &service(30), monday(), &[t(9, 30), t(10, 0)]);
        assert_eq!(&slots[..2], &[t(9, 0), t(10, 30)]);
    }

    #[test]
    fn test_single_slot_must_be_on_grid_and_in_hours() {
        let clinic = clinic();
        let service = service(60);

        assert!(is_bookable_slot(&clinic, &service, monday(), t(9, 30)));
        assert!(!is_bookable_slot(&clinic, &service, monday(), t(9, 15)));
        assert!(!is_bookable_slot(&clinic, &service, monday(), t(8, 30)));
        assert!(!is_bookable_slot(&clinic, &service, monday(), t(17, 30)));
        assert!(!is_bookable_slot(&clinic, &service, monday() - chrono::Duration::days(1), t(10, 0)));
    }
}
