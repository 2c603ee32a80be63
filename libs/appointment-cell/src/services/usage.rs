// libs/appointment-cell/src/services/usage.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use vip_cell::{UsageLedger, UsageSummary, VipError};

use crate::models::{Appointment, AppointmentStatus};
use crate::services::store::AppointmentStore;

/// VIP usage figures read from the appointment book. Savings come from the
/// price snapshots, never from current service prices.
pub struct AppointmentUsageLedger {
    store: Arc<dyn AppointmentStore>,
}

impl AppointmentUsageLedger {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }
}

pub fn summarize(appointments: &[Appointment]) -> UsageSummary {
    let appointments_count = appointments.iter()
        .filter(|a| a.status != AppointmentStatus::Cancelled)
        .count() as u32;

    let savings = appointments.iter()
        .filter(|a| a.status == AppointmentStatus::Completed)
        .map(|a| (a.original_price - a.final_price).max(0.0))
        .sum();

    UsageSummary { appointments_count, savings }
}

#[async_trait]
impl UsageLedger for AppointmentUsageLedger {
    async fn usage_since(&self, user_id: Uuid, since: NaiveDate) -> Result<UsageSummary, VipError> {
        let appointments = self.store.list_for_user_since(user_id, since).await
            .map_err(|e| VipError::Ledger(e.to_string()))?;
        Ok(summarize(&appointments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    use crate::models::NewAppointment;
    use crate::services::pricing::calculate_price;
    use crate::services::store::InMemoryAppointmentStore;

    fn booked(day: u32, status: AppointmentStatus, is_vip: bool, user_id: Uuid) -> Appointment {
        let booking = NewAppointment {
            user_id: None,
            clinic_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2030, 1, day).unwrap(),
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            notes: None,
        };
        let mut appointment = Appointment::scheduled(&booking, user_id, calculate_price(200.0, 25.0, is_vip));
        appointment.status = status;
        appointment
    }

    #[test]
    fn test_savings_only_count_completed() {
        let user = Uuid::new_v4();
        let summary = summarize(&[
            booked(7, AppointmentStatus::Completed, true, user),
            booked(8, AppointmentStatus::Confirmed, true, user),
            booked(9, AppointmentStatus::Cancelled, true, user),
            booked(10, AppointmentStatus::Completed, false, user),
        ]);

        assert_eq!(summary.appointments_count, 3);
        assert_eq!(summary.savings, 50.0);
    }

    #[tokio::test]
    async fn test_ledger_reads_from_period_start() {
        let user = Uuid::new_v4();
        let store = Arc::new(InMemoryAppointmentStore::new());
        store.insert_if_slot_free(booked(3, AppointmentStatus::Completed, true, user)).await.unwrap();
        store.insert_if_slot_free(booked(8, AppointmentStatus::Completed, true, user)).await.unwrap();
        store.insert_if_slot_free(booked(9, AppointmentStatus::Scheduled, false, Uuid::new_v4())).await.unwrap();

        let ledger = AppointmentUsageLedger::new(store);
        let summary = ledger.usage_since(user, NaiveDate::from_ymd_opt(2030, 1, 5).unwrap()).await.unwrap();

        assert_eq!(summary, UsageSummary { appointments_count: 1, savings: 50.0 });
    }
}
