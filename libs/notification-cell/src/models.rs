use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentBooked,
    AppointmentConfirmed,
    AppointmentRescheduled,
    AppointmentCancelled,
    AppointmentCompleted,
    AppointmentUpdated,
    AppointmentReminder,
    VipActivated,
    VipCancelled,
    VipExpired,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationKind::AppointmentBooked => "appointment_booked",
            NotificationKind::AppointmentConfirmed => "appointment_confirmed",
            NotificationKind::AppointmentRescheduled => "appointment_rescheduled",
            NotificationKind::AppointmentCancelled => "appointment_cancelled",
            NotificationKind::AppointmentCompleted => "appointment_completed",
            NotificationKind::AppointmentUpdated => "appointment_updated",
            NotificationKind::AppointmentReminder => "appointment_reminder",
            NotificationKind::VipActivated => "vip_activated",
            NotificationKind::VipCancelled => "vip_cancelled",
            NotificationKind::VipExpired => "vip_expired",
        };
        write!(f, "{}", name)
    }
}

/// What the notification is about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum NotificationSubject {
    Appointment(Uuid),
    Subscription(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub recipient_id: Uuid,
    pub subject: NotificationSubject,
    /// Snapshot of the record the notification refers to.
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, recipient_id: Uuid, subject: NotificationSubject, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            recipient_id,
            subject,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn for_appointment<T: Serialize>(kind: NotificationKind, recipient_id: Uuid, appointment_id: Uuid, record: &T) -> Self {
        Self::new(
            kind,
            recipient_id,
            NotificationSubject::Appointment(appointment_id),
            serde_json::to_value(record).unwrap_or(Value::Null),
        )
    }

    pub fn for_subscription<T: Serialize>(kind: NotificationKind, recipient_id: Uuid, subscription_id: Uuid, record: &T) -> Self {
        Self::new(
            kind,
            recipient_id,
            NotificationSubject::Subscription(subscription_id),
            serde_json::to_value(record).unwrap_or(Value::Null),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subject_wire_format() {
        let id = Uuid::new_v4();
        let value = serde_json::to_value(NotificationSubject::Appointment(id)).unwrap();
        assert_eq!(value, json!({"type": "appointment", "id": id}));
    }

    #[test]
    fn test_kind_display_matches_serde() {
        let kind = NotificationKind::AppointmentRescheduled;
        assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.to_string()));
    }
}
