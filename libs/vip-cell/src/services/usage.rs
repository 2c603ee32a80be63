use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::VipError;

/// Appointment figures for a user over a subscription period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageSummary {
    /// Non-cancelled appointments dated on or after the period start.
    pub appointments_count: u32,
    /// Sum of `original_price - final_price` over completed appointments.
    pub savings: f64,
}

/// Read side of the appointment book, as seen by the VIP manager.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    async fn usage_since(&self, user_id: Uuid, since: NaiveDate) -> Result<UsageSummary, VipError>;
}

/// VIP predicate consumed by pricing.
#[async_trait]
pub trait VipStatusProvider: Send + Sync {
    async fn is_vip(&self, user_id: Uuid) -> Result<bool, VipError>;
}
