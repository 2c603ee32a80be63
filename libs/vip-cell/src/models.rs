use std::fmt;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::error::AppError;
use shared_models::validation::ValidationErrors;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Monthly,
    Annual,
}

impl PlanType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "monthly" => Some(PlanType::Monthly),
            "annual" | "yearly" => Some(PlanType::Annual),
            _ => None,
        }
    }

    pub fn duration_months(&self) -> u32 {
        match self {
            PlanType::Monthly => 1,
            PlanType::Annual => 12,
        }
    }

    /// Calendar-month end of a plan started at `start`.
    pub fn end_from(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        start.checked_add_months(Months::new(self.duration_months()))
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanType::Monthly => write!(f, "monthly"),
            PlanType::Annual => write!(f, "annual"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Expired,
    Cancelled,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionStatus::Pending => write!(f, "PENDING"),
            SubscriptionStatus::Active => write!(f, "ACTIVE"),
            SubscriptionStatus::Expired => write!(f, "EXPIRED"),
            SubscriptionStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Pix,
}

impl PaymentMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "credit_card" => Some(PaymentMethod::CreditCard),
            "debit_card" => Some(PaymentMethod::DebitCard),
            "pix" => Some(PaymentMethod::Pix),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VipSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_type: PlanType,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub price: f64,
    pub discount_percent: f64,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VipSubscription {
    /// ACTIVE and not past its end. At most one per user.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date >= now
    }

    /// Cancelled subscriptions keep their perks until `end_date`.
    pub fn grants_benefits(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, SubscriptionStatus::Active | SubscriptionStatus::Cancelled)
            && self.end_date >= now
    }

    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.end_date - now).num_days().max(0)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VipPlan {
    pub plan_type: PlanType,
    pub price: f64,
    pub duration_months: u32,
    /// Saving against paying the monthly plan for the same period.
    pub discount_percent: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeRequest {
    pub plan_type: String,
    pub payment_method: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ValidatedSubscribe {
    pub plan_type: PlanType,
    pub payment_method: PaymentMethod,
}

impl SubscribeRequest {
    pub fn validate(&self) -> Result<ValidatedSubscribe, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let plan_type = PlanType::parse(&self.plan_type);
        if plan_type.is_none() {
            errors.add("plan_type", "must be 'monthly' or 'annual'");
        }
        let payment_method = PaymentMethod::parse(&self.payment_method);
        if payment_method.is_none() {
            errors.add("payment_method", "must be one of credit_card, debit_card, pix");
        }

        match (plan_type, payment_method) {
            (Some(plan_type), Some(payment_method)) => Ok(ValidatedSubscribe { plan_type, payment_method }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelSubscriptionRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageStats {
    pub appointments_this_period: u32,
    pub total_savings: f64,
    pub days_remaining: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VipStatusResponse {
    pub is_vip: bool,
    pub subscription: Option<VipSubscription>,
    pub usage: Option<UsageStats>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_subscriptions: usize,
    pub users_downgraded: usize,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum VipError {
    #[error("User already has an active VIP subscription")]
    ActiveSubscriptionExists,

    #[error("No active VIP subscription")]
    NoActiveSubscription,

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Payment processor did not answer within {0} seconds")]
    PaymentTimeout(u64),

    #[error("Payment processor unavailable: {0}")]
    PaymentUnavailable(String),

    #[error("Usage ledger error: {0}")]
    Ledger(String),

    #[error("Invalid request: {0}")]
    Invalid(#[from] ValidationErrors),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<VipError> for AppError {
    fn from(err: VipError) -> Self {
        match err {
            VipError::ActiveSubscriptionExists => AppError::Conflict(err.to_string()),
            VipError::NoActiveSubscription => AppError::NotFound(err.to_string()),
            VipError::PaymentDeclined(_) => AppError::PaymentRequired(err.to_string()),
            VipError::PaymentTimeout(_) | VipError::PaymentUnavailable(_) => AppError::ExternalService(err.to_string()),
            VipError::Invalid(errors) => AppError::InvalidFields(errors),
            VipError::Database(e) => AppError::Database(e.to_string()),
            VipError::Ledger(msg) | VipError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn subscription(status: SubscriptionStatus, end_in_days: i64) -> VipSubscription {
        let now = Utc::now();
        VipSubscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_type: PlanType::Monthly,
            status,
            start_date: now - Duration::days(10),
            end_date: now + Duration::days(end_in_days),
            price: 49.90,
            discount_percent: 0.0,
            payment_method: PaymentMethod::Pix,
            payment_reference: None,
            cancelled_at: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_cancelled_keeps_benefits_until_end() {
        let now = Utc::now();
        let cancelled = subscription(SubscriptionStatus::Cancelled, 5);
        assert!(cancelled.grants_benefits(now));
        assert!(!cancelled.is_active(now));

        let lapsed = subscription(SubscriptionStatus::Cancelled, -1);
        assert!(!lapsed.grants_benefits(now));
    }

    #[test]
    fn test_active_past_end_is_not_active() {
        let now = Utc::now();
        assert!(!subscription(SubscriptionStatus::Active, -1).is_active(now));
        assert!(!subscription(SubscriptionStatus::Expired, 30).grants_benefits(now));
    }

    #[test]
    fn test_plan_end_uses_calendar_months() {
        let start = Utc.with_ymd_and_hms(2030, 1, 31, 12, 0, 0).unwrap();
        assert_eq!(
            PlanType::Monthly.end_from(start).unwrap(),
            Utc.with_ymd_and_hms(2030, 2, 28, 12, 0, 0).unwrap()
        );
        assert_eq!(
            PlanType::Annual.end_from(start).unwrap(),
            Utc.with_ymd_and_hms(2031, 1, 31, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_subscribe_request_validation() {
        let ok = SubscribeRequest { plan_type: "Annual".into(), payment_method: "pix".into() };
        assert_eq!(ok.validate().unwrap().plan_type, PlanType::Annual);

        let bad = SubscribeRequest { plan_type: "weekly".into(), payment_method: "cash".into() };
        let errors = bad.validate().unwrap_err();
        assert!(errors.has_field("plan_type"));
        assert!(errors.has_field("payment_method"));
    }
}
