use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use notification_cell::{Notification, NotificationDispatcher, NotificationKind};
use shared_config::AppConfig;

use crate::models::{
    PaymentMethod, PlanType, SubscribeRequest, SubscriptionStatus, SweepReport, UsageStats,
    VipError, VipPlan, VipStatusResponse, VipSubscription,
};
use crate::services::payment::{PaymentError, PaymentProcessor, PaymentReceipt};
use crate::services::store::{StatusChange, SubscriptionStore};
use crate::services::usage::{UsageLedger, VipStatusProvider};

/// Plan prices. The annual discount is derived from the two prices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VipPricing {
    pub monthly_price: f64,
    pub annual_price: f64,
}

impl VipPricing {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            monthly_price: config.vip_monthly_price,
            annual_price: config.vip_annual_price,
        }
    }

    pub fn plan(&self, plan_type: PlanType) -> VipPlan {
        match plan_type {
            PlanType::Monthly => VipPlan {
                plan_type,
                price: self.monthly_price,
                duration_months: 1,
                discount_percent: 0.0,
            },
            PlanType::Annual => VipPlan {
                plan_type,
                price: self.annual_price,
                duration_months: 12,
                discount_percent: self.annual_discount_percent(),
            },
        }
    }

    /// round((12 × monthly − annual) / (12 × monthly) × 100)
    pub fn annual_discount_percent(&self) -> f64 {
        let full_year = self.monthly_price * 12.0;
        if full_year <= 0.0 {
            return 0.0;
        }
        ((full_year - self.annual_price) / full_year * 100.0).round()
    }
}

pub struct VipSubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    payments: Arc<dyn PaymentProcessor>,
    ledger: Arc<dyn UsageLedger>,
    notifications: NotificationDispatcher,
    pricing: VipPricing,
    payment_timeout: Duration,
}

impl VipSubscriptionService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        payments: Arc<dyn PaymentProcessor>,
        ledger: Arc<dyn UsageLedger>,
        notifications: NotificationDispatcher,
        pricing: VipPricing,
        payment_timeout: Duration,
    ) -> Self {
        Self {
            store,
            payments,
            ledger,
            notifications,
            pricing,
            payment_timeout,
        }
    }

    pub fn plans(&self) -> Vec<VipPlan> {
        vec![
            self.pricing.plan(PlanType::Monthly),
            self.pricing.plan(PlanType::Annual),
        ]
    }

    pub async fn subscribe(&self, user_id: Uuid, request: SubscribeRequest) -> Result<VipSubscription, VipError> {
        let validated = request.validate()?;
        let now = Utc::now();

        let existing = self.expire_lapsed_for(user_id, now).await?;
        if existing.iter().any(|s| s.is_active(now)) {
            warn!("User {} tried to subscribe while already VIP", user_id);
            return Err(VipError::ActiveSubscriptionExists);
        }

        let plan = self.pricing.plan(validated.plan_type);
        let end_date = validated.plan_type.end_from(now)
            .ok_or_else(|| VipError::Internal("subscription end date out of range".to_string()))?;

        let receipt = self.charge(user_id, validated.payment_method, plan.price).await?;

        let subscription = VipSubscription {
            id: Uuid::new_v4(),
            user_id,
            plan_type: plan.plan_type,
            status: SubscriptionStatus::Active,
            start_date: now,
            end_date,
            price: plan.price,
            discount_percent: plan.discount_percent,
            payment_method: validated.payment_method,
            payment_reference: Some(receipt.reference.clone()),
            cancelled_at: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        };

        let subscription = match self.store.insert_if_no_active(subscription).await {
            Ok(subscription) => subscription,
            Err(e) => {
                // Nothing was persisted, give the money back
                self.refund(&receipt).await;
                return Err(e);
            }
        };

        if let Err(e) = self.store.set_vip_flag(user_id, true).await {
            error!("Subscription {} stored but VIP flag update failed: {}", subscription.id, e);
        }

        info!("User {} subscribed to {} VIP until {}", user_id, subscription.plan_type, subscription.end_date);
        self.notify(NotificationKind::VipActivated, &subscription);

        Ok(subscription)
    }

    /// Stops renewal. Perks stay until `end_date` and the VIP flag is untouched.
    pub async fn cancel(&self, user_id: Uuid, reason: Option<String>) -> Result<VipSubscription, VipError> {
        let now = Utc::now();
        let subscriptions = self.store.find_by_user(user_id).await?;

        let active = subscriptions.iter()
            .find(|s| s.is_active(now))
            .ok_or(VipError::NoActiveSubscription)?;

        let change = StatusChange {
            from: SubscriptionStatus::Active,
            to: SubscriptionStatus::Cancelled,
            cancel_reason: reason,
        };
        let cancelled = self.store.change_status(active.id, change).await?
            .ok_or(VipError::NoActiveSubscription)?;

        info!("VIP subscription {} cancelled, benefits kept until {}", cancelled.id, cancelled.end_date);
        self.notify(NotificationKind::VipCancelled, &cancelled);

        Ok(cancelled)
    }

    pub async fn current_status(&self, user_id: Uuid) -> Result<VipStatusResponse, VipError> {
        let now = Utc::now();
        let subscriptions = self.store.find_by_user(user_id).await?;

        let Some(current) = benefit_bearing(&subscriptions, now).cloned() else {
            return Ok(VipStatusResponse {
                is_vip: false,
                subscription: None,
                usage: None,
            });
        };

        let summary = self.ledger.usage_since(user_id, current.start_date.date_naive()).await?;
        let usage = UsageStats {
            appointments_this_period: summary.appointments_count,
            total_savings: (summary.savings * 100.0).round() / 100.0,
            days_remaining: current.days_remaining(now),
        };

        Ok(VipStatusResponse {
            is_vip: true,
            subscription: Some(current),
            usage: Some(usage),
        })
    }

    /// Batch job: expires lapsed ACTIVE subscriptions and clears the VIP flag
    /// of users left without benefits.
    pub async fn sweep_expired(&self) -> Result<SweepReport, VipError> {
        let now = Utc::now();
        let lapsed = self.store.list_lapsed(now).await?;
        let mut report = SweepReport::default();
        let mut affected = HashSet::new();

        for subscription in &lapsed {
            affected.insert(subscription.user_id);

            if subscription.status != SubscriptionStatus::Active {
                continue;
            }
            let change = StatusChange {
                from: SubscriptionStatus::Active,
                to: SubscriptionStatus::Expired,
                cancel_reason: None,
            };
            match self.store.change_status(subscription.id, change).await {
                Ok(Some(_)) => report.expired_subscriptions += 1,
                Ok(None) => debug!("Subscription {} changed before the sweep reached it", subscription.id),
                Err(e) => error!("Failed to expire subscription {}: {}", subscription.id, e),
            }
        }

        for user_id in affected {
            match self.downgrade_if_lapsed(user_id, now).await {
                Ok(true) => report.users_downgraded += 1,
                Ok(false) => {}
                Err(e) => error!("Failed to downgrade user {}: {}", user_id, e),
            }
        }

        info!(
            "VIP sweep finished: {} subscriptions expired, {} users downgraded",
            report.expired_subscriptions, report.users_downgraded
        );
        Ok(report)
    }

    /// Clears the VIP flag of a user left without benefits. `false` when the
    /// user keeps a benefit-bearing subscription or was already downgraded.
    async fn downgrade_if_lapsed(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<bool, VipError> {
        let subscriptions = self.store.find_by_user(user_id).await?;
        if benefit_bearing(&subscriptions, now).is_some() {
            return Ok(false);
        }
        if !self.store.vip_flag(user_id).await? {
            return Ok(false);
        }

        self.store.set_vip_flag(user_id, false).await?;
        if let Some(latest) = subscriptions.first() {
            self.notify(NotificationKind::VipExpired, latest);
        }
        Ok(true)
    }

    /// Marks the user's ACTIVE subscriptions past their end as EXPIRED and
    /// returns the user's subscriptions as they stand afterwards.
    async fn expire_lapsed_for(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Vec<VipSubscription>, VipError> {
        let subscriptions = self.store.find_by_user(user_id).await?;
        let mut result = Vec::with_capacity(subscriptions.len());

        for subscription in subscriptions {
            if subscription.status == SubscriptionStatus::Active && subscription.end_date < now {
                debug!("Expiring lapsed subscription {}", subscription.id);
                let change = StatusChange {
                    from: SubscriptionStatus::Active,
                    to: SubscriptionStatus::Expired,
                    cancel_reason: None,
                };
                if let Some(expired) = self.store.change_status(subscription.id, change).await? {
                    result.push(expired);
                    continue;
                }
            }
            result.push(subscription);
        }

        Ok(result)
    }

    async fn charge(&self, user_id: Uuid, method: PaymentMethod, amount: f64) -> Result<PaymentReceipt, VipError> {
        match tokio::time::timeout(self.payment_timeout, self.payments.charge(user_id, method, amount)).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(PaymentError::Declined(reason))) => {
                warn!("Payment declined for user {}: {}", user_id, reason);
                Err(VipError::PaymentDeclined(reason))
            }
            Ok(Err(PaymentError::Unavailable(reason))) => Err(VipError::PaymentUnavailable(reason)),
            Err(_) => Err(VipError::PaymentTimeout(self.payment_timeout.as_secs())),
        }
    }

    async fn refund(&self, receipt: &PaymentReceipt) {
        match tokio::time::timeout(self.payment_timeout, self.payments.refund(&receipt.reference)).await {
            Ok(Ok(())) => info!("Refunded payment {}", receipt.reference),
            Ok(Err(e)) => error!("Refund of {} failed: {}", receipt.reference, e),
            Err(_) => error!("Refund of {} timed out", receipt.reference),
        }
    }

    fn notify(&self, kind: NotificationKind, subscription: &VipSubscription) {
        self.notifications.dispatch(Notification::for_subscription(
            kind,
            subscription.user_id,
            subscription.id,
            subscription,
        ));
    }
}

/// Prefers the ACTIVE subscription over a cancelled one still in its period.
fn benefit_bearing(subscriptions: &[VipSubscription], now: DateTime<Utc>) -> Option<&VipSubscription> {
    subscriptions.iter()
        .find(|s| s.is_active(now))
        .or_else(|| subscriptions.iter().find(|s| s.grants_benefits(now)))
}

#[async_trait]
impl VipStatusProvider for VipSubscriptionService {
    async fn is_vip(&self, user_id: Uuid) -> Result<bool, VipError> {
        let subscriptions = self.store.find_by_user(user_id).await?;
        Ok(benefit_bearing(&subscriptions, Utc::now()).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annual_discount_from_prices() {
        let pricing = VipPricing { monthly_price: 49.90, annual_price: 479.00 };
        assert_eq!(pricing.annual_discount_percent(), 20.0);

        let plans = [pricing.plan(PlanType::Monthly), pricing.plan(PlanType::Annual)];
        assert_eq!(plans[0].discount_percent, 0.0);
        assert_eq!(plans[1].duration_months, 12);
    }

    #[test]
    fn test_free_monthly_plan_has_no_discount() {
        let pricing = VipPricing { monthly_price: 0.0, annual_price: 0.0 };
        assert_eq!(pricing.annual_discount_percent(), 0.0);
    }
}
