use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use shared_database::{DatabaseError, SupabaseClient};

use crate::models::{SubscriptionStatus, VipError, VipSubscription};

/// A conditional status change: only applied while the row is still in `from`.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
    pub cancel_reason: Option<String>,
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// All subscriptions of a user, newest first.
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<VipSubscription>, VipError>;

    /// Inserts unless the user already holds an ACTIVE subscription, in which
    /// case `VipError::ActiveSubscriptionExists` is returned.
    async fn insert_if_no_active(&self, subscription: VipSubscription) -> Result<VipSubscription, VipError>;

    /// `None` when the row no longer has status `change.from`.
    async fn change_status(&self, subscription_id: Uuid, change: StatusChange) -> Result<Option<VipSubscription>, VipError>;

    /// ACTIVE or CANCELLED subscriptions whose end date is before `now`.
    async fn list_lapsed(&self, now: DateTime<Utc>) -> Result<Vec<VipSubscription>, VipError>;

    async fn vip_flag(&self, user_id: Uuid) -> Result<bool, VipError>;

    async fn set_vip_flag(&self, user_id: Uuid, is_vip: bool) -> Result<(), VipError>;
}

fn status_patch(change: &StatusChange) -> serde_json::Value {
    let now = Utc::now();
    let mut patch = json!({
        "status": change.to,
        "updated_at": now,
    });
    if change.to == SubscriptionStatus::Cancelled {
        patch["cancelled_at"] = json!(now);
        patch["cancel_reason"] = json!(change.cancel_reason);
    }
    patch
}

// ==============================================================================
// SUPABASE
// ==============================================================================

/// Expects a partial unique index on `vip_subscriptions(user_id) WHERE
/// status = 'ACTIVE'` and an `is_vip` column on `users`.
pub struct SupabaseSubscriptionStore {
    supabase: Arc<SupabaseClient>,
}

#[derive(Deserialize)]
struct VipFlagRow {
    is_vip: bool,
}

impl SupabaseSubscriptionStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl SubscriptionStore for SupabaseSubscriptionStore {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<VipSubscription>, VipError> {
        let path = format!("/rest/v1/vip_subscriptions?user_id=eq.{}&order=created_at.desc", user_id);
        let rows: Vec<VipSubscription> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows)
    }

    async fn insert_if_no_active(&self, subscription: VipSubscription) -> Result<VipSubscription, VipError> {
        let body = serde_json::to_value(&subscription).map_err(DatabaseError::from)?;

        let result: Result<Vec<VipSubscription>, DatabaseError> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/vip_subscriptions",
            None,
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await;

        match result {
            Ok(rows) => rows.into_iter().next().ok_or_else(|| {
                VipError::Database(DatabaseError::NotFound("subscription insert returned no rows".to_string()))
            }),
            Err(e) if e.is_conflict() => Err(VipError::ActiveSubscriptionExists),
            Err(e) => {
                error!("Failed to persist subscription {}: {}", subscription.id, e);
                Err(e.into())
            }
        }
    }

    async fn change_status(&self, subscription_id: Uuid, change: StatusChange) -> Result<Option<VipSubscription>, VipError> {
        let path = format!("/rest/v1/vip_subscriptions?id=eq.{}&status=eq.{}", subscription_id, change.from);
        let rows: Vec<VipSubscription> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            None,
            Some(status_patch(&change)),
            Some(SupabaseClient::representation_headers()),
        ).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_lapsed(&self, now: DateTime<Utc>) -> Result<Vec<VipSubscription>, VipError> {
        let path = format!(
            "/rest/v1/vip_subscriptions?status=in.(ACTIVE,CANCELLED)&end_date=lt.{}",
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let rows: Vec<VipSubscription> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows)
    }

    async fn vip_flag(&self, user_id: Uuid) -> Result<bool, VipError> {
        let path = format!("/rest/v1/users?id=eq.{}&select=is_vip", user_id);
        let rows: Vec<VipFlagRow> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.first().map(|row| row.is_vip).unwrap_or(false))
    }

    async fn set_vip_flag(&self, user_id: Uuid, is_vip: bool) -> Result<(), VipError> {
        debug!("Setting VIP flag of {} to {}", user_id, is_vip);
        let path = format!("/rest/v1/users?id=eq.{}", user_id);
        let _: Vec<serde_json::Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            None,
            Some(json!({ "is_vip": is_vip, "updated_at": Utc::now() })),
            Some(SupabaseClient::representation_headers()),
        ).await?;
        Ok(())
    }
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

#[derive(Default)]
struct MemoryState {
    subscriptions: HashMap<Uuid, VipSubscription>,
    vip_flags: HashMap<Uuid, bool>,
}

#[derive(Default)]
pub struct InMemorySubscriptionStore {
    state: Mutex<MemoryState>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a subscription as-is, bypassing the ACTIVE uniqueness check.
    pub async fn seed(&self, subscription: VipSubscription) {
        let mut state = self.state.lock().await;
        state.vip_flags.insert(subscription.user_id, true);
        state.subscriptions.insert(subscription.id, subscription);
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<VipSubscription>, VipError> {
        let state = self.state.lock().await;
        let mut list: Vec<VipSubscription> = state.subscriptions.values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn insert_if_no_active(&self, subscription: VipSubscription) -> Result<VipSubscription, VipError> {
        let mut state = self.state.lock().await;

        let has_active = state.subscriptions.values()
            .any(|s| s.user_id == subscription.user_id && s.status == SubscriptionStatus::Active);
        if has_active {
            return Err(VipError::ActiveSubscriptionExists);
        }

        state.subscriptions.insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn change_status(&self, subscription_id: Uuid, change: StatusChange) -> Result<Option<VipSubscription>, VipError> {
        let mut state = self.state.lock().await;

        let Some(subscription) = state.subscriptions.get_mut(&subscription_id) else {
            return Ok(None);
        };
        if subscription.status != change.from {
            return Ok(None);
        }

        let now = Utc::now();
        subscription.status = change.to;
        subscription.updated_at = now;
        if change.to == SubscriptionStatus::Cancelled {
            subscription.cancelled_at = Some(now);
            subscription.cancel_reason = change.cancel_reason;
        }
        Ok(Some(subscription.clone()))
    }

    async fn list_lapsed(&self, now: DateTime<Utc>) -> Result<Vec<VipSubscription>, VipError> {
        let state = self.state.lock().await;
        Ok(state.subscriptions.values()
            .filter(|s| matches!(s.status, SubscriptionStatus::Active | SubscriptionStatus::Cancelled))
            .filter(|s| s.end_date < now)
            .cloned()
            .collect())
    }

    async fn vip_flag(&self, user_id: Uuid) -> Result<bool, VipError> {
        Ok(self.state.lock().await.vip_flags.get(&user_id).copied().unwrap_or(false))
    }

    async fn set_vip_flag(&self, user_id: Uuid, is_vip: bool) -> Result<(), VipError> {
        self.state.lock().await.vip_flags.insert(user_id, is_vip);
        Ok(())
    }
}
