use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use appointment_cell::handlers::AppointmentState;
use appointment_cell::{
    AppointmentStore, AppointmentUsageLedger, BookingService, InMemoryAppointmentStore,
    SupabaseAppointmentStore,
};
use clinic_cell::handlers::ClinicState;
use clinic_cell::{CatalogService, CatalogStore, InMemoryCatalogStore, SupabaseCatalogStore};
use notification_cell::{
    LoggingNotificationSender, NotificationDispatcher, NotificationSender, WebhookNotificationSender,
};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::rate_limit::{InMemoryRateLimitStore, RateLimitStore, RateLimiter, RedisRateLimitStore};
use vip_cell::handlers::VipState;
use vip_cell::{
    InMemorySubscriptionStore, SimulatedPaymentProcessor, SubscriptionStore,
    SupabaseSubscriptionStore, VipPricing, VipSubscriptionService,
};

/// Per-cell router state, wired once at startup.
pub struct Cells {
    pub clinic: Arc<ClinicState>,
    pub appointments: Arc<AppointmentState>,
    pub vip: Arc<VipState>,
}

struct Stores {
    catalog: Arc<dyn CatalogStore>,
    appointments: Arc<dyn AppointmentStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl Stores {
    fn build(config: &AppConfig) -> Self {
        if config.is_database_configured() {
            info!("Using Supabase persistence at {}", config.supabase_url);
            let supabase = Arc::new(SupabaseClient::new(config));
            Self {
                catalog: Arc::new(SupabaseCatalogStore::new(supabase.clone())),
                appointments: Arc::new(SupabaseAppointmentStore::new(supabase.clone())),
                subscriptions: Arc::new(SupabaseSubscriptionStore::new(supabase)),
            }
        } else {
            warn!("Supabase not configured, data is kept in memory and lost on restart");
            Self {
                catalog: Arc::new(InMemoryCatalogStore::new()),
                appointments: Arc::new(InMemoryAppointmentStore::new()),
                subscriptions: Arc::new(InMemorySubscriptionStore::new()),
            }
        }
    }
}

fn notification_sender(config: &AppConfig) -> Arc<dyn NotificationSender> {
    match &config.notification_webhook_url {
        Some(url) => {
            info!("Delivering notifications to webhook {}", url);
            Arc::new(WebhookNotificationSender::new(url, config.notification_timeout()))
        }
        None => Arc::new(LoggingNotificationSender),
    }
}

fn rate_limiter(config: &AppConfig) -> anyhow::Result<Arc<RateLimiter>> {
    let store: Arc<dyn RateLimitStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisRateLimitStore::new(url).context("Failed to create Redis rate limit store")?),
        None => Arc::new(InMemoryRateLimitStore::new()),
    };

    Ok(Arc::new(RateLimiter::new(
        store,
        config.rate_limit_max_requests,
        config.rate_limit_window(),
    )))
}

impl Cells {
    pub fn build(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let stores = Stores::build(&config);
        let notifications = NotificationDispatcher::new(notification_sender(&config), config.notification_timeout());
        let rate_limiter = rate_limiter(&config)?;

        let catalog = CatalogService::new(stores.catalog);

        let subscriptions = Arc::new(VipSubscriptionService::new(
            stores.subscriptions,
            Arc::new(SimulatedPaymentProcessor::new(
                config.payment_approval_rate,
                std::time::Duration::from_millis(config.payment_latency_ms),
            )),
            Arc::new(AppointmentUsageLedger::new(stores.appointments.clone())),
            notifications.clone(),
            VipPricing::from_config(&config),
            config.payment_timeout(),
        ));

        let booking = BookingService::new(
            catalog.clone(),
            stores.appointments,
            subscriptions.clone(),
            notifications,
        );

        Ok(Self {
            clinic: Arc::new(ClinicState {
                config: config.clone(),
                catalog,
            }),
            appointments: Arc::new(AppointmentState {
                config: config.clone(),
                booking: Arc::new(booking),
                rate_limiter: rate_limiter.clone(),
            }),
            vip: Arc::new(VipState {
                config,
                subscriptions,
                rate_limiter,
            }),
        })
    }
}
