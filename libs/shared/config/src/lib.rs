use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub redis_url: Option<String>,
    pub notification_webhook_url: Option<String>,
    pub vip_monthly_price: f64,
    pub vip_annual_price: f64,
    pub payment_approval_rate: f64,
    pub payment_latency_ms: u64,
    pub payment_timeout_secs: u64,
    pub notification_timeout_secs: u64,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: String::new(),
            redis_url: None,
            notification_webhook_url: None,
            vip_monthly_price: 49.90,
            vip_annual_price: 479.00,
            payment_approval_rate: 0.95,
            payment_latency_ms: 800,
            payment_timeout_secs: 10,
            notification_timeout_secs: 5,
            rate_limit_max_requests: 30,
            rate_limit_window_secs: 60,
            port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            redis_url: optional_var("REDIS_URL"),
            notification_webhook_url: optional_var("NOTIFICATION_WEBHOOK_URL"),
            vip_monthly_price: parsed_var("VIP_MONTHLY_PRICE", defaults.vip_monthly_price),
            vip_annual_price: parsed_var("VIP_ANNUAL_PRICE", defaults.vip_annual_price),
            payment_approval_rate: parsed_var("PAYMENT_APPROVAL_RATE", defaults.payment_approval_rate),
            payment_latency_ms: parsed_var("PAYMENT_LATENCY_MS", defaults.payment_latency_ms),
            payment_timeout_secs: parsed_var("PAYMENT_TIMEOUT_SECS", defaults.payment_timeout_secs),
            notification_timeout_secs: parsed_var("NOTIFICATION_TIMEOUT_SECS", defaults.notification_timeout_secs),
            rate_limit_max_requests: parsed_var("RATE_LIMIT_MAX_REQUESTS", defaults.rate_limit_max_requests),
            rate_limit_window_secs: parsed_var("RATE_LIMIT_WINDOW_SECS", defaults.rate_limit_window_secs),
            port: parsed_var("PORT", defaults.port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// True when the Supabase REST store can be used for persistence.
    pub fn is_database_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_service_role_key.is_empty()
    }

    pub fn payment_timeout(&self) -> Duration {
        Duration::from_secs(self.payment_timeout_secs)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

fn optional_var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            warn!("{} not set, feature disabled", name);
            None
        }
    }
}

fn parsed_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
