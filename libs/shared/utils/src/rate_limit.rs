//! Per-user request throttling with a swappable counter store.
//!
//! Single instances and tests use [`InMemoryRateLimitStore`]; deployments with
//! several API replicas share counters through [`RedisRateLimitStore`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use deadpool_redis::{Config, Pool, Runtime};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use shared_models::auth::User;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Rate limit store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records one hit for `key` and returns the number of hits in the
    /// current fixed window.
    async fn hit(&self, key: &str, window: Duration) -> Result<u32, RateLimitError>;
}

struct WindowCounter {
    started_at: Instant,
    count: u32,
}

#[derive(Default)]
pub struct InMemoryRateLimitStore {
    counters: Mutex<HashMap<String, WindowCounter>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<u32, RateLimitError> {
        let mut counters = self.counters.lock().await;
        let now = Instant::now();

        // Drop stale windows so the map doesn't grow without bound
        counters.retain(|_, counter| now.duration_since(counter.started_at) < window);

        let counter = counters.entry(key.to_string()).or_insert(WindowCounter {
            started_at: now,
            count: 0,
        });
        counter.count += 1;
        Ok(counter.count)
    }
}

pub struct RedisRateLimitStore {
    pool: Pool,
    prefix: String,
}

impl RedisRateLimitStore {
    pub fn new(redis_url: &str) -> Result<Self, RateLimitError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| RateLimitError::StoreUnavailable(format!("Pool creation error: {}", e)))?;

        Ok(Self {
            pool,
            prefix: "rate_limit".to_string(),
        })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<u32, RateLimitError> {
        let mut conn = self.pool.get().await
            .map_err(|e| RateLimitError::StoreUnavailable(format!("Connection error: {}", e)))?;

        let redis_key = format!("{}:{}", self.prefix, key);
        let count: u32 = redis::cmd("INCR").arg(&redis_key).query_async(&mut conn).await?;

        if count == 1 {
            let _: () = redis::cmd("EXPIRE")
                .arg(&redis_key)
                .arg(window.as_secs().max(1))
                .query_async(&mut conn)
                .await?;
        }

        Ok(count)
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, max_requests: u32, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window,
        }
    }

    /// Counts a request for `key`. A failing store lets the request through.
    pub async fn check(&self, key: &str) -> Result<(), AppError> {
        match self.store.hit(key, self.window).await {
            Ok(count) if count > self.max_requests => {
                debug!("Rate limit exceeded for {} ({} requests)", key, count);
                Err(AppError::RateLimited(format!(
                    "Too many requests, limit is {} per {} seconds",
                    self.max_requests,
                    self.window.as_secs()
                )))
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Rate limit store failed, allowing request: {}", e);
                Ok(())
            }
        }
    }
}

/// Must run after `auth_middleware` so the user is known.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let key = request
        .extensions()
        .get::<User>()
        .map(|user| format!("user:{}", user.id))
        .unwrap_or_else(|| "anonymous".to_string());

    limiter.check(&key).await?;

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
        async fn hit(&self, _key: &str, _window: Duration) -> Result<u32, RateLimitError> {
            Err(RateLimitError::StoreUnavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_in_memory_limiter_blocks_after_max() {
        let limiter = RateLimiter::new(Arc::new(InMemoryRateLimitStore::new()), 2, Duration::from_secs(60));

        assert!(limiter.check("user:a").await.is_ok());
        assert!(limiter.check("user:a").await.is_ok());
        assert_matches!(limiter.check("user:a").await, Err(AppError::RateLimited(_)));

        // Other keys have their own window
        assert!(limiter.check("user:b").await.is_ok());
    }

    #[tokio::test]
    async fn test_window_resets() {
        let store = InMemoryRateLimitStore::new();
        let window = Duration::from_millis(20);

        assert_eq!(store.hit("k", window).await.unwrap(), 1);
        assert_eq!(store.hit("k", window).await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.hit("k", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore), 1, Duration::from_secs(60));
        assert!(limiter.check("user:a").await.is_ok());
        assert!(limiter.check("user:a").await.is_ok());
    }
}
