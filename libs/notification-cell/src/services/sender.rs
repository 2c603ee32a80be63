use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};

use crate::error::NotificationError;
use crate::models::Notification;

/// Delivery channel for notifications (email/SMS gateway, webhook, log).
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Writes notifications to the log. Used when no delivery channel is configured.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotificationSender;

#[async_trait]
impl NotificationSender for LoggingNotificationSender {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            kind = %notification.kind,
            recipient = %notification.recipient_id,
            "Notification {} queued for delivery",
            notification.id
        );
        Ok(())
    }
}

/// Posts each notification as JSON to an external delivery service.
pub struct WebhookNotificationSender {
    client: Client,
    url: String,
}

impl WebhookNotificationSender {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build webhook client with timeout, using defaults: {}", e);
                Client::new()
            });

        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl NotificationSender for WebhookNotificationSender {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        debug!("Posting notification {} to {}", notification.id, self.url);

        let response = self.client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| NotificationError::DeliveryFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
