use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::NotificationError;
use crate::models::Notification;
use crate::services::sender::NotificationSender;

/// Fire-and-forget front for a [`NotificationSender`].
///
/// Each notification is delivered on its own task under a timeout. Failures
/// are logged and dropped; callers never wait on delivery.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: Arc<dyn NotificationSender>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(sender: Arc<dyn NotificationSender>, timeout: Duration) -> Self {
        Self { sender, timeout }
    }

    /// Hands the notification to a background task. The returned handle is
    /// only useful to tests that want to wait for delivery.
    pub fn dispatch(&self, notification: Notification) -> JoinHandle<()> {
        let sender = Arc::clone(&self.sender);
        let timeout = self.timeout;

        tokio::spawn(async move {
            match deliver(sender.as_ref(), &notification, timeout).await {
                Ok(()) => debug!("Notification {} ({}) delivered", notification.id, notification.kind),
                Err(e) => warn!(
                    kind = %notification.kind,
                    recipient = %notification.recipient_id,
                    "Notification {} dropped: {}",
                    notification.id,
                    e
                ),
            }
        })
    }
}

async fn deliver(
    sender: &dyn NotificationSender,
    notification: &Notification,
    timeout: Duration,
) -> Result<(), NotificationError> {
    match tokio::time::timeout(timeout, sender.notify(notification)).await {
        Ok(result) => result,
        Err(_) => Err(NotificationError::Timeout {
            timeout_ms: timeout.as_millis(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationKind, NotificationSubject};
    use async_trait::async_trait;
    use assert_matches::assert_matches;
    use serde_json::json;
    use uuid::Uuid;

    struct SlowSender;

    #[async_trait]
    impl NotificationSender for SlowSender {
        async fn notify(&self, _notification: &Notification) -> Result<(), NotificationError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    fn sample() -> Notification {
        Notification::new(
            NotificationKind::AppointmentBooked,
            Uuid::new_v4(),
            NotificationSubject::Appointment(Uuid::new_v4()),
            json!({}),
        )
    }

    #[tokio::test]
    async fn test_deliver_times_out() {
        let result = deliver(&SlowSender, &sample(), Duration::from_millis(10)).await;
        assert_matches!(result, Err(NotificationError::Timeout { timeout_ms: 10 }));
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let dispatcher = NotificationDispatcher::new(Arc::new(SlowSender), Duration::from_millis(10));
        // The task finishes cleanly even though delivery timed out
        assert!(dispatcher.dispatch(sample()).await.is_ok());
    }
}
