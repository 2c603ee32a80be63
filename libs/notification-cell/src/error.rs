use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Notification channel rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Notification delivery timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u128 },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
