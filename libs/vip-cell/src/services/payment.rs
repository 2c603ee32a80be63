use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::PaymentMethod;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaymentError {
    #[error("charge declined: {0}")]
    Declined(String),

    #[error("processor unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaymentReceipt {
    pub reference: String,
    pub amount: f64,
    pub method: PaymentMethod,
}

/// Card/PIX gateway used to charge VIP plans.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn charge(&self, user_id: Uuid, method: PaymentMethod, amount: f64) -> Result<PaymentReceipt, PaymentError>;

    async fn refund(&self, reference: &str) -> Result<(), PaymentError>;
}

/// Stand-in gateway: approves a configurable share of charges after a delay.
pub struct SimulatedPaymentProcessor {
    approval_rate: f64,
    latency: Duration,
}

impl SimulatedPaymentProcessor {
    pub fn new(approval_rate: f64, latency: Duration) -> Self {
        Self {
            approval_rate: if approval_rate.is_nan() { 0.0 } else { approval_rate.clamp(0.0, 1.0) },
            latency,
        }
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedPaymentProcessor {
    async fn charge(&self, user_id: Uuid, method: PaymentMethod, amount: f64) -> Result<PaymentReceipt, PaymentError> {
        let approved = rand::thread_rng().gen_bool(self.approval_rate);

        debug!("Simulating {:?} charge of {:.2} for {}", method, amount, user_id);
        tokio::time::sleep(self.latency).await;

        if !approved {
            return Err(PaymentError::Declined("issuer declined the transaction".to_string()));
        }

        let receipt = PaymentReceipt {
            reference: format!("sim_{}", Uuid::new_v4().simple()),
            amount,
            method,
        };
        info!("Simulated charge {} approved", receipt.reference);
        Ok(receipt)
    }

    async fn refund(&self, reference: &str) -> Result<(), PaymentError> {
        tokio::time::sleep(self.latency).await;
        info!("Simulated refund of {}", reference);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_approval_rate_extremes() {
        let always = SimulatedPaymentProcessor::new(1.0, Duration::ZERO);
        let receipt = always.charge(Uuid::new_v4(), PaymentMethod::Pix, 49.90).await.unwrap();
        assert!(receipt.reference.starts_with("sim_"));
        assert_eq!(receipt.amount, 49.90);

        let never = SimulatedPaymentProcessor::new(0.0, Duration::ZERO);
        assert_matches!(
            never.charge(Uuid::new_v4(), PaymentMethod::CreditCard, 49.90).await,
            Err(PaymentError::Declined(_))
        );
    }

    #[test]
    fn test_rate_is_clamped() {
        let processor = SimulatedPaymentProcessor::new(3.0, Duration::ZERO);
        assert_eq!(processor.approval_rate, 1.0);
    }
}
