//! Out-of-band delivery of one-time codes and verification tokens

use async_trait::async_trait;
use std::sync::Mutex;
use tollgate_core::MfaMethod;
use tracing::{debug, info};

use super::IdentityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    /// Second-factor code for an SMS or email challenge
    MfaCode(MfaMethod),
    /// Email verification token after sign-up or a resend
    EmailVerification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub kind: DeliveryKind,
    /// Phone number or email address
    pub recipient: String,
    pub secret: String,
}

#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn deliver(&self, delivery: Delivery) -> Result<(), IdentityError>;
}

/// Writes deliveries to the log; the development default
#[derive(Debug, Clone, Default)]
pub struct LogDelivery;

#[async_trait]
impl CodeDelivery for LogDelivery {
    async fn deliver(&self, delivery: Delivery) -> Result<(), IdentityError> {
        info!(
            kind = ?delivery.kind,
            recipient = %delivery.recipient,
            "Dispatching one-time secret"
        );
        debug!(secret = %delivery.secret, "One-time secret contents");
        Ok(())
    }
}

/// Keeps every delivery in memory so tests can read the secret back
#[derive(Debug, Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<Delivery>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Delivery> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Most recent secret of the given kind sent to `recipient`
    pub fn last_secret(&self, recipient: &str, kind: DeliveryKind) -> Option<String> {
        self.sent().into_iter().rev().find_map(|d| {
            (d.recipient == recipient && d.kind == kind).then_some(d.secret)
        })
    }
}

#[async_trait]
impl CodeDelivery for RecordingDelivery {
    async fn deliver(&self, delivery: Delivery) -> Result<(), IdentityError> {
        self.sent
            .lock()
            .map_err(|_| IdentityError::Unavailable("delivery log poisoned".to_string()))?
            .push(delivery);
        Ok(())
    }
}
