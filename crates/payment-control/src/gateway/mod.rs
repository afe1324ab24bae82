//! Payment gateway trait and request/outcome types.

pub mod in_memory;

use async_trait::async_trait;
use common::{PaymentId, PaymentMethodId, TransactionId};
use domain::{Currency, Money, PluginProperty, TransactionType};
use serde::Serialize;
use thiserror::Error;

pub use in_memory::{InMemoryGateway, ScriptedResponse};

/// A single transaction submitted to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayRequest {
    pub payment_id: PaymentId,
    pub transaction_id: TransactionId,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub currency: Currency,
    pub payment_method_id: PaymentMethodId,
    pub properties: Vec<PluginProperty>,
}

/// Whether the gateway accepted the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GatewayStatus {
    Processed,
    Declined,
}

/// The gateway's answer to a submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayOutcome {
    pub status: GatewayStatus,
    pub reference: String,
    pub message: Option<String>,
}

impl GatewayOutcome {
    pub fn processed(reference: impl Into<String>) -> Self {
        Self {
            status: GatewayStatus::Processed,
            reference: reference.into(),
            message: None,
        }
    }

    pub fn declined(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: GatewayStatus::Declined,
            reference: reference.into(),
            message: Some(message.into()),
        }
    }

    pub fn is_processed(&self) -> bool {
        self.status == GatewayStatus::Processed
    }
}

/// Errors raised when the gateway could not produce an outcome.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The gateway could not be reached.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway did not answer in time.
    #[error("Gateway timed out")]
    Timeout,

    /// The gateway refused the request as malformed.
    #[error("Gateway rejected request: {0}")]
    Rejected(String),
}

/// Trait for submitting transactions to a payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submits one transaction.
    async fn submit(&self, request: &GatewayRequest) -> Result<GatewayOutcome, GatewayError>;
}
