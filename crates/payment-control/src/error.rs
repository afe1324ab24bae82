//! Payment control error types.

use common::{AttemptId, PaymentId};
use domain::DomainError;
use payment_store::StoreError;
use thiserror::Error;

use crate::retry::SchedulerError;

/// Errors surfaced by controlled and direct payment operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The request was rejected before any attempt or gateway call.
    #[error("Validation failed: {0}")]
    Validation(DomainError),

    /// A follow-up operation referenced a payment that does not exist.
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// A control plugin aborted the attempt before the gateway call.
    #[error("Attempt {attempt_id} aborted by control plugin '{plugin}': {reason}")]
    ControlAbort {
        attempt_id: AttemptId,
        plugin: String,
        reason: String,
    },

    /// A plugin named by the request is not registered.
    #[error("Control plugin not found: {0}")]
    PluginNotFound(String),

    /// The gateway declined or failed the transaction and no retry follows.
    #[error("Gateway failed for payment {payment_id}: {reason}")]
    Gateway {
        attempt_id: Option<AttemptId>,
        payment_id: PaymentId,
        reason: String,
    },

    /// The attempt used up its retry budget.
    #[error("Attempt {attempt_id} exhausted its retries after {attempts} passes")]
    RetryExhausted { attempt_id: AttemptId, attempts: u32 },

    /// A scheduled retry was cancelled before it ran.
    #[error("Retry cancelled for attempt {0}")]
    RetryCancelled(AttemptId),

    /// Retry scheduling error.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ControlError {
    /// Returns true if the request was rejected before an attempt existed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ControlError::Validation(_) | ControlError::PaymentNotFound(_)
        )
    }
}

/// Convenience type alias for control results.
pub type Result<T> = std::result::Result<T, ControlError>;
