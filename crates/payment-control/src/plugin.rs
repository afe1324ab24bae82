//! Control plugin contract and the values exchanged with plugins.

use std::time::Duration;

use async_trait::async_trait;
use common::{AccountId, AttemptId, PaymentId, PaymentMethodId, TransactionId};
use domain::{Currency, Money, PaymentAttempt, PluginProperty, TransactionType};
use serde::Serialize;
use thiserror::Error;

/// Read-only view of the operation handed to every plugin callback.
///
/// Plugins receive it by reference and cannot change it; adjustments are
/// returned in a [`PriorResult`] and applied by the chain executor to build
/// the context the next plugin sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlContext {
    pub account_id: AccountId,
    pub attempt_id: AttemptId,
    /// Unknown until the first transaction of a new payment is recorded.
    pub payment_id: Option<PaymentId>,
    /// Set for success/failure callbacks once the transaction exists.
    pub transaction_id: Option<TransactionId>,
    pub transaction_type: TransactionType,
    pub payment_external_key: String,
    pub transaction_external_key: String,
    pub amount: Money,
    pub currency: Currency,
    pub payment_method_id: Option<PaymentMethodId>,
    /// 1-based pass number within the attempt.
    pub sub_attempt: u32,
}

impl ControlContext {
    /// Builds the context for the attempt's current pass from the original
    /// request values.
    pub fn for_attempt(
        attempt: &PaymentAttempt,
        payment_method_id: Option<PaymentMethodId>,
    ) -> Self {
        Self {
            account_id: attempt.account_id,
            attempt_id: attempt.attempt_id,
            payment_id: attempt.payment_id,
            transaction_id: None,
            transaction_type: attempt.transaction_type,
            payment_external_key: attempt.payment_external_key.clone(),
            transaction_external_key: attempt.transaction_external_key.clone(),
            amount: attempt.requested_amount,
            currency: attempt.requested_currency,
            payment_method_id,
            sub_attempt: attempt.sub_attempts,
        }
    }

    /// Returns a copy with a prior-call plugin's overrides applied.
    pub fn adjusted(&self, result: &PriorResult) -> Self {
        let mut next = self.clone();
        if let Some(amount) = result.adjusted_amount {
            next.amount = amount;
        }
        if let Some(currency) = result.adjusted_currency {
            next.currency = currency;
        }
        if let Some(payment_method_id) = result.adjusted_payment_method_id {
            next.payment_method_id = Some(payment_method_id);
        }
        next
    }

    /// Returns a copy pointing at the transaction a pass produced.
    pub fn with_transaction(&self, payment_id: PaymentId, transaction_id: TransactionId) -> Self {
        Self {
            payment_id: Some(payment_id),
            transaction_id: Some(transaction_id),
            ..self.clone()
        }
    }
}

/// Result of a plugin's prior call.
///
/// When `aborted` is set every adjustment is ignored and the gateway is not
/// contacted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorResult {
    pub aborted: bool,
    pub adjusted_amount: Option<Money>,
    pub adjusted_currency: Option<Currency>,
    pub adjusted_payment_method_id: Option<PaymentMethodId>,
    pub adjusted_plugin_properties: Option<Vec<PluginProperty>>,
}

impl PriorResult {
    /// Lets the operation continue unchanged.
    pub fn proceed() -> Self {
        Self::default()
    }

    /// Aborts the operation before the gateway is contacted.
    pub fn abort() -> Self {
        Self {
            aborted: true,
            ..Self::default()
        }
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.adjusted_amount = Some(amount);
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.adjusted_currency = Some(currency);
        self
    }

    pub fn with_payment_method(mut self, payment_method_id: PaymentMethodId) -> Self {
        self.adjusted_payment_method_id = Some(payment_method_id);
        self
    }

    pub fn with_properties(mut self, properties: Vec<PluginProperty>) -> Self {
        self.adjusted_plugin_properties = Some(properties);
        self
    }
}

/// Acknowledgment of a success callback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessResult {
    /// Properties handed to the next plugin's success callback.
    pub adjusted_plugin_properties: Option<Vec<PluginProperty>>,
}

impl SuccessResult {
    pub fn acknowledge() -> Self {
        Self::default()
    }
}

/// A plugin's verdict after a failed gateway outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureResult {
    /// No retry requested.
    #[default]
    NoRetry,
    /// Retry no sooner than the given delay.
    RetryAfter(Duration),
    /// Give up for good; overrides any retry request.
    Abandon,
}

impl FailureResult {
    pub fn retry_after(delay: Duration) -> Self {
        FailureResult::RetryAfter(delay)
    }

    /// Combines two verdicts: abandonment wins, then the shortest retry
    /// delay, then no retry.
    pub fn reconcile(self, other: FailureResult) -> FailureResult {
        match (self, other) {
            (FailureResult::Abandon, _) | (_, FailureResult::Abandon) => FailureResult::Abandon,
            (FailureResult::RetryAfter(a), FailureResult::RetryAfter(b)) => {
                FailureResult::RetryAfter(a.min(b))
            }
            (FailureResult::RetryAfter(d), FailureResult::NoRetry)
            | (FailureResult::NoRetry, FailureResult::RetryAfter(d)) => FailureResult::RetryAfter(d),
            (FailureResult::NoRetry, FailureResult::NoRetry) => FailureResult::NoRetry,
        }
    }
}

/// Error raised by a plugin callback.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ControlPluginError {
    message: String,
}

impl ControlPluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A control plugin invoked around every controlled gateway call.
#[async_trait]
pub trait ControlPlugin: Send + Sync {
    /// Runs before the gateway call; may abort or adjust the operation.
    async fn prior_call(
        &self,
        context: &ControlContext,
        properties: &[PluginProperty],
    ) -> Result<PriorResult, ControlPluginError>;

    /// Runs after a successful gateway outcome.
    async fn on_success_call(
        &self,
        context: &ControlContext,
        properties: &[PluginProperty],
    ) -> Result<SuccessResult, ControlPluginError>;

    /// Runs after a declined or failed gateway call.
    async fn on_failure_call(
        &self,
        context: &ControlContext,
        properties: &[PluginProperty],
    ) -> Result<FailureResult, ControlPluginError>;
}
