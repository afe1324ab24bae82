//! Attempt record.

use chrono::{DateTime, Utc};
use common::{AccountId, AttemptId, PaymentId, PaymentMethodId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::attempt::state::AttemptState;
use crate::error::DomainError;
use crate::money::{Currency, Money};
use crate::payment::TransactionType;
use crate::property::PluginProperty;
use crate::request::PaymentRequest;

/// Bookkeeping for one controlled attempt across all of its passes.
///
/// The requested fields record what the caller asked for; the submitted
/// fields record what the plugin chain finally sent to the gateway on the
/// latest pass. Once the state is terminal every mutator fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub attempt_id: AttemptId,
    pub account_id: AccountId,
    pub payment_id: Option<PaymentId>,
    pub transaction_id: Option<TransactionId>,
    pub payment_external_key: String,
    pub transaction_external_key: String,
    pub transaction_type: TransactionType,
    pub requested_amount: Money,
    pub requested_currency: Currency,
    pub requested_payment_method_id: Option<PaymentMethodId>,
    pub submitted_amount: Option<Money>,
    pub submitted_currency: Option<Currency>,
    pub submitted_payment_method_id: Option<PaymentMethodId>,
    pub plugin_names: Vec<String>,
    pub properties: Vec<PluginProperty>,
    pub state: AttemptState,
    /// Number of passes started through prior evaluation.
    pub sub_attempts: u32,
    pub failure_reason: Option<String>,
    /// Errors raised by success/failure callbacks; recorded, never fatal.
    pub callback_errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentAttempt {
    /// Creates a new attempt in the `Init` state for a request.
    pub fn new(attempt_id: AttemptId, request: &PaymentRequest, plugin_names: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            attempt_id,
            account_id: request.account_id,
            payment_id: request.payment_id,
            transaction_id: None,
            payment_external_key: request.payment_external_key.clone(),
            transaction_external_key: request.transaction_external_key.clone(),
            transaction_type: request.transaction_type,
            requested_amount: request.amount,
            requested_currency: request.currency,
            requested_payment_method_id: request.payment_method_id,
            submitted_amount: None,
            submitted_currency: None,
            submitted_payment_method_id: None,
            plugin_names,
            properties: request.properties.clone(),
            state: AttemptState::Init,
            sub_attempts: 0,
            failure_reason: None,
            callback_errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(DomainError::AttemptTerminal(self.state));
        }
        Ok(())
    }

    /// Moves the attempt to `next`, enforcing the state machine.
    pub fn transition_to(&mut self, next: AttemptState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidAttemptTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Starts a new pass at prior evaluation and bumps the pass counter.
    pub fn begin_pass(&mut self) -> Result<()> {
        self.transition_to(AttemptState::PriorEvaluation)?;
        self.sub_attempts += 1;
        Ok(())
    }

    /// Records the parameters the chain settled on for this pass.
    pub fn record_submission(
        &mut self,
        amount: Money,
        currency: Currency,
        payment_method_id: PaymentMethodId,
    ) -> Result<()> {
        self.ensure_mutable()?;
        self.submitted_amount = Some(amount);
        self.submitted_currency = Some(currency);
        self.submitted_payment_method_id = Some(payment_method_id);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Links the attempt to the payment and transaction its pass produced.
    pub fn link_transaction(
        &mut self,
        payment_id: PaymentId,
        transaction_id: TransactionId,
    ) -> Result<()> {
        self.ensure_mutable()?;
        self.payment_id = Some(payment_id);
        self.transaction_id = Some(transaction_id);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a callback error without affecting the attempt's outcome.
    pub fn record_callback_error(&mut self, error: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.callback_errors.push(error.into());
        Ok(())
    }

    /// Ends the attempt in `Aborted` with a reason.
    pub fn abort(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition_to(AttemptState::Aborted)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Returns true if the attempt reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
