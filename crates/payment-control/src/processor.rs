//! Transaction orchestrator for controlled and direct payment operations.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{AccountId, AttemptId, PaymentId, PaymentMethodId, TransactionId};
use domain::{
    AttemptState, Currency, DomainError, Money, Payment, PaymentAttempt, PaymentRequest,
    PaymentTransaction, PluginProperty, TransactionStatus, TransactionType,
};
use payment_store::PaymentStore;
use tokio::task::JoinHandle;

use crate::chain::{Adjusted, ControlChain, PriorOutcome};
use crate::config::ControlConfig;
use crate::error::{ControlError, Result};
use crate::gateway::{GatewayRequest, GatewayStatus, PaymentGateway};
use crate::locks::{PaymentLockGuard, PaymentLocks};
use crate::plugin::{ControlContext, FailureResult};
use crate::registry::PluginRegistry;
use crate::retry::RetryScheduler;

/// Per-call options for a controlled operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentOptions {
    /// Record the transaction as successful without contacting the gateway.
    pub external_payment: bool,
    /// Plugins to run, in order. Empty falls back to the configured defaults.
    pub control_plugin_names: Vec<String>,
}

impl PaymentOptions {
    pub fn with_plugins<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            external_payment: false,
            control_plugin_names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn external(mut self) -> Self {
        self.external_payment = true;
        self
    }
}

/// Everything needed to submit and record one transaction.
struct Submission<'a> {
    attempt_id: Option<AttemptId>,
    payment_id: PaymentId,
    account_id: AccountId,
    payment_external_key: &'a str,
    transaction_type: TransactionType,
    transaction_external_key: &'a str,
    amount: Money,
    currency: Currency,
    payment_method_id: PaymentMethodId,
    properties: &'a [PluginProperty],
    external_payment: bool,
}

/// Drives payment operations through the gateway.
///
/// Controlled operations run the resolved plugin chain around every gateway
/// call and keep a persisted attempt record in step with each transition:
///
/// ```text
/// Init → PriorEvaluation → GatewaySubmit → SuccessCallback → Completed
///                                        → FailureCallback → Aborted
///                                                          → RetryScheduled → PriorEvaluation
/// ```
///
/// Direct operations skip plugins and attempt records entirely.
///
/// Operations on the same payment are serialized from the initial load
/// through the recorded outcome, so a replayed request is charged once and
/// balance checks never run against a stale payment.
pub struct PaymentProcessor<S, G>
where
    S: PaymentStore,
    G: PaymentGateway,
{
    store: S,
    gateway: G,
    registry: Arc<PluginRegistry>,
    scheduler: RetryScheduler,
    locks: PaymentLocks,
    config: ControlConfig,
}

impl<S, G> PaymentProcessor<S, G>
where
    S: PaymentStore,
    G: PaymentGateway,
{
    /// Creates a new payment processor.
    pub fn new(store: S, gateway: G, registry: Arc<PluginRegistry>, config: ControlConfig) -> Self {
        let scheduler = RetryScheduler::new(config.retry_policy());
        Self {
            store,
            gateway,
            registry,
            scheduler,
            locks: PaymentLocks::new(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Loads a payment with its transactions.
    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.store.load_payment(payment_id).await?)
    }

    /// Loads an attempt record.
    pub async fn get_attempt(&self, attempt_id: AttemptId) -> Result<Option<PaymentAttempt>> {
        Ok(self.store.load_attempt(attempt_id).await?)
    }

    /// Lists the attempts linked to a payment, oldest first.
    pub async fn attempts_for_payment(&self, payment_id: PaymentId) -> Result<Vec<PaymentAttempt>> {
        Ok(self.store.attempts_for_payment(payment_id).await?)
    }

    /// Cancels a pending re-attempt.
    ///
    /// The waiting attempt ends `Aborted` and its caller receives
    /// `RetryCancelled`. Returns false if no retry was pending.
    pub fn cancel_retry(&self, attempt_id: AttemptId) -> bool {
        let cancelled = self.scheduler.cancel_attempt(attempt_id);
        if cancelled {
            tracing::info!(%attempt_id, "retry cancellation requested");
        }
        cancelled
    }

    /// Executes an operation without control plugins.
    ///
    /// The transaction is recorded with no attempt id and no attempt record
    /// is created.
    #[tracing::instrument(
        skip(self, request),
        fields(transaction_type = %request.transaction_type, account_id = %request.account_id)
    )]
    pub async fn execute_direct(&self, request: PaymentRequest) -> Result<Payment> {
        let _lock = self.lock_payment(&request).await?;
        let payment = self.load_target(&request).await?;
        Self::validate(&request, payment.as_ref())?;

        if let Some(existing) = payment.as_ref()
            && existing
                .find_successful(request.transaction_type, &request.transaction_external_key)
                .is_some()
        {
            tracing::info!(
                payment_id = %existing.id(),
                "transaction already recorded, gateway not contacted"
            );
            return Ok(existing.clone());
        }

        let payment_id = payment.as_ref().map_or_else(PaymentId::new, Payment::id);
        let payment_method_id = Self::payment_method_for(&request, payment.as_ref())?;
        let submission = Submission {
            attempt_id: None,
            payment_id,
            account_id: request.account_id,
            payment_external_key: &request.payment_external_key,
            transaction_type: request.transaction_type,
            transaction_external_key: &request.transaction_external_key,
            amount: request.amount,
            currency: request.currency,
            payment_method_id,
            properties: &request.properties,
            external_payment: false,
        };

        let transaction = self.submit(&submission).await;
        let succeeded = transaction.is_success();
        let reason = Self::failure_reason(&transaction);
        let payment = self.record(payment, &submission, transaction).await?;

        if succeeded {
            tracing::info!(%payment_id, "direct transaction succeeded");
            Ok(payment)
        } else {
            tracing::warn!(%payment_id, %reason, "direct transaction failed");
            Err(ControlError::Gateway {
                attempt_id: None,
                payment_id,
                reason,
            })
        }
    }

    /// Executes an operation through the control plugin chain.
    ///
    /// Returns the payment once a pass succeeds, or exactly one terminal
    /// error once the attempt is aborted.
    #[tracing::instrument(
        skip(self, request, options),
        fields(transaction_type = %request.transaction_type, account_id = %request.account_id)
    )]
    pub async fn execute_controlled(
        &self,
        request: PaymentRequest,
        options: &PaymentOptions,
    ) -> Result<Payment> {
        let started = Instant::now();

        // 1. Validate before anything is persisted
        let _lock = self.lock_payment(&request).await?;
        let payment = self.load_target(&request).await?;
        Self::validate(&request, payment.as_ref())?;

        // 2. Create the attempt record
        metrics::counter!("payment_control_attempts_total").increment(1);
        let plugin_names = if options.control_plugin_names.is_empty() {
            self.config.default_plugin_names.clone()
        } else {
            options.control_plugin_names.clone()
        };
        let mut attempt = PaymentAttempt::new(AttemptId::new(), &request, plugin_names);
        if attempt.payment_id.is_none() {
            attempt.payment_id = payment.as_ref().map(Payment::id);
        }
        self.store.save_attempt(&attempt).await?;
        tracing::info!(attempt_id = %attempt.attempt_id, "attempt created");

        // 3. Resolve the chain once for the whole attempt
        let chain = match self.registry.resolve(&attempt.plugin_names).await {
            Ok(chain) => chain,
            Err(e) => {
                self.finish_aborted(&mut attempt, e.to_string()).await?;
                return Err(e);
            }
        };

        // 4. Run passes until the attempt is terminal
        let result = self
            .run_attempt(&mut attempt, &chain, &request, payment, options)
            .await;

        metrics::histogram!("payment_control_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn run_attempt(
        &self,
        attempt: &mut PaymentAttempt,
        chain: &ControlChain,
        request: &PaymentRequest,
        mut payment: Option<Payment>,
        options: &PaymentOptions,
    ) -> Result<Payment> {
        let attempt_id = attempt.attempt_id;
        let payment_id = payment.as_ref().map_or_else(PaymentId::new, Payment::id);

        loop {
            attempt.begin_pass()?;
            self.store.save_attempt(attempt).await?;
            tracing::info!(
                %attempt_id,
                sub_attempt = attempt.sub_attempts,
                state = %attempt.state,
                "evaluating control plugins"
            );

            // Prior calls always start from the original request values
            let context = ControlContext::for_attempt(
                attempt,
                request
                    .payment_method_id
                    .or(payment.as_ref().map(Payment::payment_method_id)),
            );
            let Adjusted {
                context,
                properties,
            } = match chain.prior_call(&context, &request.properties).await {
                PriorOutcome::Continue(adjusted) => adjusted,
                PriorOutcome::Abort { plugin, reason } => {
                    self.finish_aborted(attempt, format!("aborted by {plugin}: {reason}"))
                        .await?;
                    return Err(ControlError::ControlAbort {
                        attempt_id,
                        plugin,
                        reason,
                    });
                }
            };

            let replayed = payment
                .as_ref()
                .and_then(|p| {
                    p.find_successful(context.transaction_type, &context.transaction_external_key)
                })
                .cloned();

            let payment_method_id =
                match Self::check_adjusted(&context, payment.as_ref(), replayed.is_some()) {
                    Ok(payment_method_id) => payment_method_id,
                    Err(e) => {
                        self.finish_aborted(attempt, e.to_string()).await?;
                        return Err(ControlError::Validation(e));
                    }
                };

            attempt.record_submission(context.amount, context.currency, payment_method_id)?;
            attempt.transition_to(AttemptState::GatewaySubmit)?;
            self.store.save_attempt(attempt).await?;

            let transaction = match replayed {
                Some(existing) => {
                    tracing::info!(
                        %attempt_id,
                        transaction_id = %existing.id,
                        "transaction already recorded, gateway not contacted"
                    );
                    existing
                }
                None => {
                    let submission = Submission {
                        attempt_id: Some(attempt_id),
                        payment_id,
                        account_id: context.account_id,
                        payment_external_key: &context.payment_external_key,
                        transaction_type: context.transaction_type,
                        transaction_external_key: &context.transaction_external_key,
                        amount: context.amount,
                        currency: context.currency,
                        payment_method_id,
                        properties: &properties,
                        external_payment: options.external_payment,
                    };
                    let transaction = self.submit(&submission).await;
                    payment = Some(
                        self.record(payment.take(), &submission, transaction.clone())
                            .await?,
                    );
                    transaction
                }
            };

            attempt.link_transaction(payment_id, transaction.id)?;
            let context = context.with_transaction(payment_id, transaction.id);

            if transaction.is_success() {
                attempt.transition_to(AttemptState::SuccessCallback)?;
                self.store.save_attempt(attempt).await?;

                let outcome = chain.on_success_call(&context, &properties).await;
                for error in &outcome.errors {
                    attempt.record_callback_error(error.to_string())?;
                }

                attempt.transition_to(AttemptState::Completed)?;
                self.store.save_attempt(attempt).await?;
                metrics::counter!("payment_control_completed_total").increment(1);
                tracing::info!(%attempt_id, %payment_id, "attempt completed");

                return payment.ok_or(ControlError::PaymentNotFound(payment_id));
            }

            attempt.transition_to(AttemptState::FailureCallback)?;
            self.store.save_attempt(attempt).await?;

            let outcome = chain.on_failure_call(&context, &properties).await;
            for error in &outcome.errors {
                attempt.record_callback_error(error.to_string())?;
            }
            let reason = Self::failure_reason(&transaction);

            match outcome.decision {
                FailureResult::RetryAfter(delay)
                    if !self.scheduler.budget_exhausted(attempt.sub_attempts) =>
                {
                    attempt.transition_to(AttemptState::RetryScheduled)?;
                    self.store.save_attempt(attempt).await?;

                    let handle = match self.scheduler.schedule_retry(attempt_id, delay) {
                        Ok(handle) => handle,
                        Err(e) => {
                            self.finish_aborted(attempt, e.to_string()).await?;
                            return Err(e.into());
                        }
                    };
                    if handle.wait().await.is_err() {
                        self.finish_aborted(attempt, "retry cancelled").await?;
                        return Err(ControlError::RetryCancelled(attempt_id));
                    }
                }
                FailureResult::RetryAfter(_) => {
                    let attempts = attempt.sub_attempts;
                    self.finish_aborted(attempt, format!("retry budget exhausted: {reason}"))
                        .await?;
                    return Err(ControlError::RetryExhausted {
                        attempt_id,
                        attempts,
                    });
                }
                FailureResult::NoRetry | FailureResult::Abandon => {
                    self.finish_aborted(attempt, reason.clone()).await?;
                    return Err(ControlError::Gateway {
                        attempt_id: Some(attempt_id),
                        payment_id,
                        reason,
                    });
                }
            }
        }
    }

    /// Takes the payment's lock, keyed by its external key.
    ///
    /// Follow-up requests name the payment by id, so the stored payment is
    /// looked up first to find its key.
    async fn lock_payment(&self, request: &PaymentRequest) -> Result<PaymentLockGuard> {
        let key = match request.payment_id {
            Some(payment_id) => self
                .store
                .load_payment(payment_id)
                .await?
                .ok_or(ControlError::PaymentNotFound(payment_id))?
                .external_key()
                .to_string(),
            None => request.payment_external_key.clone(),
        };
        Ok(self.locks.acquire(&key).await)
    }

    async fn load_target(&self, request: &PaymentRequest) -> Result<Option<Payment>> {
        match request.payment_id {
            Some(payment_id) => self
                .store
                .load_payment(payment_id)
                .await?
                .map(Some)
                .ok_or(ControlError::PaymentNotFound(payment_id)),
            None => Ok(self
                .store
                .find_payment_by_external_key(&request.payment_external_key)
                .await?),
        }
    }

    fn validate(request: &PaymentRequest, payment: Option<&Payment>) -> Result<()> {
        request.validate().map_err(ControlError::Validation)?;

        let Some(payment) = payment else {
            return Ok(());
        };
        let replay = payment
            .find_successful(request.transaction_type, &request.transaction_external_key)
            .is_some();
        if replay {
            if payment.account_id() != request.account_id {
                return Err(ControlError::Validation(DomainError::AccountMismatch {
                    payment_id: payment.id(),
                    account_id: request.account_id,
                }));
            }
            return Ok(());
        }
        payment
            .check_operation(
                request.account_id,
                request.transaction_type,
                request.amount,
                request.currency,
            )
            .map_err(ControlError::Validation)
    }

    /// Validates the parameters the prior chain settled on.
    fn check_adjusted(
        context: &ControlContext,
        payment: Option<&Payment>,
        replay: bool,
    ) -> std::result::Result<PaymentMethodId, DomainError> {
        if !context.amount.is_valid_charge() {
            return Err(DomainError::InvalidAmount {
                amount: context.amount,
            });
        }
        let payment_method_id =
            context
                .payment_method_id
                .ok_or(DomainError::PaymentMethodRequired {
                    transaction_type: context.transaction_type,
                })?;
        if let Some(payment) = payment
            && !replay
        {
            payment.check_operation(
                context.account_id,
                context.transaction_type,
                context.amount,
                context.currency,
            )?;
        }
        Ok(payment_method_id)
    }

    fn payment_method_for(
        request: &PaymentRequest,
        payment: Option<&Payment>,
    ) -> Result<PaymentMethodId> {
        request
            .payment_method_id
            .or(payment.map(Payment::payment_method_id))
            .ok_or(ControlError::Validation(DomainError::PaymentMethodRequired {
                transaction_type: request.transaction_type,
            }))
    }

    /// Submits one transaction and turns the gateway's answer into a record.
    async fn submit(&self, submission: &Submission<'_>) -> PaymentTransaction {
        let transaction_id = TransactionId::new();

        let (status, gateway_reference, gateway_message) = if submission.external_payment {
            tracing::info!(
                payment_id = %submission.payment_id,
                "external payment, gateway not contacted"
            );
            (
                TransactionStatus::Success,
                None,
                Some("external payment".to_string()),
            )
        } else {
            metrics::counter!("payment_gateway_submissions_total").increment(1);
            let request = GatewayRequest {
                payment_id: submission.payment_id,
                transaction_id,
                transaction_type: submission.transaction_type,
                amount: submission.amount,
                currency: submission.currency,
                payment_method_id: submission.payment_method_id,
                properties: submission.properties.to_vec(),
            };
            match self.gateway.submit(&request).await {
                Ok(outcome) => {
                    let status = match outcome.status {
                        GatewayStatus::Processed => TransactionStatus::Success,
                        GatewayStatus::Declined => TransactionStatus::PaymentFailure,
                    };
                    (status, Some(outcome.reference), outcome.message)
                }
                Err(e) => {
                    tracing::warn!(
                        payment_id = %submission.payment_id,
                        error = %e,
                        "gateway call failed"
                    );
                    (TransactionStatus::GatewayError, None, Some(e.to_string()))
                }
            }
        };

        PaymentTransaction {
            id: transaction_id,
            attempt_id: submission.attempt_id,
            external_key: submission.transaction_external_key.to_string(),
            transaction_type: submission.transaction_type,
            amount: submission.amount,
            currency: submission.currency,
            payment_method_id: submission.payment_method_id,
            status,
            gateway_reference,
            gateway_message,
            created_at: Utc::now(),
        }
    }

    /// Persists a transaction, creating the payment on its first transaction.
    async fn record(
        &self,
        payment: Option<Payment>,
        submission: &Submission<'_>,
        transaction: PaymentTransaction,
    ) -> Result<Payment> {
        match payment {
            Some(mut payment) => {
                self.store.save_transaction(payment.id(), &transaction).await?;
                payment.record_transaction(transaction);
                Ok(payment)
            }
            None => {
                let mut payment = Payment::new(
                    submission.payment_id,
                    submission.account_id,
                    submission.payment_method_id,
                    submission.payment_external_key,
                    submission.currency,
                );
                payment.record_transaction(transaction);
                self.store.save_payment(&payment).await?;
                Ok(payment)
            }
        }
    }

    async fn finish_aborted(
        &self,
        attempt: &mut PaymentAttempt,
        reason: impl Into<String>,
    ) -> Result<()> {
        attempt.abort(reason)?;
        self.store.save_attempt(attempt).await?;
        metrics::counter!("payment_control_aborted_total").increment(1);
        tracing::warn!(
            attempt_id = %attempt.attempt_id,
            sub_attempt = attempt.sub_attempts,
            reason = attempt.failure_reason.as_deref().unwrap_or_default(),
            "attempt aborted"
        );
        Ok(())
    }

    fn failure_reason(transaction: &PaymentTransaction) -> String {
        transaction
            .gateway_message
            .clone()
            .unwrap_or_else(|| transaction.status.to_string())
    }
}

impl<S, G> PaymentProcessor<S, G>
where
    S: PaymentStore + 'static,
    G: PaymentGateway + 'static,
{
    /// Runs a controlled operation on its own task.
    pub fn spawn_controlled(
        self: &Arc<Self>,
        request: PaymentRequest,
        options: PaymentOptions,
    ) -> JoinHandle<Result<Payment>> {
        let processor = Arc::clone(self);
        tokio::spawn(async move { processor.execute_controlled(request, &options).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use payment_store::InMemoryPaymentStore;

    fn make_processor() -> PaymentProcessor<InMemoryPaymentStore, InMemoryGateway> {
        PaymentProcessor::new(
            InMemoryPaymentStore::new(),
            InMemoryGateway::new(),
            Arc::new(PluginRegistry::new()),
            ControlConfig::default(),
        )
    }

    fn authorize(amount: i64) -> PaymentRequest {
        PaymentRequest::authorize(
            AccountId::new(),
            PaymentMethodId::new(),
            Money::from_units(amount),
            Currency::Usd,
        )
    }

    #[test]
    fn test_options_builder() {
        let options = PaymentOptions::with_plugins(["fraud", "router"]).external();
        assert!(options.external_payment);
        assert_eq!(options.control_plugin_names, vec!["fraud", "router"]);
        assert_eq!(PaymentOptions::default().control_plugin_names.len(), 0);
    }

    #[tokio::test]
    async fn test_direct_authorize_has_no_attempt() {
        let processor = make_processor();
        let payment = processor.execute_direct(authorize(10)).await.unwrap();

        assert_eq!(payment.transactions().len(), 1);
        assert!(payment.transactions()[0].attempt_id.is_none());
        assert_eq!(payment.auth_amount(), Money::from_units(10));
        assert_eq!(processor.store.attempt_count(), 0);
    }

    #[tokio::test]
    async fn test_controlled_authorize_with_empty_chain() {
        let processor = make_processor();
        let payment = processor
            .execute_controlled(authorize(10), &PaymentOptions::default())
            .await
            .unwrap();

        let attempt_id = payment.transactions()[0].attempt_id.unwrap();
        let attempt = processor.get_attempt(attempt_id).await.unwrap().unwrap();
        assert_eq!(attempt.state, AttemptState::Completed);
        assert_eq!(attempt.sub_attempts, 1);
        assert_eq!(attempt.payment_id, Some(payment.id()));
        assert_eq!(attempt.transaction_id, Some(payment.transactions()[0].id));
    }

    #[tokio::test]
    async fn test_validation_creates_no_attempt() {
        let processor = make_processor();
        let result = processor
            .execute_controlled(authorize(0), &PaymentOptions::default())
            .await;

        assert!(matches!(result, Err(ref e) if e.is_validation()));
        assert_eq!(processor.store.attempt_count(), 0);
        assert_eq!(processor.gateway.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_follow_up_on_unknown_payment() {
        let processor = make_processor();
        let request = PaymentRequest::capture(
            AccountId::new(),
            PaymentId::new(),
            Money::from_units(5),
            Currency::Usd,
        );

        let result = processor.execute_direct(request).await;
        assert!(matches!(result, Err(ControlError::PaymentNotFound(_))));
    }

    #[tokio::test]
    async fn test_direct_decline_records_failed_transaction() {
        let processor = make_processor();
        processor.gateway.set_decline_all(true);

        let request = authorize(10);
        let key = request.payment_external_key.clone();
        let result = processor.execute_direct(request).await;
        assert!(matches!(
            result,
            Err(ControlError::Gateway {
                attempt_id: None,
                ..
            })
        ));

        let payment = processor
            .store
            .find_payment_by_external_key(&key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            payment.transactions()[0].status,
            TransactionStatus::PaymentFailure
        );
        assert_eq!(payment.auth_amount(), Money::zero());
    }

    #[tokio::test]
    async fn test_cancel_retry_without_pending_retry() {
        let processor = make_processor();
        assert!(!processor.cancel_retry(AttemptId::new()));
    }
}
