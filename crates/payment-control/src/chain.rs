//! Ordered execution of control plugins around one gateway call.

use std::fmt;
use std::sync::Arc;

use domain::PluginProperty;

use crate::plugin::{ControlContext, ControlPlugin, FailureResult};

/// Outcome of running the prior-call chain.
#[derive(Debug, Clone, PartialEq)]
pub enum PriorOutcome {
    /// Every plugin let the operation continue.
    Continue(Adjusted),
    /// A plugin aborted, or failed, before the gateway was contacted.
    Abort { plugin: String, reason: String },
}

/// Context and properties after all prior-call adjustments.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjusted {
    pub context: ControlContext,
    pub properties: Vec<PluginProperty>,
}

/// Error returned by a plugin in a post-call callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginCallbackError {
    pub plugin: String,
    pub message: String,
}

impl fmt::Display for PluginCallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.plugin, self.message)
    }
}

/// Outcome of the success callbacks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessOutcome {
    pub errors: Vec<PluginCallbackError>,
}

/// Outcome of the failure callbacks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailureOutcome {
    pub decision: FailureResult,
    pub errors: Vec<PluginCallbackError>,
}

struct ChainEntry {
    name: String,
    plugin: Arc<dyn ControlPlugin>,
}

/// An ordered, resolved list of control plugins.
#[derive(Default)]
pub struct ControlChain {
    entries: Vec<ChainEntry>,
}

impl ControlChain {
    pub(crate) fn push(&mut self, name: String, plugin: Arc<dyn ControlPlugin>) {
        self.entries.push(ChainEntry { name, plugin });
    }

    /// Returns the plugin names in invocation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Folds the prior calls left to right.
    ///
    /// Each plugin sees the context as adjusted by the plugins before it. The
    /// first abort or callback error stops the chain.
    pub async fn prior_call(
        &self,
        context: &ControlContext,
        properties: &[PluginProperty],
    ) -> PriorOutcome {
        let mut adjusted = Adjusted {
            context: context.clone(),
            properties: properties.to_vec(),
        };

        for entry in &self.entries {
            match entry
                .plugin
                .prior_call(&adjusted.context, &adjusted.properties)
                .await
            {
                Ok(result) if result.aborted => {
                    return PriorOutcome::Abort {
                        plugin: entry.name.clone(),
                        reason: "aborted by control plugin".to_string(),
                    };
                }
                Ok(result) => {
                    adjusted.context = adjusted.context.adjusted(&result);
                    if let Some(properties) = result.adjusted_plugin_properties {
                        adjusted.properties = properties;
                    }
                }
                Err(e) => {
                    tracing::warn!(plugin = %entry.name, error = %e, "prior call failed");
                    return PriorOutcome::Abort {
                        plugin: entry.name.clone(),
                        reason: e.to_string(),
                    };
                }
            }
        }

        PriorOutcome::Continue(adjusted)
    }

    /// Runs every success callback in order, collecting errors.
    pub async fn on_success_call(
        &self,
        context: &ControlContext,
        properties: &[PluginProperty],
    ) -> SuccessOutcome {
        let mut properties = properties.to_vec();
        let mut outcome = SuccessOutcome::default();

        for entry in &self.entries {
            match entry.plugin.on_success_call(context, &properties).await {
                Ok(result) => {
                    if let Some(adjusted) = result.adjusted_plugin_properties {
                        properties = adjusted;
                    }
                }
                Err(e) => {
                    tracing::warn!(plugin = %entry.name, error = %e, "success callback failed");
                    outcome.errors.push(PluginCallbackError {
                        plugin: entry.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        outcome
    }

    /// Runs every failure callback in order and reconciles their verdicts.
    ///
    /// A failing callback is recorded and counts as no retry.
    pub async fn on_failure_call(
        &self,
        context: &ControlContext,
        properties: &[PluginProperty],
    ) -> FailureOutcome {
        let mut outcome = FailureOutcome::default();

        for entry in &self.entries {
            let verdict = match entry.plugin.on_failure_call(context, properties).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    tracing::warn!(plugin = %entry.name, error = %e, "failure callback failed");
                    outcome.errors.push(PluginCallbackError {
                        plugin: entry.name.clone(),
                        message: e.to_string(),
                    });
                    FailureResult::NoRetry
                }
            };
            outcome.decision = outcome.decision.reconcile(verdict);
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{ControlPluginError, PriorResult, SuccessResult};
    use async_trait::async_trait;
    use common::{AccountId, AttemptId, PaymentMethodId};
    use domain::{Currency, Money, PaymentAttempt, PaymentRequest};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Plugin with a scripted behavior for each callback.
    struct ScriptedPlugin {
        prior: std::result::Result<PriorResult, ControlPluginError>,
        success_fails: bool,
        failure: std::result::Result<FailureResult, ControlPluginError>,
        seen_amounts: Mutex<Vec<Money>>,
    }

    impl ScriptedPlugin {
        fn proceeding() -> Self {
            Self {
                prior: Ok(PriorResult::proceed()),
                success_fails: false,
                failure: Ok(FailureResult::NoRetry),
                seen_amounts: Mutex::new(Vec::new()),
            }
        }

        fn with_prior(mut self, prior: PriorResult) -> Self {
            self.prior = Ok(prior);
            self
        }

        fn with_failure(mut self, failure: FailureResult) -> Self {
            self.failure = Ok(failure);
            self
        }
    }

    #[async_trait]
    impl ControlPlugin for ScriptedPlugin {
        async fn prior_call(
            &self,
            context: &ControlContext,
            _properties: &[PluginProperty],
        ) -> std::result::Result<PriorResult, ControlPluginError> {
            self.seen_amounts.lock().unwrap().push(context.amount);
            self.prior.clone()
        }

        async fn on_success_call(
            &self,
            _context: &ControlContext,
            _properties: &[PluginProperty],
        ) -> std::result::Result<SuccessResult, ControlPluginError> {
            if self.success_fails {
                return Err(ControlPluginError::new("ledger unavailable"));
            }
            Ok(SuccessResult::acknowledge())
        }

        async fn on_failure_call(
            &self,
            _context: &ControlContext,
            _properties: &[PluginProperty],
        ) -> std::result::Result<FailureResult, ControlPluginError> {
            self.failure.clone()
        }
    }

    fn make_context() -> ControlContext {
        let request = PaymentRequest::authorize(
            AccountId::new(),
            PaymentMethodId::new(),
            Money::from_units(10),
            Currency::Usd,
        );
        let attempt = PaymentAttempt::new(AttemptId::new(), &request, vec![]);
        ControlContext::for_attempt(&attempt, request.payment_method_id)
    }

    fn retrying_after(delay: Duration) -> Arc<ScriptedPlugin> {
        Arc::new(ScriptedPlugin::proceeding().with_failure(FailureResult::retry_after(delay)))
    }

    fn chain_of(plugins: Vec<(&str, Arc<ScriptedPlugin>)>) -> ControlChain {
        let mut chain = ControlChain::default();
        for (name, plugin) in plugins {
            chain.push(name.to_string(), plugin);
        }
        chain
    }

    #[tokio::test]
    async fn test_empty_chain_continues_unchanged() {
        let context = make_context();
        let outcome = ControlChain::default().prior_call(&context, &[]).await;
        match outcome {
            PriorOutcome::Continue(adjusted) => assert_eq!(adjusted.context, context),
            PriorOutcome::Abort { .. } => panic!("empty chain must not abort"),
        }
    }

    #[tokio::test]
    async fn test_adjustments_compose_left_to_right() {
        let first = Arc::new(
            ScriptedPlugin::proceeding()
                .with_prior(PriorResult::proceed().with_amount(Money::from_units(8))),
        );
        let second = Arc::new(ScriptedPlugin::proceeding());
        let chain = chain_of(vec![("first", first), ("second", second.clone())]);

        let outcome = chain.prior_call(&make_context(), &[]).await;

        assert_eq!(
            *second.seen_amounts.lock().unwrap(),
            vec![Money::from_units(8)]
        );
        match outcome {
            PriorOutcome::Continue(adjusted) => {
                assert_eq!(adjusted.context.amount, Money::from_units(8))
            }
            PriorOutcome::Abort { .. } => panic!("chain must continue"),
        }
    }

    #[tokio::test]
    async fn test_abort_short_circuits() {
        let first = Arc::new(ScriptedPlugin::proceeding().with_prior(PriorResult::abort()));
        let second = Arc::new(ScriptedPlugin::proceeding());
        let chain = chain_of(vec![("fraud", first), ("second", second.clone())]);

        let outcome = chain.prior_call(&make_context(), &[]).await;

        assert!(matches!(outcome, PriorOutcome::Abort { ref plugin, .. } if plugin == "fraud"));
        assert!(second.seen_amounts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prior_error_aborts_naming_plugin() {
        let mut failing = ScriptedPlugin::proceeding();
        failing.prior = Err(ControlPluginError::new("rules engine down"));
        let chain = chain_of(vec![("rules", Arc::new(failing))]);

        let outcome = chain.prior_call(&make_context(), &[]).await;

        assert_eq!(
            outcome,
            PriorOutcome::Abort {
                plugin: "rules".to_string(),
                reason: "rules engine down".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_prior_properties_replace() {
        let first = Arc::new(ScriptedPlugin::proceeding().with_prior(
            PriorResult::proceed().with_properties(vec![PluginProperty::new("route", "backup")]),
        ));
        let chain = chain_of(vec![("router", first)]);

        let outcome = chain
            .prior_call(&make_context(), &[PluginProperty::new("route", "primary")])
            .await;

        let PriorOutcome::Continue(adjusted) = outcome else {
            panic!("chain must continue");
        };
        assert_eq!(
            adjusted.properties,
            vec![PluginProperty::new("route", "backup")]
        );
    }

    #[tokio::test]
    async fn test_success_errors_are_collected() {
        let mut failing = ScriptedPlugin::proceeding();
        failing.success_fails = true;
        let chain = chain_of(vec![
            ("ledger", Arc::new(failing)),
            ("audit", Arc::new(ScriptedPlugin::proceeding())),
        ]);

        let outcome = chain.on_success_call(&make_context(), &[]).await;

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].to_string(), "ledger: ledger unavailable");
    }

    #[tokio::test]
    async fn test_failure_verdicts_reconcile() {
        let chain = chain_of(vec![
            ("slow", retrying_after(Duration::from_secs(30))),
            ("fast", retrying_after(Duration::from_secs(1))),
            ("quiet", Arc::new(ScriptedPlugin::proceeding())),
        ]);

        let outcome = chain.on_failure_call(&make_context(), &[]).await;
        assert_eq!(
            outcome.decision,
            FailureResult::retry_after(Duration::from_secs(1))
        );
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn test_failure_abandon_wins() {
        let chain = chain_of(vec![
            ("retry", retrying_after(Duration::from_secs(1))),
            (
                "stop",
                Arc::new(ScriptedPlugin::proceeding().with_failure(FailureResult::Abandon)),
            ),
        ]);

        let outcome = chain.on_failure_call(&make_context(), &[]).await;
        assert_eq!(outcome.decision, FailureResult::Abandon);
    }

    #[tokio::test]
    async fn test_failure_callback_error_counts_as_no_retry() {
        let mut failing = ScriptedPlugin::proceeding();
        failing.failure = Err(ControlPluginError::new("timeout"));
        let chain = chain_of(vec![("flaky", Arc::new(failing))]);

        let outcome = chain.on_failure_call(&make_context(), &[]).await;
        assert_eq!(outcome.decision, FailureResult::NoRetry);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].plugin, "flaky");
    }
}
