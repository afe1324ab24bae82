//! Demo entry point: a direct authorization followed by a controlled capture.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{AccountId, PaymentMethodId};
use domain::{Currency, Money, PaymentRequest, PluginProperty};
use payment_control::{
    ControlConfig, ControlContext, ControlPlugin, ControlPluginError, FailureResult,
    InMemoryGateway, PaymentOptions, PaymentProcessor, PluginRegistry, PriorResult,
    SuccessResult,
};
use payment_store::InMemoryPaymentStore;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Sends requests tagged `route=backup` to a backup payment method and asks
/// for a quick retry on failure.
struct RoutingPlugin {
    backup: PaymentMethodId,
}

#[async_trait]
impl ControlPlugin for RoutingPlugin {
    async fn prior_call(
        &self,
        context: &ControlContext,
        properties: &[PluginProperty],
    ) -> Result<PriorResult, ControlPluginError> {
        let wants_backup = PluginProperty::find(properties, "route")
            .is_some_and(|p| p.value == serde_json::Value::from("backup"));
        if wants_backup && context.transaction_type.is_initial() {
            tracing::info!(attempt_id = %context.attempt_id, "routing to backup payment method");
            return Ok(PriorResult::proceed().with_payment_method(self.backup));
        }
        Ok(PriorResult::proceed())
    }

    async fn on_success_call(
        &self,
        context: &ControlContext,
        _properties: &[PluginProperty],
    ) -> Result<SuccessResult, ControlPluginError> {
        tracing::info!(
            attempt_id = %context.attempt_id,
            transaction_type = %context.transaction_type,
            amount = %context.amount,
            "routed transaction succeeded"
        );
        Ok(SuccessResult::acknowledge())
    }

    async fn on_failure_call(
        &self,
        _context: &ControlContext,
        _properties: &[PluginProperty],
    ) -> Result<FailureResult, ControlPluginError> {
        Ok(FailureResult::retry_after(Duration::from_millis(100)))
    }
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    let config = ControlConfig::from_env();
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Register plugins and build the processor
    let registry = Arc::new(PluginRegistry::new());
    registry
        .register(
            "routing",
            Arc::new(RoutingPlugin {
                backup: PaymentMethodId::new(),
            }),
        )
        .await;
    let processor = PaymentProcessor::new(
        InMemoryPaymentStore::new(),
        InMemoryGateway::new(),
        registry,
        config,
    );

    // 4. Authorize $10 directly
    let account_id = AccountId::new();
    let authorize = PaymentRequest::authorize(
        account_id,
        PaymentMethodId::new(),
        Money::from_units(10),
        Currency::Usd,
    );
    let payment = processor
        .execute_direct(authorize)
        .await
        .expect("direct authorization failed");
    tracing::info!(payment_id = %payment.id(), "payment authorized");

    // 5. Capture $10 through the plugin chain
    let capture =
        PaymentRequest::capture(account_id, payment.id(), Money::from_units(10), Currency::Usd);
    let payment = processor
        .execute_controlled(capture, &PaymentOptions::with_plugins(["routing"]))
        .await
        .expect("controlled capture failed");

    tracing::info!(
        payment_id = %payment.id(),
        captured = %payment.captured_amount(),
        transactions = payment.transactions().len(),
        "payment captured"
    );
    let json = serde_json::to_string_pretty(&payment).expect("payment serializes to JSON");
    println!("{json}");
    println!("{}", metrics_handle.render());
}
