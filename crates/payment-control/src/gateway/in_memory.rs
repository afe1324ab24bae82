//! In-memory gateway used by tests and the demo binary.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::PaymentMethodId;
use domain::TransactionType;

use super::{GatewayError, GatewayOutcome, GatewayRequest, PaymentGateway};

/// A scripted response consumed by the next submission.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Process,
    Decline(String),
    Fail(GatewayError),
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    submissions: Vec<GatewayRequest>,
    scripted: VecDeque<ScriptedResponse>,
    declined_methods: HashSet<PaymentMethodId>,
    decline_all: bool,
    unavailable: bool,
    latency: Option<Duration>,
    next_reference: u32,
}

/// In-memory payment gateway for testing.
///
/// Processes every submission unless told otherwise. Scripted responses take
/// precedence over the toggles and are consumed in order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryGatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues responses for the next submissions.
    pub fn script(&self, responses: impl IntoIterator<Item = ScriptedResponse>) {
        self.state().scripted.extend(responses);
    }

    /// Declines the next `count` submissions.
    pub fn decline_next(&self, count: usize) {
        self.script((0..count).map(|_| ScriptedResponse::Decline("Insufficient funds".to_string())));
    }

    /// Declines every submission charging the given payment method.
    pub fn decline_payment_method(&self, payment_method_id: PaymentMethodId) {
        self.state().declined_methods.insert(payment_method_id);
    }

    /// Configures the gateway to decline every submission.
    pub fn set_decline_all(&self, decline: bool) {
        self.state().decline_all = decline;
    }

    /// Configures the gateway to fail every submission with an error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Delays every response, simulating a slow processor.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    /// Returns the number of submissions received.
    pub fn submission_count(&self) -> usize {
        self.state().submissions.len()
    }

    /// Returns every submission received, in order.
    pub fn submissions(&self) -> Vec<GatewayRequest> {
        self.state().submissions.clone()
    }

    /// Returns the number of submissions of one transaction type.
    pub fn submissions_of(&self, transaction_type: TransactionType) -> usize {
        self.state()
            .submissions
            .iter()
            .filter(|s| s.transaction_type == transaction_type)
            .count()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn submit(&self, request: &GatewayRequest) -> Result<GatewayOutcome, GatewayError> {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        state.submissions.push(request.clone());
        state.next_reference += 1;
        let reference = format!("GW-{:04}", state.next_reference);

        if let Some(response) = state.scripted.pop_front() {
            return match response {
                ScriptedResponse::Process => Ok(GatewayOutcome::processed(reference)),
                ScriptedResponse::Decline(message) => {
                    Ok(GatewayOutcome::declined(reference, message))
                }
                ScriptedResponse::Fail(error) => Err(error),
            };
        }

        if state.unavailable {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }
        if state.decline_all || state.declined_methods.contains(&request.payment_method_id) {
            return Ok(GatewayOutcome::declined(reference, "Payment declined"));
        }
        Ok(GatewayOutcome::processed(reference))
    }
}
