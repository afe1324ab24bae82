use std::sync::Arc;

use async_trait::async_trait;
use common::{AttemptId, PaymentId};
use dashmap::DashMap;
use domain::{Payment, PaymentAttempt, PaymentTransaction};

use crate::{PaymentStore, Result, StoreError};

/// In-memory payment store implementation for testing.
///
/// Backed by sharded concurrent maps so inserts for distinct attempt IDs do
/// not contend on a single lock. Provides the same interface as the
/// PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    attempts: Arc<DashMap<AttemptId, PaymentAttempt>>,
    payments: Arc<DashMap<PaymentId, Payment>>,
    external_keys: Arc<DashMap<String, PaymentId>>,
}

impl InMemoryPaymentStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of attempt records stored.
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Returns the number of payments stored.
    pub fn payment_count(&self) -> usize {
        self.payments.len()
    }

    /// Returns the number of transactions across all payments.
    pub fn transaction_count(&self) -> usize {
        self.payments
            .iter()
            .map(|entry| entry.value().transactions().len())
            .sum()
    }

    /// Clears all records.
    pub fn clear(&self) {
        self.attempts.clear();
        self.payments.clear();
        self.external_keys.clear();
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn save_attempt(&self, attempt: &PaymentAttempt) -> Result<()> {
        self.attempts.insert(attempt.attempt_id, attempt.clone());
        Ok(())
    }

    async fn load_attempt(&self, attempt_id: AttemptId) -> Result<Option<PaymentAttempt>> {
        Ok(self.attempts.get(&attempt_id).map(|entry| entry.clone()))
    }

    async fn attempts_for_payment(&self, payment_id: PaymentId) -> Result<Vec<PaymentAttempt>> {
        let mut attempts: Vec<_> = self
            .attempts
            .iter()
            .filter(|entry| entry.payment_id == Some(payment_id))
            .map(|entry| entry.value().clone())
            .collect();
        attempts.sort_by_key(|a| a.created_at);
        Ok(attempts)
    }

    async fn save_payment(&self, payment: &Payment) -> Result<()> {
        self.external_keys
            .insert(payment.external_key().to_string(), payment.id());
        self.payments.insert(payment.id(), payment.clone());
        Ok(())
    }

    async fn save_transaction(
        &self,
        payment_id: PaymentId,
        transaction: &PaymentTransaction,
    ) -> Result<()> {
        let mut payment = self
            .payments
            .get_mut(&payment_id)
            .ok_or(StoreError::PaymentNotFound(payment_id))?;

        // A replayed write for an already stored transaction is a no-op.
        if payment.transaction(transaction.id).is_none() {
            payment.record_transaction(transaction.clone());
        }
        Ok(())
    }

    async fn load_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.payments.get(&payment_id).map(|entry| entry.clone()))
    }

    async fn find_payment_by_external_key(&self, external_key: &str) -> Result<Option<Payment>> {
        let Some(payment_id) = self.external_keys.get(external_key).map(|entry| *entry) else {
            return Ok(None);
        };
        self.load_payment(payment_id).await
    }
}
