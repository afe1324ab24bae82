use async_trait::async_trait;
use common::{AttemptId, PaymentId};
use domain::{Payment, PaymentAttempt, PaymentTransaction};

use crate::Result;

/// Durable storage for attempt records and payments.
///
/// Every write is an upsert keyed by the record's own ID, so a caller that
/// retries a write after an ambiguous failure never duplicates a record.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts or replaces an attempt record.
    async fn save_attempt(&self, attempt: &PaymentAttempt) -> Result<()>;

    /// Loads an attempt record.
    ///
    /// Returns None if no attempt exists with this ID.
    async fn load_attempt(&self, attempt_id: AttemptId) -> Result<Option<PaymentAttempt>>;

    /// Returns all attempts linked to a payment, oldest first.
    async fn attempts_for_payment(&self, payment_id: PaymentId) -> Result<Vec<PaymentAttempt>>;

    /// Inserts or updates a payment header and all of its transactions.
    async fn save_payment(&self, payment: &Payment) -> Result<()>;

    /// Inserts a single transaction on an existing payment.
    ///
    /// Fails with `PaymentNotFound` if the payment was never saved.
    async fn save_transaction(
        &self,
        payment_id: PaymentId,
        transaction: &PaymentTransaction,
    ) -> Result<()>;

    /// Loads a payment with its transactions in recording order.
    ///
    /// Returns None if no payment exists with this ID.
    async fn load_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>>;

    /// Finds a payment by the caller-supplied external key.
    async fn find_payment_by_external_key(&self, external_key: &str) -> Result<Option<Payment>>;
}

/// Extension trait providing convenience methods for payment stores.
#[async_trait]
pub trait PaymentStoreExt: PaymentStore {
    /// Loads a payment, failing if it does not exist.
    async fn require_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.load_payment(payment_id)
            .await?
            .ok_or(crate::StoreError::PaymentNotFound(payment_id))
    }

    /// Loads an attempt, failing if it does not exist.
    async fn require_attempt(&self, attempt_id: AttemptId) -> Result<PaymentAttempt> {
        self.load_attempt(attempt_id)
            .await?
            .ok_or(crate::StoreError::AttemptNotFound(attempt_id))
    }
}

impl<T: PaymentStore + ?Sized> PaymentStoreExt for T {}
