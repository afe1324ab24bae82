//! Gateway transaction records.

use chrono::{DateTime, Utc};
use common::{AttemptId, PaymentMethodId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::money::{Currency, Money};

/// The kind of operation a transaction performs against the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Authorize,
    Capture,
    Purchase,
    Refund,
    Credit,
    Void,
}

impl TransactionType {
    /// Returns true if this operation opens a new payment.
    pub fn is_initial(&self) -> bool {
        matches!(
            self,
            TransactionType::Authorize | TransactionType::Purchase | TransactionType::Credit
        )
    }

    /// Returns the operation name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Authorize => "AUTHORIZE",
            TransactionType::Capture => "CAPTURE",
            TransactionType::Purchase => "PURCHASE",
            TransactionType::Refund => "REFUND",
            TransactionType::Credit => "CREDIT",
            TransactionType::Void => "VOID",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a transaction as reported by (or on behalf of) the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// The gateway processed the transaction.
    Success,
    /// The gateway declined the transaction.
    PaymentFailure,
    /// The gateway call itself failed; the outcome is unknown to the processor.
    GatewayError,
}

impl TransactionStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::PaymentFailure => "PAYMENT_FAILURE",
            TransactionStatus::GatewayError => "GATEWAY_ERROR",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single gateway transaction belonging to a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: TransactionId,
    /// Set only when the transaction was produced through the control chain.
    pub attempt_id: Option<AttemptId>,
    pub external_key: String,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub currency: Currency,
    pub payment_method_id: PaymentMethodId,
    pub status: TransactionStatus,
    /// Reference assigned by the gateway, if it answered.
    pub gateway_reference: Option<String>,
    pub gateway_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Creates a transaction record with a fresh ID.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        attempt_id: Option<AttemptId>,
        external_key: impl Into<String>,
        transaction_type: TransactionType,
        amount: Money,
        currency: Currency,
        payment_method_id: PaymentMethodId,
        status: TransactionStatus,
        gateway_reference: Option<String>,
        gateway_message: Option<String>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            attempt_id,
            external_key: external_key.into(),
            transaction_type,
            amount,
            currency,
            payment_method_id,
            status,
            gateway_reference,
            gateway_message,
            created_at: Utc::now(),
        }
    }

    /// Returns true if the gateway processed this transaction.
    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }
}
