//! Domain error types.

use common::{AccountId, PaymentId};
use thiserror::Error;

use crate::attempt::AttemptState;
use crate::money::{Currency, Money};
use crate::payment::TransactionType;

/// Errors raised when a request or a state change violates the payment model.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The account identifier is missing.
    #[error("Account ID is required")]
    AccountIdRequired,

    /// Amounts must be strictly positive and within `Money::MAX`.
    #[error("Invalid amount: {amount} (must be greater than 0 and at most 10000000000000.00)")]
    InvalidAmount { amount: Money },

    /// The currency code is not one the system knows.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    /// New payments need an instrument to charge.
    #[error("Payment method is required for {transaction_type}")]
    PaymentMethodRequired { transaction_type: TransactionType },

    /// Follow-up operations need the payment they apply to.
    #[error("Payment ID is required for {transaction_type}")]
    PaymentIdRequired { transaction_type: TransactionType },

    /// The payment belongs to another account.
    #[error("Payment {payment_id} does not belong to account {account_id}")]
    AccountMismatch {
        payment_id: PaymentId,
        account_id: AccountId,
    },

    /// The request currency differs from the payment currency.
    #[error("Currency mismatch: payment is in {expected}, request is in {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },

    /// The operation is not allowed given the payment's current balances.
    #[error("Cannot {transaction_type} payment {payment_id}: {reason}")]
    OperationNotAllowed {
        payment_id: PaymentId,
        transaction_type: TransactionType,
        reason: String,
    },

    /// The attempt cannot move to the requested state.
    #[error("Invalid attempt transition: {from} -> {to}")]
    InvalidAttemptTransition { from: AttemptState, to: AttemptState },

    /// A terminal attempt record was modified.
    #[error("Attempt is terminal ({0}) and cannot be modified")]
    AttemptTerminal(AttemptState),
}
