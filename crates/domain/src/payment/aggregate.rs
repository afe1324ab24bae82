//! Payment aggregate.

use chrono::{DateTime, Utc};
use common::{AccountId, PaymentId, PaymentMethodId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::DomainError;
use crate::money::{Currency, Money};
use crate::payment::transaction::{PaymentTransaction, TransactionType};

/// A payment and the ordered gateway transactions performed against it.
///
/// Balances are never stored; they are derived from the successful
/// transactions so a replayed record always agrees with its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    account_id: AccountId,
    payment_method_id: PaymentMethodId,
    external_key: String,
    currency: Currency,
    transactions: Vec<PaymentTransaction>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates an empty payment.
    pub fn new(
        id: PaymentId,
        account_id: AccountId,
        payment_method_id: PaymentMethodId,
        external_key: impl Into<String>,
        currency: Currency,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            account_id,
            payment_method_id,
            external_key: external_key.into(),
            currency,
            transactions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a payment from persisted parts.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: PaymentId,
        account_id: AccountId,
        payment_method_id: PaymentMethodId,
        external_key: String,
        currency: Currency,
        transactions: Vec<PaymentTransaction>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_id,
            payment_method_id,
            external_key,
            currency,
            transactions,
            created_at,
            updated_at,
        }
    }

    /// Checks whether an operation may be performed against this payment.
    pub fn check_operation(
        &self,
        account_id: AccountId,
        transaction_type: TransactionType,
        amount: Money,
        currency: Currency,
    ) -> Result<()> {
        if account_id != self.account_id {
            return Err(DomainError::AccountMismatch {
                payment_id: self.id,
                account_id,
            });
        }
        if currency != self.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                actual: currency,
            });
        }

        let not_allowed = |reason: String| DomainError::OperationNotAllowed {
            payment_id: self.id,
            transaction_type,
            reason,
        };

        match transaction_type {
            TransactionType::Authorize | TransactionType::Purchase | TransactionType::Credit => {
                if self.has_successful_initial() {
                    return Err(not_allowed("payment already initiated".to_string()));
                }
            }
            TransactionType::Capture => {
                if self.is_voided() {
                    return Err(not_allowed("payment was voided".to_string()));
                }
                let capturable = self.auth_amount() - self.captured_amount();
                if !capturable.is_positive() {
                    return Err(not_allowed("nothing left to capture".to_string()));
                }
                if amount > capturable {
                    return Err(not_allowed(format!(
                        "amount {amount} exceeds capturable {capturable}"
                    )));
                }
            }
            TransactionType::Refund => {
                let refundable =
                    self.captured_amount() + self.purchased_amount() - self.refunded_amount();
                if amount > refundable {
                    return Err(not_allowed(format!(
                        "amount {amount} exceeds refundable {refundable}"
                    )));
                }
            }
            TransactionType::Void => {
                if !self.auth_amount().is_positive() {
                    return Err(not_allowed("no authorization to void".to_string()));
                }
                if !self.captured_amount().is_zero() {
                    return Err(not_allowed("payment already captured".to_string()));
                }
                if self.is_voided() {
                    return Err(not_allowed("payment already voided".to_string()));
                }
            }
        }

        Ok(())
    }

    /// Appends a transaction.
    ///
    /// A successful initial transaction pins the payment method, so a payment
    /// rerouted to another instrument reports the one actually charged.
    pub fn record_transaction(&mut self, transaction: PaymentTransaction) {
        if transaction.is_success() && transaction.transaction_type.is_initial() {
            self.payment_method_id = transaction.payment_method_id;
        }
        self.updated_at = transaction.created_at;
        self.transactions.push(transaction);
    }

    /// Finds a successful transaction of the given type and external key.
    pub fn find_successful(
        &self,
        transaction_type: TransactionType,
        external_key: &str,
    ) -> Option<&PaymentTransaction> {
        self.transactions.iter().find(|t| {
            t.is_success() && t.transaction_type == transaction_type && t.external_key == external_key
        })
    }

    /// Returns the transaction with the given ID.
    pub fn transaction(&self, id: TransactionId) -> Option<&PaymentTransaction> {
        self.transactions.iter().find(|t| t.id == id)
    }

    fn successful_total(&self, transaction_type: TransactionType) -> Money {
        self.transactions
            .iter()
            .filter(|t| t.is_success() && t.transaction_type == transaction_type)
            .map(|t| t.amount)
            .sum()
    }

    fn has_successful_initial(&self) -> bool {
        self.transactions
            .iter()
            .any(|t| t.is_success() && t.transaction_type.is_initial())
    }

    fn is_voided(&self) -> bool {
        self.transactions
            .iter()
            .any(|t| t.is_success() && t.transaction_type == TransactionType::Void)
    }
}

// Query methods
impl Payment {
    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn payment_method_id(&self) -> PaymentMethodId {
        self.payment_method_id
    }

    pub fn external_key(&self) -> &str {
        &self.external_key
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns the transactions in the order they were recorded.
    pub fn transactions(&self) -> &[PaymentTransaction] {
        &self.transactions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Sum of successful authorizations.
    pub fn auth_amount(&self) -> Money {
        self.successful_total(TransactionType::Authorize)
    }

    /// Sum of successful captures.
    pub fn captured_amount(&self) -> Money {
        self.successful_total(TransactionType::Capture)
    }

    /// Sum of successful purchases.
    pub fn purchased_amount(&self) -> Money {
        self.successful_total(TransactionType::Purchase)
    }

    /// Sum of successful refunds.
    pub fn refunded_amount(&self) -> Money {
        self.successful_total(TransactionType::Refund)
    }

    /// Sum of successful credits.
    pub fn credited_amount(&self) -> Money {
        self.successful_total(TransactionType::Credit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::transaction::TransactionStatus;
    use common::AttemptId;

    fn make_payment(account_id: AccountId) -> Payment {
        Payment::new(
            PaymentId::new(),
            account_id,
            PaymentMethodId::new(),
            "payment-key",
            Currency::Usd,
        )
    }

    fn make_transaction(
        transaction_type: TransactionType,
        cents: i64,
        status: TransactionStatus,
    ) -> PaymentTransaction {
        PaymentTransaction::new(
            None,
            format!("{}-key", transaction_type),
            transaction_type,
            Money::from_cents(cents),
            Currency::Usd,
            PaymentMethodId::new(),
            status,
            None,
            None,
        )
    }

    #[test]
    fn test_new_payment_has_zero_balances() {
        let payment = make_payment(AccountId::new());
        assert!(payment.transactions().is_empty());
        assert!(payment.auth_amount().is_zero());
        assert!(payment.captured_amount().is_zero());
    }

    #[test]
    fn test_balances_only_count_successful_transactions() {
        let mut payment = make_payment(AccountId::new());
        payment.record_transaction(make_transaction(
            TransactionType::Authorize,
            1000,
            TransactionStatus::PaymentFailure,
        ));
        payment.record_transaction(make_transaction(
            TransactionType::Authorize,
            1000,
            TransactionStatus::Success,
        ));
        payment.record_transaction(make_transaction(
            TransactionType::Capture,
            400,
            TransactionStatus::Success,
        ));

        assert_eq!(payment.transactions().len(), 3);
        assert_eq!(payment.auth_amount(), Money::from_cents(1000));
        assert_eq!(payment.captured_amount(), Money::from_cents(400));
    }

    #[test]
    fn test_successful_initial_transaction_pins_payment_method() {
        let mut payment = make_payment(AccountId::new());
        let rerouted = make_transaction(TransactionType::Authorize, 1000, TransactionStatus::Success);
        let rerouted_method = rerouted.payment_method_id;
        payment.record_transaction(rerouted);
        assert_eq!(payment.payment_method_id(), rerouted_method);
    }

    #[test]
    fn test_capture_cannot_exceed_authorization() {
        let account_id = AccountId::new();
        let mut payment = make_payment(account_id);
        payment.record_transaction(make_transaction(
            TransactionType::Authorize,
            1000,
            TransactionStatus::Success,
        ));

        assert!(
            payment
                .check_operation(
                    account_id,
                    TransactionType::Capture,
                    Money::from_cents(1000),
                    Currency::Usd
                )
                .is_ok()
        );
        let result = payment.check_operation(
            account_id,
            TransactionType::Capture,
            Money::from_cents(1001),
            Currency::Usd,
        );
        assert!(matches!(result, Err(DomainError::OperationNotAllowed { .. })));
    }

    #[test]
    fn test_capture_without_authorization_is_rejected() {
        let account_id = AccountId::new();
        let payment = make_payment(account_id);
        let result = payment.check_operation(
            account_id,
            TransactionType::Capture,
            Money::from_cents(100),
            Currency::Usd,
        );
        assert!(matches!(result, Err(DomainError::OperationNotAllowed { .. })));
    }

    #[test]
    fn test_second_authorization_is_rejected_after_success() {
        let account_id = AccountId::new();
        let mut payment = make_payment(account_id);
        payment.record_transaction(make_transaction(
            TransactionType::Authorize,
            1000,
            TransactionStatus::PaymentFailure,
        ));
        assert!(
            payment
                .check_operation(
                    account_id,
                    TransactionType::Authorize,
                    Money::from_cents(1000),
                    Currency::Usd
                )
                .is_ok()
        );

        payment.record_transaction(make_transaction(
            TransactionType::Authorize,
            1000,
            TransactionStatus::Success,
        ));
        assert!(
            payment
                .check_operation(
                    account_id,
                    TransactionType::Authorize,
                    Money::from_cents(1000),
                    Currency::Usd
                )
                .is_err()
        );
    }

    #[test]
    fn test_refund_limited_to_collected_amount() {
        let account_id = AccountId::new();
        let mut payment = make_payment(account_id);
        payment.record_transaction(make_transaction(
            TransactionType::Purchase,
            500,
            TransactionStatus::Success,
        ));
        payment.record_transaction(make_transaction(
            TransactionType::Refund,
            200,
            TransactionStatus::Success,
        ));

        assert!(
            payment
                .check_operation(
                    account_id,
                    TransactionType::Refund,
                    Money::from_cents(300),
                    Currency::Usd
                )
                .is_ok()
        );
        assert!(
            payment
                .check_operation(
                    account_id,
                    TransactionType::Refund,
                    Money::from_cents(301),
                    Currency::Usd
                )
                .is_err()
        );
    }

    #[test]
    fn test_void_blocks_capture() {
        let account_id = AccountId::new();
        let mut payment = make_payment(account_id);
        payment.record_transaction(make_transaction(
            TransactionType::Authorize,
            1000,
            TransactionStatus::Success,
        ));
        payment.record_transaction(make_transaction(
            TransactionType::Void,
            1000,
            TransactionStatus::Success,
        ));

        let result = payment.check_operation(
            account_id,
            TransactionType::Capture,
            Money::from_cents(100),
            Currency::Usd,
        );
        assert!(matches!(result, Err(DomainError::OperationNotAllowed { .. })));
    }

    #[test]
    fn test_account_and_currency_must_match() {
        let account_id = AccountId::new();
        let payment = make_payment(account_id);

        let wrong_account = payment.check_operation(
            AccountId::new(),
            TransactionType::Authorize,
            Money::from_cents(100),
            Currency::Usd,
        );
        assert!(matches!(wrong_account, Err(DomainError::AccountMismatch { .. })));

        let wrong_currency = payment.check_operation(
            account_id,
            TransactionType::Authorize,
            Money::from_cents(100),
            Currency::Eur,
        );
        assert!(matches!(
            wrong_currency,
            Err(DomainError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_find_successful_matches_type_and_key() {
        let mut payment = make_payment(AccountId::new());
        let mut tx = make_transaction(TransactionType::Capture, 100, TransactionStatus::Success);
        tx.attempt_id = Some(AttemptId::new());
        let tx_id = tx.id;
        payment.record_transaction(tx);

        let found = payment
            .find_successful(TransactionType::Capture, "CAPTURE-key")
            .unwrap();
        assert_eq!(found.id, tx_id);
        assert!(payment.find_successful(TransactionType::Refund, "CAPTURE-key").is_none());
        assert!(payment.transaction(tx_id).is_some());
    }
}
