//! Requested payment operations.

use common::{AccountId, PaymentId, PaymentMethodId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;
use crate::error::DomainError;
use crate::money::{Currency, Money};
use crate::payment::TransactionType;
use crate::property::PluginProperty;

/// One operation requested by a caller, before any plugin adjusts it.
///
/// Initial operations (authorize, purchase, credit) open a new payment and
/// need a payment method; follow-up operations (capture, refund, void)
/// target an existing payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub account_id: AccountId,
    pub transaction_type: TransactionType,
    pub payment_id: Option<PaymentId>,
    pub payment_method_id: Option<PaymentMethodId>,
    pub amount: Money,
    pub currency: Currency,
    pub payment_external_key: String,
    pub transaction_external_key: String,
    pub properties: Vec<PluginProperty>,
}

impl PaymentRequest {
    fn new(
        account_id: AccountId,
        transaction_type: TransactionType,
        payment_id: Option<PaymentId>,
        payment_method_id: Option<PaymentMethodId>,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Self {
            account_id,
            transaction_type,
            payment_id,
            payment_method_id,
            amount,
            currency,
            payment_external_key: Uuid::new_v4().to_string(),
            transaction_external_key: Uuid::new_v4().to_string(),
            properties: Vec::new(),
        }
    }

    /// Requests an authorization on a new payment.
    pub fn authorize(
        account_id: AccountId,
        payment_method_id: PaymentMethodId,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Self::new(
            account_id,
            TransactionType::Authorize,
            None,
            Some(payment_method_id),
            amount,
            currency,
        )
    }

    /// Requests an auth+capture in one step on a new payment.
    pub fn purchase(
        account_id: AccountId,
        payment_method_id: PaymentMethodId,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Self::new(
            account_id,
            TransactionType::Purchase,
            None,
            Some(payment_method_id),
            amount,
            currency,
        )
    }

    /// Requests a credit to the account's payment method on a new payment.
    pub fn credit(
        account_id: AccountId,
        payment_method_id: PaymentMethodId,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Self::new(
            account_id,
            TransactionType::Credit,
            None,
            Some(payment_method_id),
            amount,
            currency,
        )
    }

    /// Requests a capture against an authorized payment.
    pub fn capture(
        account_id: AccountId,
        payment_id: PaymentId,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Self::new(
            account_id,
            TransactionType::Capture,
            Some(payment_id),
            None,
            amount,
            currency,
        )
    }

    /// Requests a refund against a captured or purchased payment.
    pub fn refund(
        account_id: AccountId,
        payment_id: PaymentId,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Self::new(
            account_id,
            TransactionType::Refund,
            Some(payment_id),
            None,
            amount,
            currency,
        )
    }

    /// Requests a void of an uncaptured authorization.
    pub fn void(
        account_id: AccountId,
        payment_id: PaymentId,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Self::new(
            account_id,
            TransactionType::Void,
            Some(payment_id),
            None,
            amount,
            currency,
        )
    }

    pub fn with_payment_external_key(mut self, key: impl Into<String>) -> Self {
        self.payment_external_key = key.into();
        self
    }

    pub fn with_transaction_external_key(mut self, key: impl Into<String>) -> Self {
        self.transaction_external_key = key.into();
        self
    }

    pub fn with_properties(mut self, properties: Vec<PluginProperty>) -> Self {
        self.properties = properties;
        self
    }

    /// Validates the request shape without looking at any stored payment.
    pub fn validate(&self) -> Result<()> {
        if self.account_id.is_nil() {
            return Err(DomainError::AccountIdRequired);
        }
        if !self.amount.is_valid_charge() {
            return Err(DomainError::InvalidAmount {
                amount: self.amount,
            });
        }
        if self.transaction_type.is_initial() {
            if self.payment_method_id.is_none() {
                return Err(DomainError::PaymentMethodRequired {
                    transaction_type: self.transaction_type,
                });
            }
        } else if self.payment_id.is_none() {
            return Err(DomainError::PaymentIdRequired {
                transaction_type: self.transaction_type,
            });
        }
        Ok(())
    }
}
