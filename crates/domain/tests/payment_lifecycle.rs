//! Integration tests for the payment and attempt model.

use common::{AccountId, AttemptId, PaymentId, PaymentMethodId};
use domain::{
    AttemptState, Currency, DomainError, Money, Payment, PaymentAttempt, PaymentRequest,
    PaymentTransaction, TransactionStatus, TransactionType,
};

fn transaction(
    attempt_id: Option<AttemptId>,
    transaction_type: TransactionType,
    units: i64,
    status: TransactionStatus,
) -> PaymentTransaction {
    PaymentTransaction::new(
        attempt_id,
        format!("{transaction_type}-{units}"),
        transaction_type,
        Money::from_units(units),
        Currency::Usd,
        PaymentMethodId::new(),
        status,
        Some("GW-0001".to_string()),
        None,
    )
}

#[test]
fn test_authorize_capture_refund_lifecycle() {
    let account_id = AccountId::new();
    let mut payment = Payment::new(
        PaymentId::new(),
        account_id,
        PaymentMethodId::new(),
        "order-1",
        Currency::Usd,
    );

    payment
        .check_operation(
            account_id,
            TransactionType::Authorize,
            Money::from_units(10),
            Currency::Usd,
        )
        .unwrap();
    payment.record_transaction(transaction(
        None,
        TransactionType::Authorize,
        10,
        TransactionStatus::Success,
    ));

    payment
        .check_operation(
            account_id,
            TransactionType::Capture,
            Money::from_units(6),
            Currency::Usd,
        )
        .unwrap();
    payment.record_transaction(transaction(
        Some(AttemptId::new()),
        TransactionType::Capture,
        6,
        TransactionStatus::Success,
    ));

    // Only the remaining 4 may still be captured.
    let over = payment.check_operation(
        account_id,
        TransactionType::Capture,
        Money::from_units(5),
        Currency::Usd,
    );
    assert!(matches!(over, Err(DomainError::OperationNotAllowed { .. })));

    payment
        .check_operation(
            account_id,
            TransactionType::Refund,
            Money::from_units(6),
            Currency::Usd,
        )
        .unwrap();
    payment.record_transaction(transaction(
        None,
        TransactionType::Refund,
        6,
        TransactionStatus::Success,
    ));

    assert_eq!(payment.auth_amount(), Money::from_units(10));
    assert_eq!(payment.captured_amount(), Money::from_units(6));
    assert_eq!(payment.refunded_amount(), Money::from_units(6));
    assert_eq!(payment.transactions().len(), 3);
}

#[test]
fn test_failed_transactions_do_not_move_balances() {
    let account_id = AccountId::new();
    let mut payment = Payment::new(
        PaymentId::new(),
        account_id,
        PaymentMethodId::new(),
        "order-2",
        Currency::Usd,
    );
    payment.record_transaction(transaction(
        Some(AttemptId::new()),
        TransactionType::Authorize,
        10,
        TransactionStatus::PaymentFailure,
    ));
    payment.record_transaction(transaction(
        Some(AttemptId::new()),
        TransactionType::Authorize,
        10,
        TransactionStatus::GatewayError,
    ));

    assert_eq!(payment.auth_amount(), Money::zero());
    // A failed initial transaction does not block another authorization.
    payment
        .check_operation(
            account_id,
            TransactionType::Authorize,
            Money::from_units(10),
            Currency::Usd,
        )
        .unwrap();
}

#[test]
fn test_attempt_retry_cycle() {
    let request = PaymentRequest::purchase(
        AccountId::new(),
        PaymentMethodId::new(),
        Money::from_units(25),
        Currency::Eur,
    );
    let mut attempt = PaymentAttempt::new(AttemptId::new(), &request, vec!["retry".to_string()]);

    for _ in 0..2 {
        attempt.begin_pass().unwrap();
        attempt.transition_to(AttemptState::GatewaySubmit).unwrap();
        attempt.transition_to(AttemptState::FailureCallback).unwrap();
        attempt.transition_to(AttemptState::RetryScheduled).unwrap();
    }
    attempt.begin_pass().unwrap();
    attempt.transition_to(AttemptState::GatewaySubmit).unwrap();
    attempt.transition_to(AttemptState::SuccessCallback).unwrap();
    attempt.transition_to(AttemptState::Completed).unwrap();

    assert_eq!(attempt.sub_attempts, 3);
    assert!(attempt.is_terminal());
    assert!(matches!(
        attempt.abort("too late"),
        Err(DomainError::InvalidAttemptTransition { .. })
    ));
}

#[test]
fn test_follow_up_requests_need_payment() {
    let mut request = PaymentRequest::refund(
        AccountId::new(),
        PaymentId::new(),
        Money::from_units(5),
        Currency::Usd,
    );
    request.validate().unwrap();

    request.payment_id = None;
    assert!(matches!(
        request.validate(),
        Err(DomainError::PaymentIdRequired { .. })
    ));
}
