//! Domain layer for the payment control system.
//!
//! This crate provides the records the orchestrator produces and persists:
//! - Money and Currency value objects
//! - Payment aggregate with its ordered gateway transactions
//! - PaymentAttempt record with its lifecycle state machine
//! - PaymentRequest describing one requested operation

pub mod attempt;
pub mod error;
pub mod money;
pub mod payment;
pub mod property;
pub mod request;

pub use attempt::{AttemptState, PaymentAttempt};
pub use error::DomainError;
pub use money::{Currency, Money};
pub use payment::{Payment, PaymentTransaction, TransactionStatus, TransactionType};
pub use property::PluginProperty;
pub use request::PaymentRequest;

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;
