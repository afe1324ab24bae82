//! Shared identifier types used across the payment control crates.

pub mod ids;

pub use ids::{AccountId, AttemptId, PaymentId, PaymentMethodId, TransactionId};
