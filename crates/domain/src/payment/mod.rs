//! Payment aggregate and its gateway transactions.

mod aggregate;
mod transaction;

pub use aggregate::Payment;
pub use transaction::{PaymentTransaction, TransactionStatus, TransactionType};
