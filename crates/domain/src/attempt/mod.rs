//! Controlled payment attempts.

mod record;
mod state;

pub use record::PaymentAttempt;
pub use state::AttemptState;
