pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryPaymentStore;
pub use postgres::PostgresPaymentStore;
pub use store::{PaymentStore, PaymentStoreExt};
