//! Control plugin orchestration around payment gateway transactions.
//!
//! A [`PaymentProcessor`] runs every controlled operation through an ordered
//! chain of [`ControlPlugin`]s that may abort or adjust it before the gateway
//! call, and observe or schedule a retry after it. Direct operations bypass
//! the chain and are recorded without an attempt id.

pub mod chain;
pub mod config;
pub mod error;
pub mod gateway;
pub mod locks;
pub mod plugin;
pub mod processor;
pub mod registry;
pub mod retry;

pub use chain::{
    Adjusted, ControlChain, FailureOutcome, PluginCallbackError, PriorOutcome, SuccessOutcome,
};
pub use config::ControlConfig;
pub use error::{ControlError, Result};
pub use gateway::{
    GatewayError, GatewayOutcome, GatewayRequest, GatewayStatus, InMemoryGateway, PaymentGateway,
    ScriptedResponse,
};
pub use locks::{PaymentLockGuard, PaymentLocks};
pub use plugin::{
    ControlContext, ControlPlugin, ControlPluginError, FailureResult, PriorResult, SuccessResult,
};
pub use processor::{PaymentOptions, PaymentProcessor};
pub use registry::PluginRegistry;
pub use retry::{RetryHandle, RetryPolicy, RetryScheduler, RetryTicket, SchedulerError};
