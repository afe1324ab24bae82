//! Attempt state machine.

use serde::{Deserialize, Serialize};

/// The state of a controlled attempt in its lifecycle.
///
/// State transitions:
/// ```text
/// Init ──► PriorEvaluation ──► GatewaySubmit ──┬──► SuccessCallback ──► Completed
///  │            │  ▲                           └──► FailureCallback ──┬──► Aborted
///  │            │  └──────────────── RetryScheduled ◄──────────────────┘
///  └────────────┴──► Aborted                  │
///                                             └──► Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptState {
    /// Request validated and attempt record created.
    #[default]
    Init,

    /// Prior-call plugins are being evaluated.
    PriorEvaluation,

    /// The adjusted request is being submitted to the gateway.
    GatewaySubmit,

    /// Success callbacks are running.
    SuccessCallback,

    /// Failure callbacks are running.
    FailureCallback,

    /// A re-attempt is waiting for its dispatch time.
    RetryScheduled,

    /// The attempt produced a successful transaction (terminal state).
    Completed,

    /// The attempt ended without success (terminal state).
    Aborted,
}

impl AttemptState {
    /// Returns true if the attempt may move from this state to `next`.
    pub fn can_transition_to(&self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Init, PriorEvaluation)
                | (Init, Aborted)
                | (PriorEvaluation, GatewaySubmit)
                | (PriorEvaluation, Aborted)
                | (GatewaySubmit, SuccessCallback)
                | (GatewaySubmit, FailureCallback)
                | (SuccessCallback, Completed)
                | (FailureCallback, RetryScheduled)
                | (FailureCallback, Aborted)
                | (RetryScheduled, PriorEvaluation)
                | (RetryScheduled, Aborted)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Completed | AttemptState::Aborted)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::Init => "INIT",
            AttemptState::PriorEvaluation => "PRIOR_EVALUATION",
            AttemptState::GatewaySubmit => "GATEWAY_SUBMIT",
            AttemptState::SuccessCallback => "SUCCESS_CALLBACK",
            AttemptState::FailureCallback => "FAILURE_CALLBACK",
            AttemptState::RetryScheduled => "RETRY_SCHEDULED",
            AttemptState::Completed => "COMPLETED",
            AttemptState::Aborted => "ABORTED",
        }
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AttemptState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(AttemptState::Init),
            "PRIOR_EVALUATION" => Ok(AttemptState::PriorEvaluation),
            "GATEWAY_SUBMIT" => Ok(AttemptState::GatewaySubmit),
            "SUCCESS_CALLBACK" => Ok(AttemptState::SuccessCallback),
            "FAILURE_CALLBACK" => Ok(AttemptState::FailureCallback),
            "RETRY_SCHEDULED" => Ok(AttemptState::RetryScheduled),
            "COMPLETED" => Ok(AttemptState::Completed),
            "ABORTED" => Ok(AttemptState::Aborted),
            other => Err(format!("unknown attempt state: {other}")),
        }
    }
}
