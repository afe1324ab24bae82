//! Delayed re-attempt scheduling.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use common::AttemptId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors raised by the retry scheduler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// A re-attempt is already pending for this attempt.
    #[error("Retry already scheduled for attempt {0}")]
    AlreadyScheduled(AttemptId),

    /// The pending re-attempt was cancelled before it was due.
    #[error("Retry cancelled for attempt {0}")]
    Cancelled(AttemptId),
}

/// Bounds applied to every attempt's retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total passes allowed per attempt, the first one included.
    pub max_attempts: u32,
    /// Requested delays above this are clamped.
    pub max_delay: Duration,
}

/// Identifies one scheduled re-attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetryTicket {
    pub attempt_id: AttemptId,
    sequence: u64,
}

/// Handle to a scheduled re-attempt.
#[derive(Debug)]
pub struct RetryHandle {
    ticket: RetryTicket,
    delay: Duration,
    due: oneshot::Receiver<()>,
}

impl RetryHandle {
    pub fn ticket(&self) -> RetryTicket {
        self.ticket
    }

    /// The delay actually applied after clamping.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits until the re-attempt is due.
    ///
    /// Returns `Cancelled` if the retry was cancelled first.
    pub async fn wait(self) -> Result<(), SchedulerError> {
        let attempt_id = self.ticket.attempt_id;
        self.due
            .await
            .map_err(|_| SchedulerError::Cancelled(attempt_id))
    }
}

struct PendingRetry {
    sequence: u64,
    cancel: oneshot::Sender<()>,
}

/// Schedules at most one pending re-attempt per attempt.
///
/// Each pending retry runs on its own task that races the delay against a
/// cancellation channel. The delay is a lower bound.
pub struct RetryScheduler {
    policy: RetryPolicy,
    pending: Arc<DashMap<AttemptId, PendingRetry>>,
    next_sequence: AtomicU64,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            pending: Arc::new(DashMap::new()),
            next_sequence: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Returns true once an attempt has used every pass it is allowed.
    pub fn budget_exhausted(&self, sub_attempts: u32) -> bool {
        sub_attempts >= self.policy.max_attempts
    }

    /// Schedules a re-attempt after `delay`, clamped to the policy maximum.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_retry(
        &self,
        attempt_id: AttemptId,
        delay: Duration,
    ) -> Result<RetryHandle, SchedulerError> {
        let delay = delay.min(self.policy.max_delay);
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (due_tx, due_rx) = oneshot::channel();

        match self.pending.entry(attempt_id) {
            Entry::Occupied(_) => return Err(SchedulerError::AlreadyScheduled(attempt_id)),
            Entry::Vacant(entry) => {
                entry.insert(PendingRetry {
                    sequence,
                    cancel: cancel_tx,
                });
            }
        }

        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    // Only fire if no cancellation claimed the entry first.
                    if pending
                        .remove_if(&attempt_id, |_, p| p.sequence == sequence)
                        .is_some()
                    {
                        let _ = due_tx.send(());
                    }
                }
                _ = cancel_rx => {
                    tracing::debug!(%attempt_id, "pending retry cancelled");
                }
            }
        });

        metrics::counter!("payment_control_retries_total").increment(1);
        tracing::info!(%attempt_id, delay_ms = delay.as_millis() as u64, "retry scheduled");

        Ok(RetryHandle {
            ticket: RetryTicket {
                attempt_id,
                sequence,
            },
            delay,
            due: due_rx,
        })
    }

    /// Cancels the retry identified by `ticket`, if it is still pending.
    pub fn cancel(&self, ticket: RetryTicket) -> bool {
        match self
            .pending
            .remove_if(&ticket.attempt_id, |_, p| p.sequence == ticket.sequence)
        {
            Some((_, retry)) => {
                let _ = retry.cancel.send(());
                true
            }
            None => false,
        }
    }

    /// Cancels whatever retry is pending for `attempt_id`.
    pub fn cancel_attempt(&self, attempt_id: AttemptId) -> bool {
        match self.pending.remove(&attempt_id) {
            Some((_, retry)) => {
                let _ = retry.cancel.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, attempt_id: AttemptId) -> bool {
        self.pending.contains_key(&attempt_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
