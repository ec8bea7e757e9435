//! Per-visit execution state.

use std::time::Duration;

use uuid::Uuid;

use crate::params::Params;

/// State scoped to a single visit of a node by an interpreter.
///
/// Each visit gets a fresh context, so the parameter map and the retry counter
/// never leak between visits or between concurrent traversals of the same
/// node. Node objects themselves stay immutable while a flow runs.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    params: Params,
    attempt: usize,
    max_attempts: usize,
    retry_delay: Duration,
    visit_id: Uuid,
}

impl ExecutionContext {
    pub(crate) fn new(params: Params, max_attempts: usize, retry_delay: Duration) -> Self {
        Self {
            params,
            attempt: 0,
            max_attempts,
            retry_delay,
            visit_id: Uuid::new_v4(),
        }
    }

    /// Parameters handed down by the enclosing flow for this visit.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Current attempt, 0-based. Readable from `exec` so a node can change
    /// behavior on retry.
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Whether the current attempt is the final one before the fallback runs.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt + 1 >= self.max_attempts
    }

    /// Unique id of this visit, for correlation in logs.
    pub fn visit_id(&self) -> Uuid {
        self.visit_id
    }

    pub(crate) fn advance_attempt(&mut self) {
        self.attempt += 1;
    }

    pub(crate) fn reset_attempts(&mut self) {
        self.attempt = 0;
    }

    /// Copy of this context with a zeroed attempt counter, for per-item retry
    /// accounting in batch execution.
    pub(crate) fn fork(&self) -> Self {
        let mut forked = self.clone();
        forked.reset_attempts();
        forked
    }
}
