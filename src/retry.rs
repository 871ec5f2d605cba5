//! Retry Controller
//!
//! Bounded retry per pipeline stage. Each stage has its own attempt budget, a
//! fixed delay between attempts and its own idea of which errors are worth
//! another try.

use crate::error::{AnalyzerError, ErrorClass};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

pub const GENERATION_ATTEMPTS: u32 = 5;
pub const PERSISTENCE_ATTEMPTS: u32 = 3;
pub const FAILURE_MARK_ATTEMPTS: u32 = 3;
pub const SELECTION_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Failures seen so far for one unit in one stage. Starts at zero per unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptContext {
    pub consecutive_failures: u32,
}

impl AttemptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Generate, parse and journal one answer
    Generation,
    /// Write the unit's facts
    Persistence,
    /// Record a terminal failure marker
    FailureMarking,
    /// Read the next window of eligible units
    Selection,
}

impl Stage {
    pub fn is_retryable(self, error: &AnalyzerError) -> bool {
        match self {
            Stage::Generation => error.class() == ErrorClass::Classified,
            Stage::Persistence | Stage::FailureMarking | Stage::Selection => {
                error.class() == ErrorClass::Storage
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Generation => "generation",
            Stage::Persistence => "persistence",
            Stage::FailureMarking => "failure_marking",
            Stage::Selection => "selection",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub stage: Stage,
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(stage: Stage, max_attempts: u32, delay: Duration) -> Self {
        Self {
            stage,
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn generation(delay: Duration) -> Self {
        Self::new(Stage::Generation, GENERATION_ATTEMPTS, delay)
    }

    pub fn persistence(delay: Duration) -> Self {
        Self::new(Stage::Persistence, PERSISTENCE_ATTEMPTS, delay)
    }

    pub fn failure_marking(delay: Duration) -> Self {
        Self::new(Stage::FailureMarking, FAILURE_MARK_ATTEMPTS, delay)
    }

    pub fn selection(delay: Duration) -> Self {
        Self::new(Stage::Selection, SELECTION_ATTEMPTS, delay)
    }

    /// Run `op` until it succeeds, fails with an error this stage does not retry,
    /// or the attempt budget is spent. `on_retryable` sees each retryable failure
    /// together with the context of the attempt that produced it. `unit_id` is
    /// `None` for stages that are not about a single unit.
    pub async fn run<T, F, Fut, H>(
        &self,
        unit_id: Option<i64>,
        mut op: F,
        mut on_retryable: H,
    ) -> Result<T, AnalyzerError>
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, AnalyzerError>>,
        H: FnMut(&AttemptContext, &AnalyzerError),
    {
        let mut context = AttemptContext::new();
        let mut attempt = 1;

        loop {
            debug!(unit_id, stage = %self.stage, attempt, "Stage attempt");
            let error = match op(context).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !self.stage.is_retryable(&error) {
                debug!(unit_id, stage = %self.stage, error = %error, "Error is not retryable in this stage");
                return Err(error);
            }

            on_retryable(&context, &error);
            context.record_failure();

            if attempt >= self.max_attempts {
                warn!(
                    unit_id,
                    stage = %self.stage,
                    attempts = attempt,
                    error = %error,
                    "Retry budget exhausted"
                );
                return Err(error);
            }

            warn!(
                unit_id,
                stage = %self.stage,
                attempt,
                max_attempts = self.max_attempts,
                error = %error,
                "Attempt failed, retrying"
            );
            attempt += 1;
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
        }
    }
}
