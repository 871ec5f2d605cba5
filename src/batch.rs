//! Batch Loop
//!
//! Pulls bounded windows of eligible units from a [`UnitSource`], runs each one
//! through the [`UnitPipeline`] in selection order and decides when to stop.

use crate::error::AnalyzerError;
use crate::pipeline::{UnitOutcome, UnitPipeline};
use crate::retry::{RetryPolicy, DEFAULT_RETRY_DELAY};
use crate::source::UnitSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::future::ready;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Longest single sleep while waiting between continuous passes.
const STOP_POLL_TICK: Duration = Duration::from_secs(1);

/// Cooperative cancellation flag, checked only at unit, batch and tick
/// boundaries.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns true if this call raised it.
    pub fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    /// Stop requested; finishing the current unit
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    /// Total units to handle this run; 0 means unlimited
    pub limit: usize,
    /// Pause after each unit
    pub pause: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            limit: 0,
            pause: Duration::ZERO,
        }
    }
}

/// Totals for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub committed: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.committed + self.failed
    }

    fn absorb(&mut self, other: RunSummary) {
        self.committed += other.committed;
        self.failed += other.failed;
    }
}

pub struct BatchRunner {
    source: Arc<dyn UnitSource>,
    pipeline: UnitPipeline,
    settings: BatchSettings,
    selection: RetryPolicy,
    stop: StopFlag,
    state: LoopState,
}

impl BatchRunner {
    pub fn new(
        source: Arc<dyn UnitSource>,
        pipeline: UnitPipeline,
        settings: BatchSettings,
        stop: StopFlag,
    ) -> Self {
        Self {
            source,
            pipeline,
            settings,
            selection: RetryPolicy::selection(DEFAULT_RETRY_DELAY),
            stop,
            state: LoopState::Idle,
        }
    }

    pub fn with_selection_policy(mut self, policy: RetryPolicy) -> Self {
        self.selection = policy;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Process up to `size` units. Stops before starting a unit once the stop
    /// flag is raised.
    pub async fn run_batch(&mut self, size: usize) -> Result<RunSummary, AnalyzerError> {
        let source = &self.source;
        let units = self
            .selection
            .run(
                None,
                |_| ready(source.select_batch(size).map_err(AnalyzerError::from)),
                |_, _| {},
            )
            .await?;
        let mut summary = RunSummary::default();
        if units.is_empty() {
            debug!("No eligible units");
            return Ok(summary);
        }

        info!(count = units.len(), "Processing batch");
        self.state = LoopState::Running;

        for unit in &units {
            if self.stop.is_raised() {
                self.state = LoopState::Draining;
                info!(unit_id = unit.id, "Stop requested, not starting unit");
                break;
            }

            let outcome = match self.pipeline.process(unit).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.state = LoopState::Idle;
                    return Err(err);
                }
            };
            match outcome {
                UnitOutcome::Committed { .. } => summary.committed += 1,
                UnitOutcome::Failed { .. } => summary.failed += 1,
            }

            if !self.settings.pause.is_zero() && !self.stop.is_raised() {
                sleep(self.settings.pause).await;
            }
        }

        if self.state == LoopState::Running {
            self.state = LoopState::Idle;
        }
        info!(
            committed = summary.committed,
            failed = summary.failed,
            "Batch finished"
        );
        Ok(summary)
    }

    /// Keep pulling batches until the limit is reached, a batch comes back empty
    /// or the stop flag is raised.
    pub async fn run_until_limit_or_exhausted(&mut self) -> Result<RunSummary, AnalyzerError> {
        let mut total = RunSummary::default();
        let limit = self.settings.limit;

        loop {
            if self.stop.is_raised() {
                break;
            }
            let size = if limit > 0 {
                self.settings.batch_size.min(limit - total.processed())
            } else {
                self.settings.batch_size
            };
            if size == 0 {
                break;
            }

            let summary = self.run_batch(size).await?;
            total.absorb(summary);
            if summary.processed() == 0 {
                break;
            }
            if limit > 0 && total.processed() >= limit {
                info!(limit, "Limit reached");
                break;
            }
        }

        if self.stop.is_raised() {
            self.state = LoopState::Idle;
        }
        Ok(total)
    }

    /// Repeat passes forever, sleeping `interval` between them, until stopped.
    pub async fn run_continuous(&mut self, interval: Duration) -> Result<RunSummary, AnalyzerError> {
        let mut total = RunSummary::default();

        while !self.stop.is_raised() {
            let pass = self.run_until_limit_or_exhausted().await?;
            total.absorb(pass);
            debug!(processed = pass.processed(), "Continuous pass finished");

            if !self.wait(interval).await {
                break;
            }
        }

        warn!(
            committed = total.committed,
            failed = total.failed,
            "Continuous processing stopped"
        );
        Ok(total)
    }

    /// Sleep in ticks of at most a second. Returns false if stopped meanwhile.
    async fn wait(&self, interval: Duration) -> bool {
        let mut remaining = interval;
        while !remaining.is_zero() {
            if self.stop.is_raised() {
                return false;
            }
            let tick = remaining.min(STOP_POLL_TICK);
            sleep(tick).await;
            remaining -= tick;
        }
        !self.stop.is_raised()
    }
}
