//! Per-unit pipeline: generation → parsing → journaling → persistence, with a
//! terminal failure marker when the unit cannot be analyzed.

use crate::analysis::{AnalysisFields, InputUnit};
use crate::error::AnalyzerError;
use crate::generator::{Generated, GeneratorClient};
use crate::journal::AnalysisJournal;
use crate::parser::ResponseParser;
use crate::retry::{AttemptContext, RetryPolicy, DEFAULT_RETRY_DELAY};
use crate::store::{AnalysisRecord, PresetCounter, ResultStore};
use std::future::ready;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Retry budgets for the three stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicies {
    pub generation: RetryPolicy,
    pub persistence: RetryPolicy,
    pub failure_marking: RetryPolicy,
}

impl RetryPolicies {
    /// Default budgets with the same delay for every stage.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            generation: RetryPolicy::generation(delay),
            persistence: RetryPolicy::persistence(delay),
            failure_marking: RetryPolicy::failure_marking(delay),
        }
    }
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self::with_delay(DEFAULT_RETRY_DELAY)
    }
}

/// How a unit left the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Facts written and the unit recorded as analyzed
    Committed { preset: String },
    /// Unit marked permanently failed
    Failed { kind: &'static str, message: String },
}

struct Answer {
    generated: Generated,
    fields: AnalysisFields,
}

pub struct UnitPipeline {
    generator: GeneratorClient,
    parser: ResponseParser,
    store: Arc<dyn ResultStore>,
    journal: Option<Arc<AnalysisJournal>>,
    policies: RetryPolicies,
}

impl UnitPipeline {
    pub fn new(
        generator: GeneratorClient,
        parser: ResponseParser,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            generator,
            parser,
            store,
            journal: None,
            policies: RetryPolicies::default(),
        }
    }

    pub fn with_journal(mut self, journal: Option<Arc<AnalysisJournal>>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_policies(mut self, policies: RetryPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Drive one unit to a terminal state. `Err` means a fatal fault that should
    /// abort the run; classified failures come back as `UnitOutcome::Failed`.
    pub async fn process(&self, unit: &InputUnit) -> Result<UnitOutcome, AnalyzerError> {
        info!(unit_id = unit.id, "Analyzing unit");

        let mut last_preset = self.generator.preset().to_string();
        let answer = self
            .policies
            .generation
            .run(
                Some(unit.id),
                |context| self.generate(unit, context),
                |context, _| {
                    last_preset = self.generator.preset_for(context).to_string();
                    self.bump(&last_preset, PresetCounter::RetryError);
                },
            )
            .await;

        let answer = match answer {
            Ok(answer) => answer,
            Err(err) if err.is_classified() => return self.fail_unit(unit, &last_preset, err).await,
            Err(err) => return Err(err),
        };

        let record = AnalysisRecord {
            unit_id: unit.id,
            schema: self.parser.schema(),
            fields: &answer.fields,
            preset: &answer.generated.preset,
            model: &answer.generated.model,
        };
        let persisted = self
            .policies
            .persistence
            .run(
                Some(unit.id),
                |_| ready(self.store.persist(&record).map_err(AnalyzerError::from)),
                |_, _| {},
            )
            .await;

        match persisted {
            Ok(()) => {
                self.bump(&answer.generated.preset, PresetCounter::Success);
                Ok(UnitOutcome::Committed {
                    preset: answer.generated.preset,
                })
            }
            Err(err) if err.is_classified() => {
                self.fail_unit(unit, &answer.generated.preset, err).await
            }
            Err(err) => Err(err),
        }
    }

    async fn generate(
        &self,
        unit: &InputUnit,
        context: AttemptContext,
    ) -> Result<Answer, AnalyzerError> {
        let generated = self.generator.invoke(unit.id, &unit.body, &context).await?;
        let fields = self.parser.parse(&generated.response)?;
        if let Some(journal) = &self.journal {
            journal.record(unit.id, self.parser.schema(), &unit.body, &fields)?;
        }
        Ok(Answer { generated, fields })
    }

    async fn fail_unit(
        &self,
        unit: &InputUnit,
        preset: &str,
        cause: AnalyzerError,
    ) -> Result<UnitOutcome, AnalyzerError> {
        error!(
            unit_id = unit.id,
            preset,
            kind = cause.kind(),
            error = %cause,
            "Unit failed analysis permanently"
        );

        self.policies
            .failure_marking
            .run(
                Some(unit.id),
                |_| ready(self.store.mark_failed(unit.id).map_err(AnalyzerError::from)),
                |_, _| {},
            )
            .await?;
        self.bump(preset, PresetCounter::Failure);

        Ok(UnitOutcome::Failed {
            kind: cause.kind(),
            message: cause.to_string(),
        })
    }

    /// Counters are bookkeeping; a failed increment never affects the unit.
    fn bump(&self, preset: &str, counter: PresetCounter) {
        if let Err(err) = self.store.increment(preset, counter) {
            warn!(preset, counter = counter.column(), error = %err, "Failed to update preset stats");
        }
    }
}
