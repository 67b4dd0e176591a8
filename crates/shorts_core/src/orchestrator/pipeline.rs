//! Pipeline controller: runs the four stages in order against the status record.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::collaborator::{Collaborator, StageItem};
use super::errors::{PipelineError, PipelineResult, StageError, StageFailure};
use super::runner::{panic_message, StagePlan, StageResult, StageRunner};
use super::types::{Context, RunSummary, StageSummary};
use crate::dedup::{DedupTracker, Namespace};
use crate::models::{RunOutcome, StageId, StageState, WorkItem};
use crate::sources::SourceRef;
use crate::status::{RunGuard, StageUpdate, StatusStore};
use crate::workspace::{self, WorkspaceReset};

/// The four stage collaborators.
pub struct Collaborators {
    pub acquire: Box<dyn Collaborator<Input = SourceRef>>,
    pub transform: Box<dyn Collaborator<Input = WorkItem>>,
    pub enrich: Box<dyn Collaborator<Input = WorkItem>>,
    pub publish: Box<dyn Collaborator<Input = WorkItem>>,
}

/// Runs `ingest → transform → enrich → publish`.
///
/// Every run ends with the status record finalized: `success` or
/// `partial` when all stages completed, `failed` when a stage halted.
/// Only a status record that cannot be written surfaces as `Err`.
pub struct Controller {
    collaborators: Collaborators,
    status: StatusStore,
    dedup: DedupTracker,
}

type Halt = (StageId, StageError);

impl Controller {
    pub fn new(collaborators: Collaborators, status: StatusStore, dedup: DedupTracker) -> Self {
        Self {
            collaborators,
            status,
            dedup,
        }
    }

    pub fn status(&self) -> &StatusStore {
        &self.status
    }

    pub fn dedup(&self) -> &DedupTracker {
        &self.dedup
    }

    /// Fail if the status record shows a run in progress.
    ///
    /// The controller itself assumes a single run; callers check this first.
    pub fn check_idle(&self) -> PipelineResult<()> {
        let record = self
            .status
            .read()
            .map_err(|e| PipelineError::status("-", e))?;
        if record.run.running {
            return Err(PipelineError::AlreadyRunning {
                stage: record
                    .run
                    .current_stage
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string()),
            });
        }
        Ok(())
    }

    /// Run the pipeline over `sources`.
    pub fn run(&self, ctx: &Context, sources: Vec<SourceRef>) -> PipelineResult<RunSummary> {
        let guard = RunGuard::begin(&self.status, &ctx.run_id)
            .map_err(|e| PipelineError::status(&ctx.run_id, e))?;
        ctx.logger.info(&format!(
            "Run {} started with {} source(s)",
            ctx.run_id,
            sources.len()
        ));

        let mut summary = RunSummary {
            run_id: ctx.run_id.clone(),
            outcome: RunOutcome::Unknown,
            stages: Vec::new(),
            halted: None,
        };

        match self.run_stages(ctx, &guard, sources, &mut summary) {
            Ok(()) => {
                let outcome = if summary.total_failed() > 0 {
                    RunOutcome::Partial
                } else {
                    RunOutcome::Success
                };
                guard
                    .finalize(outcome)
                    .map_err(|e| PipelineError::status(&ctx.run_id, e))?;
                summary.outcome = outcome;
                ctx.logger
                    .success(&format!("Run {} completed ({})", ctx.run_id, outcome));
            }
            Err((stage, error)) => {
                let message = error.to_string();
                ctx.logger
                    .error(&format!("{} halted the run: {}", stage.label(), message));
                summary.halted = Some(StageFailure {
                    stage,
                    class: error.class(),
                    message: message.clone(),
                });
                summary.outcome = RunOutcome::Failed;
                guard
                    .abort(stage, &message)
                    .map_err(|e| PipelineError::status(&ctx.run_id, e))?;
            }
        }

        ctx.logger.flush();
        Ok(summary)
    }

    fn run_stages(
        &self,
        ctx: &Context,
        guard: &RunGuard<'_>,
        sources: Vec<SourceRef>,
        summary: &mut RunSummary,
    ) -> Result<(), Halt> {
        let settings = &ctx.settings.pipeline;
        let at_ingest = |e: StageError| (StageId::Ingest, e);

        if settings.reset_on_start {
            ctx.logger.info("Resetting workspace");
            WorkspaceReset::new(&ctx.layout, &self.status, &self.dedup)
                .reset(settings.reset_clears_dedup)
                .map_err(|e| at_ingest(e.into()))?;
        }
        ctx.layout
            .ensure()
            .map_err(|e| at_ingest(StageError::workspace("create workspace", e)))?;

        // Items an interrupted run left in raw still count as work to do.
        let waiting = if settings.recover_leftovers {
            workspace::discover_items(&ctx.layout.raw())
                .map_err(|e| at_ingest(StageError::workspace("scan raw", e)))?
                .len()
        } else {
            0
        };

        let raw = ctx.layout.stage_output(StageId::Ingest);
        let limit = (settings.max_acquisitions_per_run > 0).then_some(settings.max_acquisitions_per_run);
        let ingest = self
            .execute(
                ctx,
                guard,
                StagePlan {
                    stage: StageId::Ingest,
                    dedup: Some(Namespace::Acquired),
                    output_dir: &raw,
                    limit,
                },
                sources,
                self.collaborators.acquire.as_ref(),
            )
            .map_err(at_ingest)?;

        let ingest_summary = ingest.summary(StageId::Ingest);
        if ingest.succeeded.is_empty() && waiting == 0 {
            let counts = StageUpdate::new(StageState::Running, ingest_summary.message()).counts(
                0,
                ingest_summary.skipped as u64,
                ingest_summary.failed as u64,
            );
            guard
                .apply(StageId::Ingest, counts)
                .map_err(|e| at_ingest(e.into()))?;
            return Err(at_ingest(StageError::NoNewWork {
                skipped: ingest_summary.skipped,
                failed: ingest_summary.failed,
            }));
        }
        self.complete(guard, &ingest_summary).map_err(at_ingest)?;
        summary.stages.push(ingest_summary);

        let mut handed = ingest.succeeded;
        let downstream = [
            (StageId::Transform, self.collaborators.transform.as_ref(), None),
            (StageId::Enrich, self.collaborators.enrich.as_ref(), None),
            (
                StageId::Publish,
                self.collaborators.publish.as_ref(),
                Some(Namespace::Published),
            ),
        ];

        for (stage, collaborator, dedup) in downstream {
            let at_stage = |e: StageError| (stage, e);
            let items = self.with_leftovers(ctx, stage, handed).map_err(at_stage)?;
            let output_dir = ctx.layout.stage_output(stage);

            let result = self
                .execute(
                    ctx,
                    guard,
                    StagePlan {
                        stage,
                        dedup,
                        output_dir: &output_dir,
                        limit: None,
                    },
                    items,
                    collaborator,
                )
                .map_err(at_stage)?;

            let stage_summary = result.summary(stage);
            self.complete(guard, &stage_summary).map_err(at_stage)?;
            summary.stages.push(stage_summary);
            handed = result.succeeded;
        }

        Ok(())
    }

    /// Start a stage, run it, and turn a crash into a stage error.
    fn execute<I: StageItem>(
        &self,
        ctx: &Context,
        guard: &RunGuard<'_>,
        plan: StagePlan<'_>,
        items: Vec<I>,
        collaborator: &dyn Collaborator<Input = I>,
    ) -> Result<StageResult<I>, StageError> {
        guard.start_stage(
            plan.stage,
            &format!("{}: {} item(s)", collaborator.name(), items.len()),
        )?;
        ctx.logger.stage(plan.stage.label());
        ctx.logger.reset_progress();

        let runner = StageRunner::new(ctx, &self.dedup);
        match catch_unwind(AssertUnwindSafe(|| runner.run_stage(plan, items, collaborator))) {
            Ok(result) => result,
            Err(payload) => Err(StageError::Crashed(panic_message(&*payload))),
        }
    }

    /// Record a finished stage as `success` with its tallies.
    fn complete(&self, guard: &RunGuard<'_>, summary: &StageSummary) -> Result<(), StageError> {
        let update = StageUpdate::new(StageState::Success, summary.message()).counts(
            summary.succeeded as u64,
            summary.skipped as u64,
            summary.failed as u64,
        );
        guard.apply(summary.stage, update)?;
        Ok(())
    }

    /// Append items waiting in the stage's input directory that were not handed over.
    fn with_leftovers(
        &self,
        ctx: &Context,
        stage: StageId,
        mut handed: Vec<WorkItem>,
    ) -> Result<Vec<WorkItem>, StageError> {
        if !ctx.settings.pipeline.recover_leftovers {
            return Ok(handed);
        }
        let Some(input_dir) = ctx.layout.stage_input(stage) else {
            return Ok(handed);
        };

        let known: HashSet<_> = handed.iter().map(|item| item.path.clone()).collect();
        let found = workspace::discover_items(&input_dir)
            .map_err(|e| StageError::workspace(format!("scan {}", input_dir.display()), e))?;
        for item in found {
            if !known.contains(&item.path) {
                ctx.logger
                    .info(&format!("Recovered {} left by an earlier run", item.name));
                handed.push(item);
            }
        }
        Ok(handed)
    }
}
