//! Runs one stage over its items.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use super::collaborator::{Collaborator, StageItem};
use super::errors::{CollaboratorError, StageError};
use super::types::{Context, StageSummary};
use crate::dedup::{DedupTracker, Namespace};
use crate::models::{StageId, WorkItem};
use crate::workspace;

/// Outcome of one stage, item by item.
#[derive(Debug)]
pub struct StageResult<I> {
    /// Produced items, already relocated to the stage's output directory.
    pub succeeded: Vec<WorkItem>,
    /// Items already handled by an earlier run (no collaborator call).
    pub skipped: Vec<I>,
    /// Items whose collaborator call failed.
    pub failed: Vec<(I, CollaboratorError)>,
    /// Items left for a later run because the per-run limit was reached.
    pub deferred: Vec<I>,
}

impl<I> Default for StageResult<I> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            deferred: Vec::new(),
        }
    }
}

impl<I: StageItem> StageResult<I> {
    pub fn summary(&self, stage: StageId) -> StageSummary {
        StageSummary {
            stage,
            succeeded: self.succeeded.len(),
            skipped: self.skipped.len(),
            failed: self.failed.len(),
            deferred: self.deferred.len(),
            failures: self
                .failed
                .iter()
                .map(|(item, error)| (item.item_name().to_string(), error.to_string()))
                .collect(),
        }
    }
}

/// How to run a stage.
#[derive(Debug, Clone, Copy)]
pub struct StagePlan<'p> {
    pub stage: StageId,
    /// Namespace checked before and marked after each item.
    pub dedup: Option<Namespace>,
    /// Where succeeded items are relocated to.
    pub output_dir: &'p Path,
    /// Maximum number of successes; further new items are deferred.
    pub limit: Option<usize>,
}

/// Drives a collaborator over a stage's items.
///
/// Per-item failures (including panics) are absorbed into the result.
/// Only dedup and workspace write failures end the stage early.
pub struct StageRunner<'a> {
    ctx: &'a Context,
    dedup: &'a DedupTracker,
}

impl<'a> StageRunner<'a> {
    pub fn new(ctx: &'a Context, dedup: &'a DedupTracker) -> Self {
        Self { ctx, dedup }
    }

    /// Process `items` in lexicographic order of their names.
    pub fn run_stage<I: StageItem>(
        &self,
        plan: StagePlan<'_>,
        mut items: Vec<I>,
        collaborator: &dyn Collaborator<Input = I>,
    ) -> Result<StageResult<I>, StageError> {
        let logger = &self.ctx.logger;
        items.sort_by(|a, b| a.item_name().cmp(b.item_name()));

        let total = items.len();
        let mut result = StageResult::default();

        for (index, item) in items.into_iter().enumerate() {
            let name = item.item_name().to_string();

            let fingerprint = match plan.dedup {
                Some(namespace) => match self.dedup.compute_fingerprint(&item) {
                    Ok(fp) if self.dedup.is_known(namespace, &fp) => {
                        logger.skip(&format!("{} (already {})", name, namespace));
                        result.skipped.push(item);
                        continue;
                    }
                    Ok(fp) => Some((namespace, fp)),
                    Err(e) => {
                        logger.warn(&format!("{}: {}", name, e));
                        result
                            .failed
                            .push((item, CollaboratorError::other(e.to_string())));
                        continue;
                    }
                },
                None => None,
            };

            if plan.limit.is_some_and(|limit| result.succeeded.len() >= limit) {
                logger.debug(&format!("Deferring {} (limit reached)", name));
                result.deferred.push(item);
                continue;
            }

            logger.item(&name);
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                collaborator.process(self.ctx, &item)
            }))
            .unwrap_or_else(|payload| Err(CollaboratorError::Panicked(panic_message(&*payload))));

            match outcome {
                Ok(produced) => {
                    if let Some((namespace, fp)) = &fingerprint {
                        self.dedup
                            .mark(*namespace, fp, produced.remote_id.as_deref())?;
                    }

                    let handed = workspace::relocate(&produced, plan.output_dir)
                        .map_err(|e| StageError::workspace(format!("relocate {}", produced.name), e))?;

                    if let Err(e) = collaborator.release_input(self.ctx, &item) {
                        logger.warn(&format!("Could not release input {}: {}", name, e));
                    }

                    logger.success(&format!("{}: {}", collaborator.name(), handed.name));
                    result.succeeded.push(handed);
                }
                Err(error) => {
                    logger.error(&format!("{}: {}", name, error));
                    logger.show_tail(collaborator.name());
                    logger.clear_tail();
                    result.failed.push((item, error));
                }
            }

            let percent = (((index + 1) * 100) / total.max(1)) as u32;
            logger.progress(percent);
        }

        Ok(result)
    }
}

/// Text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::Fingerprint;
    use crate::orchestrator::testing::{source, FakeAcquirer, FakeTransformer, TestBed};
    use crate::orchestrator::FailureKind;
    use std::fs;
    use std::time::Duration;

    #[test]
    fn known_sources_are_skipped_without_a_call() {
        let bed = TestBed::new();
        bed.dedup
            .mark(Namespace::Acquired, &Fingerprint::from("2"), None)
            .unwrap();
        let acquirer = FakeAcquirer::new();
        let raw = bed.ctx.layout.raw();

        let result = StageRunner::new(&bed.ctx, &bed.dedup)
            .run_stage(
                StagePlan {
                    stage: StageId::Ingest,
                    dedup: Some(Namespace::Acquired),
                    output_dir: &raw,
                    limit: None,
                },
                vec![source("3"), source("1"), source("2")],
                &acquirer,
            )
            .unwrap();

        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.succeeded.len(), 2);
        assert_eq!(acquirer.calls(), vec!["1", "3"]);
    }

    #[test]
    fn successes_are_marked_then_relocated() {
        let bed = TestBed::new();
        let acquirer = FakeAcquirer::new();
        let raw = bed.ctx.layout.raw();

        let result = StageRunner::new(&bed.ctx, &bed.dedup)
            .run_stage(
                StagePlan {
                    stage: StageId::Ingest,
                    dedup: Some(Namespace::Acquired),
                    output_dir: &raw,
                    limit: None,
                },
                vec![source("7")],
                &acquirer,
            )
            .unwrap();

        assert!(bed.dedup.is_known(Namespace::Acquired, &Fingerprint::from("7")));
        assert_eq!(result.succeeded[0].path, raw.join("7.mp4"));
        assert!(raw.join("7.mp4").exists());
        assert!(!bed.ctx.layout.incoming().join("7.mp4").exists());
    }

    #[test]
    fn failures_and_panics_stay_per_item() {
        let bed = TestBed::new();
        let acquirer = FakeAcquirer::new().failing("1").panicking("2");
        let raw = bed.ctx.layout.raw();

        let result = StageRunner::new(&bed.ctx, &bed.dedup)
            .run_stage(
                StagePlan {
                    stage: StageId::Ingest,
                    dedup: Some(Namespace::Acquired),
                    output_dir: &raw,
                    limit: None,
                },
                vec![source("1"), source("2"), source("3")],
                &acquirer,
            )
            .unwrap();

        assert_eq!(result.succeeded.len(), 1);
        assert_eq!(result.failed.len(), 2);
        assert!(matches!(result.failed[1].1, CollaboratorError::Panicked(_)));
        assert!(!bed.dedup.is_known(Namespace::Acquired, &Fingerprint::from("1")));
        assert_eq!(acquirer.calls().len(), 3);
    }

    #[test]
    fn timeouts_fail_the_item_and_the_stage_moves_on() {
        let bed = TestBed::new();
        let acquirer = FakeAcquirer::new()
            .failing_with("1", |_| CollaboratorError::timeout("yt-dlp", Duration::from_secs(600)));
        let raw = bed.ctx.layout.raw();

        let result = StageRunner::new(&bed.ctx, &bed.dedup)
            .run_stage(
                StagePlan {
                    stage: StageId::Ingest,
                    dedup: Some(Namespace::Acquired),
                    output_dir: &raw,
                    limit: None,
                },
                vec![source("1"), source("2")],
                &acquirer,
            )
            .unwrap();

        assert_eq!(acquirer.calls(), vec!["1", "2"]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0.id, "1");
        assert_eq!(result.failed[0].1.kind(), FailureKind::Timeout);
        assert_eq!(result.succeeded.len(), 1);
        assert!(raw.join("2.mp4").exists());
        assert!(!bed.dedup.is_known(Namespace::Acquired, &Fingerprint::from("1")));
    }

    #[test]
    fn already_acquired_fails_the_item_without_marking() {
        let bed = TestBed::new();
        let acquirer = FakeAcquirer::new()
            .failing_with("4", |id| CollaboratorError::AlreadyAcquired(id.to_string()));
        let raw = bed.ctx.layout.raw();

        let result = StageRunner::new(&bed.ctx, &bed.dedup)
            .run_stage(
                StagePlan {
                    stage: StageId::Ingest,
                    dedup: Some(Namespace::Acquired),
                    output_dir: &raw,
                    limit: None,
                },
                vec![source("4"), source("5")],
                &acquirer,
            )
            .unwrap();

        assert_eq!(acquirer.calls(), vec!["4", "5"]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].1.kind(), FailureKind::AlreadyAcquired);
        assert_eq!(result.succeeded.len(), 1);
        assert!(!bed.dedup.is_known(Namespace::Acquired, &Fingerprint::from("4")));
        assert!(bed.dedup.is_known(Namespace::Acquired, &Fingerprint::from("5")));
    }

    #[test]
    fn limit_defers_remaining_new_items() {
        let bed = TestBed::new();
        bed.dedup
            .mark(Namespace::Acquired, &Fingerprint::from("4"), None)
            .unwrap();
        let acquirer = FakeAcquirer::new();
        let raw = bed.ctx.layout.raw();

        let result = StageRunner::new(&bed.ctx, &bed.dedup)
            .run_stage(
                StagePlan {
                    stage: StageId::Ingest,
                    dedup: Some(Namespace::Acquired),
                    output_dir: &raw,
                    limit: Some(2),
                },
                vec![source("1"), source("2"), source("3"), source("4")],
                &acquirer,
            )
            .unwrap();

        assert_eq!(result.succeeded.len(), 2);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.deferred.len(), 1);
        assert_eq!(result.deferred[0].id, "3");
        assert_eq!(acquirer.calls().len(), 2);
    }

    #[test]
    fn dedup_write_failure_stops_the_stage() {
        let bed = TestBed::with_broken_state_dir();
        let acquirer = FakeAcquirer::new();
        let raw = bed.ctx.layout.raw();

        let err = StageRunner::new(&bed.ctx, &bed.dedup)
            .run_stage(
                StagePlan {
                    stage: StageId::Ingest,
                    dedup: Some(Namespace::Acquired),
                    output_dir: &raw,
                    limit: None,
                },
                vec![source("1"), source("2")],
                &acquirer,
            )
            .unwrap_err();

        assert!(matches!(err, StageError::Dedup(_)));
        assert_eq!(acquirer.calls().len(), 1);
        assert!(!raw.join("1.mp4").exists());
    }

    #[test]
    fn transform_releases_consumed_input() {
        let bed = TestBed::new();
        let raw = bed.ctx.layout.raw();
        fs::write(raw.join("a.webm"), b"a").unwrap();
        let final_dir = bed.ctx.layout.final_dir();

        let result = StageRunner::new(&bed.ctx, &bed.dedup)
            .run_stage(
                StagePlan {
                    stage: StageId::Transform,
                    dedup: None,
                    output_dir: &final_dir,
                    limit: None,
                },
                vec![WorkItem::from_path(raw.join("a.webm"))],
                &FakeTransformer::new(),
            )
            .unwrap();

        assert_eq!(result.succeeded[0].path, final_dir.join("a.mp4"));
        assert!(!raw.join("a.webm").exists());
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
