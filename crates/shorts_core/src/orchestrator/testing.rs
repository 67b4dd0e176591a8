//! Fake collaborators and a throwaway workspace for orchestrator tests.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use super::collaborator::Collaborator;
use super::errors::{CollaboratorError, CollaboratorResult};
use super::pipeline::{Collaborators, Controller};
use super::types::Context;
use crate::config::Settings;
use crate::dedup::DedupTracker;
use crate::logging::{LogConfig, RunLogger};
use crate::models::{VideoMetadata, WorkItem};
use crate::sources::SourceRef;
use crate::status::StatusStore;
use crate::workspace::{remove_if_exists, WorkspaceLayout};

/// A source with the given id.
pub fn source(id: &str) -> SourceRef {
    SourceRef {
        url: format!("https://www.tiktok.com/@tester/video/{}", id),
        id: id.to_string(),
    }
}

/// Builds the error a scripted failure returns for an item name.
pub type FailWith = fn(&str) -> CollaboratorError;

fn not_found(name: &str) -> CollaboratorError {
    CollaboratorError::NotFound(name.to_string())
}

/// Shared call log and failure script of one fake.
#[derive(Default)]
struct Script {
    fail: Mutex<HashMap<String, FailWith>>,
    panic: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl Script {
    fn call(&self, name: &str) -> CollaboratorResult<()> {
        self.calls.lock().push(name.to_string());
        if self.panic.lock().contains(name) {
            panic!("scripted panic for {}", name);
        }
        if let Some(fail_with) = self.fail.lock().get(name) {
            return Err(fail_with(name));
        }
        Ok(())
    }
}

macro_rules! scripted {
    ($name:ident) => {
        #[derive(Clone, Default)]
        pub struct $name {
            script: Arc<Script>,
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            /// Fail calls for `name` with `NotFound` from now on.
            pub fn fail(&self, name: &str) {
                self.fail_with(name, not_found);
            }

            /// Fail calls for `name` with the error `fail_with` builds.
            pub fn fail_with(&self, name: &str, fail_with: FailWith) {
                self.script.fail.lock().insert(name.to_string(), fail_with);
            }

            pub fn failing(self, name: &str) -> Self {
                self.fail(name);
                self
            }

            pub fn failing_with(self, name: &str, fail_with: FailWith) -> Self {
                self.fail_with(name, fail_with);
                self
            }

            pub fn panicking(self, name: &str) -> Self {
                self.script.panic.lock().insert(name.to_string());
                self
            }

            /// Item names passed to `process`, in call order.
            pub fn calls(&self) -> Vec<String> {
                self.script.calls.lock().clone()
            }
        }
    };
}

scripted!(FakeAcquirer);
scripted!(FakeTransformer);
scripted!(FakeEnricher);
scripted!(FakePublisher);

impl Collaborator for FakeAcquirer {
    type Input = SourceRef;

    fn name(&self) -> &str {
        "fake-acquire"
    }

    fn process(&self, ctx: &Context, input: &SourceRef) -> CollaboratorResult<WorkItem> {
        self.script.call(&input.id)?;
        let incoming = ctx.layout.incoming();
        fs::create_dir_all(&incoming).map_err(|e| CollaboratorError::io("create incoming", e))?;
        let path = incoming.join(format!("{}.mp4", input.id));
        fs::write(&path, format!("video {}", input.id))
            .map_err(|e| CollaboratorError::io("write download", e))?;
        Ok(WorkItem::from_path(path).with_source_id(&input.id))
    }
}

impl Collaborator for FakeTransformer {
    type Input = WorkItem;

    fn name(&self) -> &str {
        "fake-transform"
    }

    fn process(&self, ctx: &Context, input: &WorkItem) -> CollaboratorResult<WorkItem> {
        self.script.call(&input.name)?;
        let edited = ctx.layout.edited();
        fs::create_dir_all(&edited).map_err(|e| CollaboratorError::io("create edited", e))?;
        let content = fs::read(&input.path).map_err(|e| CollaboratorError::io("read input", e))?;
        let path = edited.join(format!("{}.mp4", input.stem()));
        fs::write(&path, [b"edited:".as_slice(), &content].concat())
            .map_err(|e| CollaboratorError::io("write output", e))?;
        Ok(input.moved_to(path))
    }

    fn release_input(&self, _ctx: &Context, input: &WorkItem) -> std::io::Result<()> {
        remove_if_exists(&input.path)
    }
}

impl Collaborator for FakeEnricher {
    type Input = WorkItem;

    fn name(&self) -> &str {
        "fake-enrich"
    }

    fn process(&self, _ctx: &Context, input: &WorkItem) -> CollaboratorResult<WorkItem> {
        self.script.call(&input.name)?;
        let mut output = input.clone().with_metadata(VideoMetadata {
            title: format!("Title {}", input.stem()),
            description: "A gadget #Tech".to_string(),
            tags: vec!["Tech".to_string()],
        });
        output.transcript = Some("words words words".to_string());
        Ok(output)
    }
}

impl Collaborator for FakePublisher {
    type Input = WorkItem;

    fn name(&self) -> &str {
        "fake-publish"
    }

    fn process(&self, _ctx: &Context, input: &WorkItem) -> CollaboratorResult<WorkItem> {
        self.script.call(&input.name)?;
        let mut output = input.clone();
        output.remote_id = Some(format!("yt-{}", input.stem()));
        Ok(output)
    }
}

/// One fake per stage, sharing call logs with the boxed copies.
#[derive(Clone, Default)]
pub struct Fakes {
    pub acquirer: FakeAcquirer,
    pub transformer: FakeTransformer,
    pub enricher: FakeEnricher,
    pub publisher: FakePublisher,
}

impl Fakes {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            acquire: Box::new(self.acquirer.clone()),
            transform: Box::new(self.transformer.clone()),
            enrich: Box::new(self.enricher.clone()),
            publish: Box::new(self.publisher.clone()),
        }
    }
}

/// A context, status store, and dedup tracker inside a temp directory.
pub struct TestBed {
    _dir: TempDir,
    pub ctx: Context,
    pub status: StatusStore,
    pub dedup: DedupTracker,
    pub fakes: Fakes,
    state_dir: PathBuf,
}

impl TestBed {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        Self::build(dir, state_dir)
    }

    /// A bed whose dedup state directory is a plain file, so every mark fails.
    pub fn with_broken_state_dir() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        fs::write(&state_dir, "not a directory").unwrap();
        Self::build(dir, state_dir)
    }

    fn build(dir: TempDir, state_dir: PathBuf) -> Self {
        crate::logging::init_test_tracing();
        let logger = RunLogger::new("run-test", dir.path().join("logs"), LogConfig::default()).unwrap();
        let layout = WorkspaceLayout::new(dir.path().join("videos"));
        layout.ensure().unwrap();
        let ctx = Context::new("run-test", Settings::default(), layout, Arc::new(logger));

        Self {
            status: StatusStore::new(dir.path().join("pipeline_status.json")),
            dedup: DedupTracker::new(&state_dir),
            fakes: Fakes::default(),
            state_dir,
            ctx,
            _dir: dir,
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone()
    }

    /// A controller over this bed's status file, state dir, and fakes.
    pub fn controller(&self) -> Controller {
        Controller::new(
            self.fakes.collaborators(),
            self.status.clone(),
            DedupTracker::new(&self.state_dir),
        )
    }
}
