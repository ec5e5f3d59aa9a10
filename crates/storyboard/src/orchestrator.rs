//! Storyboard generation
//!
//! Drives a bulk run: split the script into scene prompts, seed one frame per
//! prompt, then render every frame concurrently. Each frame's result is
//! patched into the store by id as soon as it settles, so completions can
//! arrive in any order. A run ends once every frame has settled; individual
//! failures stay on their frames and never fail the run.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backends::{BackendFactory, Backends, ImageGenerator, SceneSplitter};
use crate::config::StoryboardConfig;
use crate::error::{Result, StoryboardError};
use crate::frame::{Frame, FrameId, FramePatch, FrameState};
use crate::store::{FrameSnapshot, FrameStore};

pub const ANALYZING_MESSAGE: &str = "Analyzing script and identifying scenes...";
pub const RUN_ERROR_MESSAGE: &str = "An error occurred while generating the storyboard.";

/// Bulk run phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunState {
    /// No run in progress
    #[default]
    Idle,
    /// Waiting on the scene splitter
    Splitting,
    /// Replacing the frame list with the new scenes
    Seeding,
    /// Images in flight; `settled` of `total` have finished
    Generating { settled: usize, total: usize },
}

/// What a presentation layer shows while a run is going
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: RunState,

    /// Loading message for the current phase
    pub message: Option<String>,

    /// Last run-level error; cleared when a new run starts
    pub last_error: Option<String>,
}

impl RunStatus {
    pub fn is_loading(&self) -> bool {
        self.state != RunState::Idle
    }
}

/// Outcome counts for a finished bulk run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct StoryboardGenerator {
    pub(crate) splitter: Arc<dyn SceneSplitter>,
    pub(crate) generator: Arc<dyn ImageGenerator>,
    pub(crate) store: FrameStore,
    status: Arc<watch::Sender<RunStatus>>,
    running: Arc<AtomicBool>,
}

impl StoryboardGenerator {
    pub fn new(backends: Backends) -> Self {
        Self::with_store(backends, FrameStore::new())
    }

    pub fn with_store(backends: Backends, store: FrameStore) -> Self {
        let (status, _rx) = watch::channel(RunStatus::default());
        Self {
            splitter: backends.splitter,
            generator: backends.generator,
            store,
            status: Arc::new(status),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &StoryboardConfig) -> Result<Self> {
        Ok(Self::new(BackendFactory::create(config)?))
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    pub fn frames(&self) -> FrameSnapshot {
        self.store.snapshot()
    }

    pub fn status(&self) -> RunStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }

    /// True while a bulk run is in progress
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the whole pipeline for `script`.
    ///
    /// Blank scripts are rejected before anything is touched. A splitter
    /// failure leaves the store empty and records a run-level error; image
    /// failures are recorded on their frames only.
    pub async fn generate(&self, script: &str) -> Result<RunSummary> {
        if script.trim().is_empty() {
            return Err(StoryboardError::EmptyScript);
        }
        let _guard = RunGuard::acquire(&self.running, &self.status)
            .ok_or(StoryboardError::RunInProgress)?;

        self.status.send_replace(RunStatus {
            state: RunState::Splitting,
            message: Some(ANALYZING_MESSAGE.to_string()),
            last_error: None,
        });
        self.store.clear();
        info!(
            splitter = self.splitter.name(),
            chars = script.len(),
            "storyboard run started"
        );

        let prompts = match self.splitter.split_script(script).await {
            Ok(prompts) => prompts,
            Err(err) => {
                error!(splitter = self.splitter.name(), "scene splitting failed: {err}");
                self.store.clear();
                // Idle is published by the guard.
                self.status
                    .send_modify(|s| s.last_error = Some(RUN_ERROR_MESSAGE.to_string()));
                return Err(StoryboardError::Split(err));
            }
        };

        let total = prompts.len();
        self.status.send_modify(|s| s.state = RunState::Seeding);
        let frames: Vec<Frame> = prompts.into_iter().map(Frame::generating).collect();
        let seeded: Vec<(FrameId, String)> =
            frames.iter().map(|f| (f.id, f.prompt.clone())).collect();
        self.store.replace_all(frames);
        self.status
            .send_modify(|s| s.state = RunState::Generating { settled: 0, total });
        debug!(total, "frames seeded");

        let outcomes = join_all(
            seeded
                .into_iter()
                .enumerate()
                .map(|(index, (id, prompt))| self.settle_seeded_frame(index, total, id, prompt)),
        )
        .await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        let summary = RunSummary {
            total,
            succeeded,
            failed: total - succeeded,
        };
        info!(
            total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "storyboard run settled"
        );
        Ok(summary)
    }

    async fn settle_seeded_frame(
        &self,
        index: usize,
        total: usize,
        id: FrameId,
        prompt: String,
    ) -> bool {
        self.status.send_modify(|s| {
            s.message = Some(format!(
                "Generating image for frame {} of {}...",
                index + 1,
                total
            ))
        });
        let state = self.render_frame(id, &prompt).await;
        self.status.send_modify(|s| {
            if let RunState::Generating { settled, .. } = &mut s.state {
                *settled += 1;
            }
        });
        matches!(state, FrameState::Done { .. })
    }

    /// Generate one image for `prompt` and patch the outcome onto frame `id`.
    /// Only the id is held across the request, so the patch lands on whatever
    /// the frame looks like when the image arrives.
    pub(crate) async fn render_frame(&self, id: FrameId, prompt: &str) -> FrameState {
        let state = match self.generator.generate_image(prompt).await {
            Ok(image_url) => FrameState::Done { image_url },
            Err(err) => {
                warn!(
                    frame_id = %id,
                    generator = self.generator.name(),
                    "image generation failed for prompt {prompt:?}: {err}"
                );
                FrameState::error(err.to_string())
            }
        };
        if self.store.patch_by_id(id, FramePatch::state(state.clone())) {
            debug!(frame_id = %id, status = %state.status(), "frame settled");
        } else {
            debug!(frame_id = %id, "frame gone before its image settled; result discarded");
        }
        state
    }
}

impl std::fmt::Debug for StoryboardGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryboardGenerator")
            .field("splitter", &self.splitter.name())
            .field("generator", &self.generator.name())
            .field("status", &*self.status.borrow())
            .field("frames", &self.store.len())
            .finish()
    }
}

// Marks a bulk run as in progress; dropping it (normally or because the run
// future was dropped) returns the run state to idle. The flag is released
// while the status lock is held, so a subscriber woken by `Idle` can always
// start the next run, and a run started in between publishes its state after
// this one's `Idle`.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    status: &'a watch::Sender<RunStatus>,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a AtomicBool, status: &'a watch::Sender<RunStatus>) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(Self { running, status })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let running = self.running;
        self.status.send_modify(|s| {
            s.state = RunState::Idle;
            s.message = None;
            running.store(false, Ordering::SeqCst);
        });
    }
}
