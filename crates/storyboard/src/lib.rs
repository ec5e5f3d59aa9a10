//! AI storyboard generation
//!
//! Splits a script into scene prompts with a text model, renders one image per
//! scene, and keeps the resulting frames in an ordered, observable store that
//! supports per-frame editing, regeneration, uploads and reordering.

pub mod backends;
pub mod config;
pub mod error;
pub mod frame;
pub mod operations;
pub mod orchestrator;
pub mod store;
pub mod upload;

pub use backends::{
    BackendError, BackendFactory, BackendKind, Backends, GeminiBackend, GeminiConfig,
    ImageGenerator, MockImageGenerator, MockSceneSplitter, SceneSplitter,
};
pub use config::StoryboardConfig;
pub use error::{Result, StoryboardError};
pub use frame::{Frame, FrameId, FramePatch, FrameState, FrameStatus, BLANK_FRAME_PROMPT};
pub use operations::reorder;
pub use orchestrator::{RunState, RunStatus, RunSummary, StoryboardGenerator};
pub use store::{FrameSnapshot, FrameStore};
pub use upload::UploadError;
