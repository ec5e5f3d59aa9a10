//! Storyboard frames
//!
//! A frame is one storyboard cell: a stable id, the prompt that drives image
//! generation, and a state that carries the image once one exists.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prompt given to frames created with "add frame".
pub const BLANK_FRAME_PROMPT: &str = "A new scene, edit this prompt.";

/// Frame identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub Uuid);

impl FrameId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FrameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a frame is in its image lifecycle.
///
/// Only `Done` carries an image, so a finished frame without one cannot be
/// represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameState {
    /// No image yet and nothing in flight
    New,
    /// An image request is in flight
    Generating,
    /// Image available (remote URL or data URI)
    Done { image_url: String },
    /// Last generation attempt failed
    Error { reason: String },
}

impl FrameState {
    pub fn done(image_url: impl Into<String>) -> Self {
        FrameState::Done {
            image_url: image_url.into(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        FrameState::Error {
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> FrameStatus {
        match self {
            FrameState::New => FrameStatus::New,
            FrameState::Generating => FrameStatus::Generating,
            FrameState::Done { .. } => FrameStatus::Done,
            FrameState::Error { .. } => FrameStatus::Error,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            FrameState::Done { image_url } => Some(image_url.as_str()),
            _ => None,
        }
    }

    /// True once a generation has either produced an image or failed.
    pub fn is_settled(&self) -> bool {
        matches!(self, FrameState::Done { .. } | FrameState::Error { .. })
    }
}

/// Flat status tag, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameStatus {
    New,
    Generating,
    Done,
    Error,
}

impl FrameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameStatus::New => "new",
            FrameStatus::Generating => "generating",
            FrameStatus::Done => "done",
            FrameStatus::Error => "error",
        }
    }
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One storyboard unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Stable key for every update, delete and reorder
    pub id: FrameId,

    /// Text description driving image generation
    pub prompt: String,

    /// Image lifecycle state
    pub state: FrameState,
}

impl Frame {
    /// New frame with a fresh id
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: FrameId::new(),
            prompt: prompt.into(),
            state: FrameState::New,
        }
    }

    /// Blank frame appended by the user
    pub fn blank() -> Self {
        Self::new(BLANK_FRAME_PROMPT)
    }

    /// Frame seeded by a bulk run, already waiting on its image
    pub fn generating(prompt: impl Into<String>) -> Self {
        Self {
            state: FrameState::Generating,
            ..Self::new(prompt)
        }
    }

    pub fn status(&self) -> FrameStatus {
        self.state.status()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.state.image_url()
    }

    /// Copy of this frame with `patch` merged in
    pub fn patched(&self, patch: &FramePatch) -> Frame {
        Frame {
            id: self.id,
            prompt: patch
                .prompt
                .clone()
                .unwrap_or_else(|| self.prompt.clone()),
            state: patch.state.clone().unwrap_or_else(|| self.state.clone()),
        }
    }
}

/// Partial update applied by id. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FramePatch {
    pub prompt: Option<String>,
    pub state: Option<FrameState>,
}

impl FramePatch {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            state: None,
        }
    }

    pub fn state(state: FrameState) -> Self {
        Self {
            prompt: None,
            state: Some(state),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prompt.is_none() && self.state.is_none()
    }
}

// Serialized as the flat `{ id, prompt, imageUrl, status }` record a
// presentation layer renders.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameRecord {
    id: FrameId,
    prompt: String,
    image_url: Option<String>,
    status: FrameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Serialize for Frame {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let error = match &self.state {
            FrameState::Error { reason } => Some(reason.clone()),
            _ => None,
        };
        FrameRecord {
            id: self.id,
            prompt: self.prompt.clone(),
            image_url: self.image_url().map(str::to_string),
            status: self.status(),
            error,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Frame {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = FrameRecord::deserialize(deserializer)?;
        let state = match record.status {
            FrameStatus::New => FrameState::New,
            FrameStatus::Generating => FrameState::Generating,
            FrameStatus::Done => match record.image_url {
                Some(image_url) => FrameState::Done { image_url },
                None => {
                    return Err(serde::de::Error::custom(
                        "frame with status \"done\" has no imageUrl",
                    ))
                }
            },
            FrameStatus::Error => FrameState::Error {
                reason: record.error.unwrap_or_default(),
            },
        };
        Ok(Frame {
            id: record.id,
            prompt: record.prompt,
            state,
        })
    }
}
