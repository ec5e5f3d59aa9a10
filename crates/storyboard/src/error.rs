//! Storyboard errors

use thiserror::Error;

use crate::backends::BackendError;
use crate::frame::FrameId;
use crate::upload::UploadError;

#[derive(Debug, Error)]
pub enum StoryboardError {
    #[error("Script cannot be empty.")]
    EmptyScript,

    #[error("a storyboard run is already in progress")]
    RunInProgress,

    #[error("scene splitting failed: {0}")]
    Split(#[source] BackendError),

    #[error("frame not found: {0}")]
    FrameNotFound(FrameId),

    #[error("image upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type Result<T> = std::result::Result<T, StoryboardError>;
