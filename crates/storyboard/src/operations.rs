//! Single-frame operations
//!
//! User-triggered edits on one frame. They go through the same id-keyed store
//! primitives as a bulk run, so they are safe to use while one is in flight.

use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Result, StoryboardError};
use crate::frame::{Frame, FrameId, FramePatch, FrameState};
use crate::orchestrator::StoryboardGenerator;
use crate::upload;

/// Move the element at `from` to `to`, shifting the elements in between by
/// one. Returns `None` when either position is outside `frames`.
pub fn reorder(frames: &[Frame], from: usize, to: usize) -> Option<Vec<Frame>> {
    if from >= frames.len() || to >= frames.len() {
        return None;
    }
    let mut next = frames.to_vec();
    let frame = next.remove(from);
    next.insert(to, frame);
    Some(next)
}

impl StoryboardGenerator {
    /// Replace a frame's prompt. Image and status are untouched.
    pub fn edit_prompt(&self, id: FrameId, prompt: impl Into<String>) -> bool {
        self.store.patch_by_id(id, FramePatch::prompt(prompt))
    }

    /// Regenerate a frame's image from its current prompt.
    ///
    /// The frame goes to `Generating` (dropping any previous image) before the
    /// request is sent. If the frame is deleted or replaced by a bulk run
    /// while the request is in flight, the result is discarded.
    pub async fn regenerate(&self, id: FrameId) -> Result<FrameState> {
        let prompt = self
            .store
            .get(id)
            .map(|frame| frame.prompt)
            .ok_or(StoryboardError::FrameNotFound(id))?;
        if !self
            .store
            .patch_by_id(id, FramePatch::state(FrameState::Generating))
        {
            return Err(StoryboardError::FrameNotFound(id));
        }
        debug!(frame_id = %id, "regenerating frame");
        Ok(self.render_frame(id, &prompt).await)
    }

    /// Use a local image file as the frame's image.
    ///
    /// Read or format errors leave the frame as it was.
    pub async fn upload_image(&self, id: FrameId, path: &Path) -> Result<()> {
        match upload::read_image_file(path).await {
            Ok(image_url) => self.set_uploaded_image(id, image_url),
            Err(err) => {
                warn!(frame_id = %id, path = %path.display(), "image upload failed: {err}");
                Err(err.into())
            }
        }
    }

    /// Use raw image bytes as the frame's image.
    pub fn upload_image_bytes(&self, id: FrameId, bytes: &[u8]) -> Result<()> {
        match upload::encode_data_uri(bytes) {
            Ok(image_url) => self.set_uploaded_image(id, image_url),
            Err(err) => {
                warn!(frame_id = %id, "image upload failed: {err}");
                Err(err.into())
            }
        }
    }

    fn set_uploaded_image(&self, id: FrameId, image_url: String) -> Result<()> {
        if self
            .store
            .patch_by_id(id, FramePatch::state(FrameState::Done { image_url }))
        {
            info!(frame_id = %id, "uploaded image applied");
            Ok(())
        } else {
            Err(StoryboardError::FrameNotFound(id))
        }
    }

    /// Append a blank frame and return its id.
    pub fn add_frame(&self) -> FrameId {
        let frame = Frame::blank();
        let id = frame.id;
        self.store.append(frame);
        id
    }

    pub fn delete_frame(&self, id: FrameId) -> bool {
        self.store.remove_by_id(id)
    }

    /// Move the frame at `from` to `to`; ignored when either is out of range.
    pub fn move_frame(&self, from: usize, to: usize) -> bool {
        self.store.move_frame(from, to)
    }
}
