//! Frame store
//!
//! Ordered, in-memory list of frames shared by every writer. Each mutation
//! derives a whole new sequence from the current one while holding the
//! channel's write lock and publishes it as a fresh snapshot, so concurrent
//! writers never lose each other's updates and readers only ever see complete
//! sequences.

use std::sync::Arc;
use tokio::sync::watch;

use crate::frame::{Frame, FrameId, FramePatch};
use crate::operations;

/// Immutable view of the whole sequence at one point in time
pub type FrameSnapshot = Arc<Vec<Frame>>;

#[derive(Clone)]
pub struct FrameStore {
    tx: Arc<watch::Sender<FrameSnapshot>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::with_frames(Vec::new())
    }

    pub fn with_frames(frames: Vec<Frame>) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(frames));
        Self { tx: Arc::new(tx) }
    }

    /// Current sequence
    pub fn snapshot(&self) -> FrameSnapshot {
        Arc::clone(&self.tx.borrow())
    }

    /// Receiver notified after every change; used by the presentation layer
    /// to re-render.
    pub fn subscribe(&self) -> watch::Receiver<FrameSnapshot> {
        self.tx.subscribe()
    }

    pub fn get(&self, id: FrameId) -> Option<Frame> {
        self.tx.borrow().iter().find(|f| f.id == id).cloned()
    }

    pub fn contains(&self, id: FrameId) -> bool {
        self.tx.borrow().iter().any(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Set the entire ordered sequence.
    pub fn replace_all(&self, frames: Vec<Frame>) {
        self.tx.send_replace(Arc::new(frames));
    }

    pub fn clear(&self) {
        self.replace_all(Vec::new());
    }

    /// Merge `patch` into the frame with `id`. Unknown ids leave the sequence
    /// untouched; returns whether a frame matched.
    pub fn patch_by_id(&self, id: FrameId, patch: FramePatch) -> bool {
        self.modify(|frames| {
            let idx = frames.iter().position(|f| f.id == id)?;
            let mut next = frames.to_vec();
            next[idx] = frames[idx].patched(&patch);
            Some(next)
        })
    }

    pub fn append(&self, frame: Frame) {
        self.modify(|frames| {
            let mut next = Vec::with_capacity(frames.len() + 1);
            next.extend_from_slice(frames);
            next.push(frame);
            Some(next)
        });
    }

    /// Remove the frame with `id`; no-op when absent.
    pub fn remove_by_id(&self, id: FrameId) -> bool {
        self.modify(|frames| {
            if !frames.iter().any(|f| f.id == id) {
                return None;
            }
            Some(frames.iter().filter(|f| f.id != id).cloned().collect())
        })
    }

    /// Move the frame at `from` to `to`, shifting the frames in between.
    /// Out-of-range positions are ignored.
    pub fn move_frame(&self, from: usize, to: usize) -> bool {
        self.modify(|frames| operations::reorder(frames, from, to))
    }

    // Read-modify-write against the live sequence. `derive` returns `None`
    // when nothing changes, in which case subscribers are not woken.
    fn modify<F>(&self, derive: F) -> bool
    where
        F: FnOnce(&[Frame]) -> Option<Vec<Frame>>,
    {
        self.tx.send_if_modified(|current| match derive(current.as_slice()) {
            Some(next) => {
                *current = Arc::new(next);
                true
            }
            None => false,
        })
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStore")
            .field("frames", &*self.snapshot())
            .finish()
    }
}
