//! In-process backends for tests and offline use

use super::{BackendError, BackendKind, ImageGenerator, SceneSplitter};
use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns scripted scenes, or splits the script on blank lines when none are
/// scripted.
#[derive(Debug, Default)]
pub struct MockSceneSplitter {
    scenes: Option<Vec<String>>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl MockSceneSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scenes<I, S>(scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scenes: Some(scenes.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Splitter whose every call fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Number of `split_script` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SceneSplitter for MockSceneSplitter {
    fn name(&self) -> &str {
        "mock"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Mock
    }

    async fn split_script(&self, script: &str) -> Result<Vec<String>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(BackendError::other(message.clone()));
        }
        if let Some(scenes) = &self.scenes {
            return Ok(scenes.clone());
        }
        Ok(split_on_blank_lines(script))
    }
}

// A scene is a run of non-blank lines; whitespace inside it is collapsed.
fn split_on_blank_lines(script: &str) -> Vec<String> {
    let mut scenes = Vec::new();
    let mut words: Vec<&str> = Vec::new();
    for line in script.lines() {
        if line.trim().is_empty() {
            if !words.is_empty() {
                scenes.push(words.join(" "));
                words.clear();
            }
        } else {
            words.extend(line.split_whitespace());
        }
    }
    if !words.is_empty() {
        scenes.push(words.join(" "));
    }
    scenes
}

/// Renders a small solid PNG per prompt. Prompts registered with `fail_on`
/// fail instead.
#[derive(Debug)]
pub struct MockImageGenerator {
    failing_prompts: HashSet<String>,
    size: u32,
    calls: AtomicUsize,
}

impl MockImageGenerator {
    pub fn new() -> Self {
        Self {
            failing_prompts: HashSet::new(),
            size: 4,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_on(mut self, prompt: impl Into<String>) -> Self {
        self.failing_prompts.insert(prompt.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockImageGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ImageGenerator for MockImageGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Mock
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_prompts.contains(prompt) {
            return Err(BackendError::other(format!(
                "mock generation failed for \"{prompt}\""
            )));
        }
        placeholder_png(prompt, self.size)
    }
}

// Same prompt, same color.
fn placeholder_png(prompt: &str, size: u32) -> Result<String, BackendError> {
    let hash = prompt
        .bytes()
        .fold(0x811c9dc5u32, |h, b| (h ^ b as u32).wrapping_mul(0x01000193));
    let [r, g, b, _] = hash.to_le_bytes();
    let img = RgbImage::from_pixel(size, size, Rgb([r, g, b]));

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| BackendError::other(format!("encode placeholder: {err}")))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:image/png;base64,{encoded}"))
}
