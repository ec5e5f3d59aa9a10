//! Generation backends
//!
//! The two remote capabilities a storyboard run depends on:
//! - scene splitting: script text in, ordered scene prompts out
//! - image generation: one prompt in, one image reference out
//!
//! Implementations:
//! - Gemini API (text model for splitting, Imagen for images)
//! - Mock (scripted, in-process)

pub mod gemini;
pub mod mock;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use gemini::{GeminiBackend, GeminiConfig};
pub use mock::{MockImageGenerator, MockSceneSplitter};

use crate::config::StoryboardConfig;

/// Backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Google Gemini / Imagen over HTTP
    #[default]
    Gemini,
    /// In-process scripted backend
    Mock,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "gemini",
            BackendKind::Mock => "mock",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        BackendError::Configuration(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        BackendError::Transport(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        BackendError::InvalidResponse(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        BackendError::Other(msg.into())
    }
}

/// Splits a script into ordered scene prompts.
#[async_trait::async_trait]
pub trait SceneSplitter: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// One prompt per detected scene, in script order. Callers reject blank
    /// scripts before calling.
    async fn split_script(&self, script: &str) -> Result<Vec<String>, BackendError>;
}

/// Produces one image for one prompt.
#[async_trait::async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Image reference: a remote URL or a `data:` URI
    async fn generate_image(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Splitter and generator pair used by a storyboard
#[derive(Clone)]
pub struct Backends {
    pub splitter: Arc<dyn SceneSplitter>,
    pub generator: Arc<dyn ImageGenerator>,
}

impl Backends {
    pub fn new(splitter: Arc<dyn SceneSplitter>, generator: Arc<dyn ImageGenerator>) -> Self {
        Self {
            splitter,
            generator,
        }
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("splitter", &self.splitter.name())
            .field("generator", &self.generator.name())
            .finish()
    }
}

/// Backend factory for creating backend instances
pub struct BackendFactory;

impl BackendFactory {
    /// Create backends from config
    pub fn create(config: &StoryboardConfig) -> Result<Backends, BackendError> {
        match config.backend {
            BackendKind::Gemini => {
                let backend = Arc::new(GeminiBackend::new(GeminiConfig::from(config))?);
                Ok(Backends::new(backend.clone(), backend))
            }
            BackendKind::Mock => Ok(Self::mock()),
        }
    }

    /// Gemini backend with default models
    pub fn gemini(api_key: impl Into<String>) -> Result<Backends, BackendError> {
        Self::create(&StoryboardConfig::new(BackendKind::Gemini).with_api_key(api_key))
    }

    /// Mock backends with default behavior
    pub fn mock() -> Backends {
        Backends::new(
            Arc::new(MockSceneSplitter::new()),
            Arc::new(MockImageGenerator::new()),
        )
    }
}
