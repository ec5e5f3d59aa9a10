//! Storyboard configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::backends::gemini::{
    DEFAULT_ASPECT_RATIO, DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL, GEMINI_API_BASE,
};
use crate::backends::BackendKind;

/// Environment variables checked for the API key, in order
pub const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryboardConfig {
    /// Backend type
    #[serde(default)]
    pub backend: BackendKind,

    /// API key or token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model used to split scripts into scene prompts
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Model used to render frames
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Aspect ratio requested for every frame, e.g. "16:9"
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,

    /// Appended to every image prompt, e.g. "black and white pencil sketch"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_suffix: Option<String>,

    /// Request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_api_base() -> String {
    GEMINI_API_BASE.to_string()
}

fn default_text_model() -> String {
    DEFAULT_TEXT_MODEL.to_string()
}

fn default_image_model() -> String {
    DEFAULT_IMAGE_MODEL.to_string()
}

fn default_aspect_ratio() -> String {
    DEFAULT_ASPECT_RATIO.to_string()
}

impl Default for StoryboardConfig {
    fn default() -> Self {
        Self::new(BackendKind::default())
    }
}

impl StoryboardConfig {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            api_key: None,
            api_base: default_api_base(),
            text_model: default_text_model(),
            image_model: default_image_model(),
            aspect_ratio: default_aspect_ratio(),
            style_suffix: None,
            timeout_secs: Some(120),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into();
        self
    }

    pub fn with_models(
        mut self,
        text_model: impl Into<String>,
        image_model: impl Into<String>,
    ) -> Self {
        self.text_model = text_model.into();
        self.image_model = image_model.into();
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.aspect_ratio = ratio.into();
        self
    }

    pub fn with_style_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.style_suffix = Some(suffix.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Fill the API key from the environment when one is set there.
    pub fn apply_env(mut self) -> Self {
        if let Some(key) = api_key_from(|name| std::env::var(name).ok()) {
            self.api_key = Some(key);
        }
        self
    }

    /// Save configuration to JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing storyboard config {}", path.display()))?;
        Ok(())
    }

    /// Load configuration from JSON
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading storyboard config {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("parsing storyboard config {}", path.display()))?;
        Ok(config)
    }
}

fn api_key_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|&name| lookup(name))
        .find(|value| !value.trim().is_empty())
}
