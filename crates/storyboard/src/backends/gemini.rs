//! Gemini API backend
//!
//! Scene splitting goes through `generateContent` on a text model with a JSON
//! response schema; images come from an Imagen model's `predict` endpoint and
//! are returned inline as base64 data URIs.

use super::{BackendError, BackendKind, ImageGenerator, SceneSplitter};
use crate::config::StoryboardConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

const SPLIT_INSTRUCTIONS: &str = "You are a storyboard artist. Break the following script into its distinct visual scenes, in order. For each scene write one detailed, self-contained prompt for an image generator: describe the setting, the characters and their actions, the mood, the lighting and the camera framing. Do not number the prompts or add commentary.";

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: String,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub aspect_ratio: String,
    pub style_suffix: Option<String>,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: GEMINI_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            style_suffix: None,
            timeout: Duration::from_secs(120),
        }
    }
}

impl From<&StoryboardConfig> for GeminiConfig {
    fn from(config: &StoryboardConfig) -> Self {
        Self {
            api_key: config.api_key.clone().unwrap_or_default(),
            api_base: config.api_base.clone(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            aspect_ratio: config.aspect_ratio.clone(),
            style_suffix: config.style_suffix.clone(),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(120)),
        }
    }
}

pub struct GeminiBackend {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self, BackendError> {
        if config.api_key.trim().is_empty() {
            return Err(BackendError::configuration("Gemini API key is required."));
        }
        if config.text_model.trim().is_empty() || config.image_model.trim().is_empty() {
            return Err(BackendError::configuration(
                "Gemini text and image model names are required.",
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(config.timeout)
            .build()
            .map_err(|err| BackendError::configuration(format!("HTTP client: {err}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}",
            self.config.api_base.trim_end_matches('/'),
            model.trim(),
            method
        )
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        payload: &Value,
    ) -> Result<T, BackendError> {
        let start = Instant::now();
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", self.config.api_key.trim())
            .json(payload)
            .send()
            .await
            .map_err(|err| BackendError::transport(format!("Gemini request failed: {err}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            BackendError::transport(format!("Read Gemini response failed: {err}"))
        })?;
        debug!(
            url,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "gemini response"
        );

        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|err| {
            BackendError::invalid_response(format!(
                "Invalid Gemini response JSON: {err}; raw: {body}"
            ))
        })
    }

    fn image_prompt(&self, prompt: &str) -> String {
        match self.config.style_suffix.as_deref().map(str::trim) {
            Some(suffix) if !suffix.is_empty() => format!("{}, {}", prompt.trim(), suffix),
            _ => prompt.trim().to_string(),
        }
    }
}

#[async_trait::async_trait]
impl SceneSplitter for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    async fn split_script(&self, script: &str) -> Result<Vec<String>, BackendError> {
        let payload = split_request(script);
        let url = self.endpoint(&self.config.text_model, "generateContent");
        let response: GenerateContentResponse = self.post_json(&url, &payload).await?;
        let text = response.text().ok_or_else(|| {
            BackendError::invalid_response("Gemini response had no candidates.")
        })?;
        parse_scene_prompts(&text)
    }
}

#[async_trait::async_trait]
impl ImageGenerator for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, BackendError> {
        let request = PredictRequest {
            instances: vec![PredictInstance {
                prompt: self.image_prompt(prompt),
            }],
            parameters: PredictParameters {
                sample_count: 1,
                aspect_ratio: self.config.aspect_ratio.clone(),
                output_mime_type: "image/jpeg".to_string(),
            },
        };
        let payload = serde_json::to_value(&request)
            .map_err(|err| BackendError::other(format!("Encode Imagen request: {err}")))?;
        let url = self.endpoint(&self.config.image_model, "predict");
        let response: PredictResponse = self.post_json(&url, &payload).await?;
        response.into_data_uri()
    }
}

fn split_request(script: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": format!("{SPLIT_INSTRUCTIONS}\n\nScript:\n{}", script.trim()) }]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "ARRAY",
                "items": {
                    "type": "STRING",
                    "description": "A detailed image-generation prompt for one scene."
                }
            }
        }
    })
}

fn status_error(status: reqwest::StatusCode, body: &str) -> BackendError {
    let msg = format!("Gemini API error: {status} - {body}");
    match status.as_u16() {
        401 | 403 => BackendError::Authentication(msg),
        429 => BackendError::RateLimited(msg),
        _ => BackendError::Transport(msg),
    }
}

/// Parse the model's JSON array of prompts, tolerating a Markdown code fence
/// around it. Blank prompts are dropped.
pub(crate) fn parse_scene_prompts(text: &str) -> Result<Vec<String>, BackendError> {
    let trimmed = strip_code_fence(text.trim());
    let prompts: Vec<String> = serde_json::from_str(trimmed).map_err(|err| {
        BackendError::invalid_response(format!(
            "Expected a JSON array of prompts: {err}; raw: {text}"
        ))
    })?;
    Ok(prompts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect())
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // drop the language tag line, e.g. ```json
    let body = match rest.split_once('\n') {
        Some((tag, body)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
        _ => rest,
    };
    body.trim()
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let parts = candidate.content?.parts?;
        Some(parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    aspect_ratio: String,
    output_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

impl PredictResponse {
    fn into_data_uri(self) -> Result<String, BackendError> {
        let prediction = self
            .predictions
            .into_iter()
            .find(|p| p.bytes_base64_encoded.is_some())
            .ok_or_else(|| BackendError::invalid_response("Imagen returned no images."))?;
        let mime = prediction.mime_type.unwrap_or_else(|| "image/jpeg".to_string());
        let data = prediction.bytes_base64_encoded.unwrap_or_default();
        Ok(format!("data:{mime};base64,{data}"))
    }
}
