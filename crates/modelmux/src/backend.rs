//! Backend collaborators: capability traits per modality, plus the
//! HTTP adapters that speak OpenAI-style `chat/completions` JSON.
//!
//! The orchestrator core only sees the traits. A model that serves
//! several modalities registers a facet per modality in the
//! [`BackendSet`]; the dispatcher picks the facet from the task kind
//! instead of inspecting backend types at runtime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalizer::EncodedImage;
use crate::task::TaskKind;

/// Failure of a single backend call, as observed at the boundary.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Opaque handle for an asynchronous generation job. Polling and
/// completion delivery are the collaborator's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
}

/// Parameters forwarded with a generation job submission.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Whether an image or a video is being requested.
    pub kind: TaskKind,
}

/// Text/code/document completion backend.
#[async_trait]
pub trait TextBackend: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        token_budget: u32,
        timeout: Duration,
    ) -> Result<String, BackendError>;
}

/// Vision completion backend.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn generate_vision(
        &self,
        prompt: &str,
        image: &EncodedImage,
        token_budget: u32,
        timeout: Duration,
    ) -> Result<String, BackendError>;
}

/// Image/video generation-job backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn submit_generation_job(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<JobHandle, BackendError>;
}

/// Which backend facet a task kind dispatches through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facet {
    Text,
    Vision,
    Generation,
}

impl Facet {
    pub fn for_kind(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Vision => Self::Vision,
            TaskKind::ImageGeneration | TaskKind::VideoGeneration => Self::Generation,
            _ => Self::Text,
        }
    }
}

/// Per-model backend facets, keyed by model id.
#[derive(Clone, Default)]
pub struct BackendSet {
    text: HashMap<String, Arc<dyn TextBackend>>,
    vision: HashMap<String, Arc<dyn VisionBackend>>,
    generation: HashMap<String, Arc<dyn GenerationBackend>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, model: impl Into<String>, backend: Arc<dyn TextBackend>) -> Self {
        self.text.insert(model.into(), backend);
        self
    }

    pub fn with_vision(
        mut self,
        model: impl Into<String>,
        backend: Arc<dyn VisionBackend>,
    ) -> Self {
        self.vision.insert(model.into(), backend);
        self
    }

    pub fn with_generation(
        mut self,
        model: impl Into<String>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Self {
        self.generation.insert(model.into(), backend);
        self
    }

    pub fn text(&self, model: &str) -> Option<Arc<dyn TextBackend>> {
        self.text.get(model).cloned()
    }

    pub fn vision(&self, model: &str) -> Option<Arc<dyn VisionBackend>> {
        self.vision.get(model).cloned()
    }

    pub fn generation(&self, model: &str) -> Option<Arc<dyn GenerationBackend>> {
        self.generation.get(model).cloned()
    }

    /// Whether a facet is registered for this model and task kind.
    pub fn supports(&self, model: &str, kind: TaskKind) -> bool {
        match Facet::for_kind(kind) {
            Facet::Text => self.text.contains_key(model),
            Facet::Vision => self.vision.contains_key(model),
            Facet::Generation => self.generation.contains_key(model),
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP adapters (OpenAI-style chat/completions)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

fn map_reqwest_err(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(e.to_string())
    }
}

/// Shared plumbing for the completion-style adapters.
#[derive(Clone)]
struct HttpCompletions {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpCompletions {
    fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    async fn complete(
        &self,
        content: serde_json::Value,
        token_budget: u32,
        timeout: Duration,
    ) -> Result<String, BackendError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content,
            }],
            max_tokens: token_budget,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self.client.post(&url).timeout(timeout).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let res = req.send().await.map_err(map_reqwest_err)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(BackendError::Transport(format!(
                "backend returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| BackendError::Transport(format!("response parse failed: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BackendError::Transport("response carried no choices".into()))
    }
}

/// Text completion backend over HTTP.
#[derive(Clone)]
pub struct HttpTextBackend {
    inner: HttpCompletions,
}

impl HttpTextBackend {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            inner: HttpCompletions::new(base_url, model, api_key),
        }
    }
}

#[async_trait]
impl TextBackend for HttpTextBackend {
    async fn generate(
        &self,
        prompt: &str,
        token_budget: u32,
        timeout: Duration,
    ) -> Result<String, BackendError> {
        self.inner
            .complete(serde_json::Value::String(prompt.to_string()), token_budget, timeout)
            .await
    }
}

/// Vision completion backend over HTTP. The image travels as an inline
/// data URL content part.
#[derive(Clone)]
pub struct HttpVisionBackend {
    inner: HttpCompletions,
}

impl HttpVisionBackend {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            inner: HttpCompletions::new(base_url, model, api_key),
        }
    }
}

/// Inline data URL for an encoded image.
pub fn image_data_url(image: &EncodedImage) -> String {
    format!("data:{};base64,{}", image.media_type, image.base64)
}

#[async_trait]
impl VisionBackend for HttpVisionBackend {
    async fn generate_vision(
        &self,
        prompt: &str,
        image: &EncodedImage,
        token_budget: u32,
        timeout: Duration,
    ) -> Result<String, BackendError> {
        let content = serde_json::json!([
            { "type": "text", "text": prompt },
            { "type": "image_url", "image_url": { "url": image_data_url(image) } },
        ]);
        self.inner.complete(content, token_budget, timeout).await
    }
}

#[derive(Debug, Serialize)]
struct JobRequest {
    model: String,
    prompt: String,
    kind: TaskKind,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    job_id: String,
}

/// Generation-job backend over HTTP: submit and return the handle.
#[derive(Clone)]
pub struct HttpGenerationBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpGenerationBackend {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    async fn submit_generation_job(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<JobHandle, BackendError> {
        let body = JobRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            kind: params.kind,
        };

        let url = format!("{}/jobs", self.base_url);
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let res = req.send().await.map_err(map_reqwest_err)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(BackendError::Transport(format!(
                "job submission returned {status}: {body}"
            )));
        }

        let parsed: JobResponse = res
            .json()
            .await
            .map_err(|e| BackendError::Transport(format!("job response parse failed: {e}")))?;
        Ok(JobHandle { id: parsed.job_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facet_mapping() {
        assert_eq!(Facet::for_kind(TaskKind::Vision), Facet::Vision);
        assert_eq!(Facet::for_kind(TaskKind::ImageGeneration), Facet::Generation);
        assert_eq!(Facet::for_kind(TaskKind::VideoGeneration), Facet::Generation);
        assert_eq!(Facet::for_kind(TaskKind::Chat), Facet::Text);
        assert_eq!(Facet::for_kind(TaskKind::DocumentAnalysis), Facet::Text);
    }

    #[test]
    fn test_backend_set_supports() {
        let set = BackendSet::new().with_text(
            "m1",
            Arc::new(HttpTextBackend::new("http://localhost:1", "m1", None)),
        );
        assert!(set.supports("m1", TaskKind::Chat));
        assert!(!set.supports("m1", TaskKind::Vision));
        assert!(!set.supports("m2", TaskKind::Chat));
    }

    #[test]
    fn test_image_data_url() {
        let image = EncodedImage {
            media_type: "image/png".into(),
            base64: "QUJD".into(),
        };
        assert_eq!(image_data_url(&image), "data:image/png;base64,QUJD");
    }
}
