//! Multimodal Normalizer: converts attachments into what a backend
//! can consume.
//!
//! Images become a size-bounded base64 payload with a sniffed media
//! type. Documents become extracted text, truncated to a character
//! budget and wrapped in a grounding template that demands a complete
//! multi-sentence answer; a starved one-line excerpt is exactly what
//! produces one-sentence answers downstream. Extraction failures are
//! surfaced as normalization errors, never a silent empty payload.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::config::NormalizerConfig;
use crate::error::OrchestratorError;
use crate::task::{Attachment, AttachmentKind, TaskKind};

/// A size-bounded, base64-encoded image ready for a vision backend.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Sniffed media type, e.g. `image/png`.
    pub media_type: String,
    /// Base64-encoded raw bytes.
    pub base64: String,
}

/// Backend-ready representation of a request.
#[derive(Debug, Clone)]
pub enum NormalizedPayload {
    /// Plain prompt for the text/code/document/generation backends.
    Text { prompt: String },
    /// Prompt plus encoded image for the vision backend.
    Vision {
        prompt: String,
        image: EncodedImage,
    },
}

impl NormalizedPayload {
    /// The prompt text, regardless of modality.
    pub fn prompt(&self) -> &str {
        match self {
            Self::Text { prompt } => prompt,
            Self::Vision { prompt, .. } => prompt,
        }
    }
}

/// Attachment normalizer with configured size bounds.
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Produce the backend payload for a classified request.
    pub fn normalize(
        &self,
        kind: TaskKind,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<NormalizedPayload, OrchestratorError> {
        match kind {
            TaskKind::Vision => {
                let attachment = attachments
                    .iter()
                    .find(|a| a.kind == AttachmentKind::Image)
                    .ok_or_else(|| {
                        OrchestratorError::Normalization(
                            "vision task without an image attachment".into(),
                        )
                    })?;
                let image = self.encode_image(&attachment.data)?;
                Ok(NormalizedPayload::Vision {
                    prompt: text.to_string(),
                    image,
                })
            }
            TaskKind::DocumentAnalysis => {
                let attachment = attachments
                    .iter()
                    .find(|a| a.kind == AttachmentKind::Pdf)
                    .ok_or_else(|| {
                        OrchestratorError::Normalization(
                            "document task without a document attachment".into(),
                        )
                    })?;
                let excerpt = self.extract_pdf_text(&attachment.data)?;
                Ok(NormalizedPayload::Text {
                    prompt: document_prompt(text, &excerpt),
                })
            }
            _ => Ok(NormalizedPayload::Text {
                prompt: text.to_string(),
            }),
        }
    }

    fn encode_image(&self, data: &[u8]) -> Result<EncodedImage, OrchestratorError> {
        if data.len() > self.config.image_byte_cap {
            return Err(OrchestratorError::Normalization(format!(
                "image of {} bytes exceeds the {} byte cap",
                data.len(),
                self.config.image_byte_cap
            )));
        }
        let media_type = sniff_image_media_type(data).ok_or_else(|| {
            OrchestratorError::Normalization("unrecognized image format".into())
        })?;
        Ok(EncodedImage {
            media_type: media_type.to_string(),
            base64: BASE64.encode(data),
        })
    }

    fn extract_pdf_text(&self, data: &[u8]) -> Result<String, OrchestratorError> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| OrchestratorError::Normalization(format!("unreadable pdf: {e}")))?;
        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        if pages.is_empty() {
            return Err(OrchestratorError::Normalization("pdf has no pages".into()));
        }
        let text = doc
            .extract_text(&pages)
            .map_err(|e| OrchestratorError::Normalization(format!("pdf text extraction: {e}")))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(OrchestratorError::Normalization(
                "pdf contained no extractable text".into(),
            ));
        }
        Ok(truncate_chars(text, self.config.document_char_budget))
    }
}

/// Sniff the media type from image magic bytes.
fn sniff_image_media_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(b"GIF8") {
        Some("image/gif")
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Truncate to at most `budget` characters on a char boundary.
fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Wrap a document excerpt in the grounding template sent to the
/// backend.
fn document_prompt(request: &str, excerpt: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are given an excerpt of a document. Answer the request using only \
         the excerpt; do not invent facts that are not in it. Give a complete, \
         multi-sentence answer; do not stop after a single sentence.\n\n",
    );
    prompt.push_str("## Request\n");
    prompt.push_str(request);
    prompt.push_str("\n\n## Document excerpt\n");
    prompt.push_str(excerpt);
    prompt
}
