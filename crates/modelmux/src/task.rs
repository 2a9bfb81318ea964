//! Core task types: the closed task-kind taxonomy, inbound requests,
//! attachments, and the per-attempt records the dispatcher keeps.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of task categories the orchestrator routes.
///
/// The kind determines backend eligibility and the default token budget.
/// It is assigned exactly once, by the classifier, never by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Plain conversational request, the fallthrough default.
    Chat,
    /// Request accompanied by an image attachment.
    Vision,
    /// Request accompanied by a PDF/document attachment.
    DocumentAnalysis,
    /// Coding-intent request (code fences, "write a function", language keywords).
    Code,
    /// Explicit image-generation intent ("generate an image of …").
    ImageGeneration,
    /// Explicit video-generation intent ("make a video of …").
    VideoGeneration,
    /// Search-style phrasing ("find", "look up", "search for").
    Search,
    /// Finance-domain vocabulary (valuation, cash flow, portfolio …).
    FinancialModeling,
}

impl TaskKind {
    /// All kinds, in classification priority order.
    pub fn all() -> &'static [TaskKind] {
        &[
            Self::Vision,
            Self::DocumentAnalysis,
            Self::Code,
            Self::ImageGeneration,
            Self::VideoGeneration,
            Self::FinancialModeling,
            Self::Search,
            Self::Chat,
        ]
    }

    /// Whether this kind is served by the generation-job backend facet
    /// rather than a text/vision completion call.
    pub fn is_generation(self) -> bool {
        matches!(self, Self::ImageGeneration | Self::VideoGeneration)
    }

    /// Whether this kind expects long-form output (higher validator floor,
    /// larger default token budget).
    pub fn is_long_form(self) -> bool {
        matches!(self, Self::DocumentAnalysis | Self::Code)
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Vision => write!(f, "vision"),
            Self::DocumentAnalysis => write!(f, "document_analysis"),
            Self::Code => write!(f, "code"),
            Self::ImageGeneration => write!(f, "image_generation"),
            Self::VideoGeneration => write!(f, "video_generation"),
            Self::Search => write!(f, "search"),
            Self::FinancialModeling => write!(f, "financial_modeling"),
        }
    }
}

/// Attachment payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Pdf,
}

/// One inbound attachment, raw bytes plus declared type.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn image(data: Vec<u8>) -> Self {
        Self {
            kind: AttachmentKind::Image,
            data,
        }
    }

    pub fn pdf(data: Vec<u8>) -> Self {
        Self {
            kind: AttachmentKind::Pdf,
            data,
        }
    }
}

/// One inbound unit of work. Immutable after the classifier assigns `kind`.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    /// Unique request id.
    pub id: Uuid,
    /// Determined (never client-asserted) task category.
    pub kind: TaskKind,
    /// Raw request text.
    pub text: String,
    /// Ordered attachments.
    pub attachments: Vec<Attachment>,
    /// Absolute deadline for the whole pipeline.
    pub deadline: Instant,
}

/// Outcome of one backend attempt, for logging and attempt accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Timeout,
    Transport,
    RejectedIncomplete,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Timeout => write!(f, "timeout"),
            Self::Transport => write!(f, "transport"),
            Self::RejectedIncomplete => write!(f, "rejected_incomplete"),
        }
    }
}

/// Ephemeral record of one backend try. Lives only for the duration of a
/// single retry loop; not persisted.
#[derive(Debug, Clone)]
pub struct DispatchAttempt {
    pub model_id: String,
    pub prompt_used: String,
    pub token_budget: u32,
    pub started_at: Instant,
    pub outcome: AttemptOutcome,
}

/// Successful result of a dispatch, with routing metadata.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Response text (for generation kinds: the job handle id).
    pub text: String,
    /// Classified task kind.
    pub kind: TaskKind,
    /// Model that produced the accepted response.
    pub model_used: String,
    /// Total backend calls made, including the amended retry.
    pub attempt_count: u32,
}
