//! modelmux: multi-model AI request orchestrator.
//!
//! Accepts one inbound task at a time, classifies it into a closed task
//! kind, normalizes attachments, selects a backend model by capability
//! and health (per-model circuit breakers), dispatches under the
//! request deadline, validates the response for completeness, and
//! retries under a bounded policy.
//!
//! Pipeline: request → classifier → normalizer → router (registry +
//! breaker bank) → backend call → validator (may loop once back to the
//! same model with an amended prompt) → result.

pub mod backend;
pub mod breaker;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod normalizer;
pub mod registry;
pub mod task;
pub mod validator;

pub use backend::{
    BackendError, BackendSet, GenerationBackend, GenerationParams, JobHandle, TextBackend,
    VisionBackend,
};
pub use breaker::{Admission, BreakerBank, CircuitState};
pub use classifier::classify;
pub use config::OrchestratorConfig;
pub use dispatcher::Orchestrator;
pub use error::{FailureCode, OrchestratorError};
pub use normalizer::{EncodedImage, NormalizedPayload, Normalizer};
pub use registry::{ModelProfile, ModelRegistry};
pub use task::{Attachment, AttachmentKind, Completion, TaskKind, TaskRequest};
pub use validator::{ResponseValidator, Verdict};
