//! Orchestrator configuration.
//!
//! Every threshold the routing/retry/validation logic depends on lives
//! here as a tunable, with env overrides (`MODELMUX_*`) over built-in
//! defaults. The numeric defaults are operational starting points, not
//! load-bearing requirements.

use std::time::Duration;

use crate::task::TaskKind;

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Circuit breaker thresholds and cooldowns.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before a Closed breaker opens.
    pub failure_threshold: u32,
    /// Cooldown after the first opening, before a HalfOpen probe.
    pub base_cooldown: Duration,
    /// Cap on the exponentially doubled cooldown.
    pub cooldown_cap: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: env_u32("MODELMUX_BREAKER_THRESHOLD", 3),
            base_cooldown: Duration::from_secs(env_u64("MODELMUX_BREAKER_COOLDOWN_SECS", 30)),
            cooldown_cap: Duration::from_secs(env_u64("MODELMUX_BREAKER_COOLDOWN_CAP_SECS", 300)),
        }
    }
}

/// Dispatch loop bounds.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum distinct models tried per request.
    pub max_model_attempts: u32,
    /// Budget multiplier for the single amended retry (strictly > 1).
    pub retry_budget_multiplier: u32,
    /// Minimum remaining deadline worth spending on another attempt.
    pub min_remaining: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_model_attempts: env_u32("MODELMUX_MAX_MODEL_ATTEMPTS", 2),
            retry_budget_multiplier: env_u32("MODELMUX_RETRY_BUDGET_MULTIPLIER", 2).max(2),
            min_remaining: Duration::from_millis(env_u64("MODELMUX_MIN_REMAINING_MS", 2_000)),
        }
    }
}

/// Response validator length floors, in characters.
///
/// The floors are tuned conservatively low: a false reject costs one
/// retry, a false accept leaks a truncated answer.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Floor for chat-class responses.
    pub chat_floor: usize,
    /// Floor for long-form (document/code) responses.
    pub long_form_floor: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            chat_floor: env_usize("MODELMUX_CHAT_FLOOR", 20),
            long_form_floor: env_usize("MODELMUX_LONG_FORM_FLOOR", 80),
        }
    }
}

impl ValidatorConfig {
    /// Absolute length floor for a task kind.
    pub fn floor(&self, kind: TaskKind) -> usize {
        if kind.is_long_form() {
            self.long_form_floor
        } else {
            self.chat_floor
        }
    }

    /// Length below which a missing terminal punctuation mark counts as
    /// a mid-sentence truncation.
    pub fn expected_min(&self, kind: TaskKind) -> usize {
        self.floor(kind) * 2
    }
}

/// Multimodal normalizer bounds.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Maximum accepted image size in bytes.
    pub image_byte_cap: usize,
    /// Character budget for extracted document text. Large enough that
    /// the backend has real material to answer from, not a one-line
    /// preview.
    pub document_char_budget: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            image_byte_cap: env_usize("MODELMUX_IMAGE_BYTE_CAP", 8 * 1024 * 1024),
            document_char_budget: env_usize("MODELMUX_DOCUMENT_CHAR_BUDGET", 6_000),
        }
    }
}

/// Per-kind default token budgets. A model profile may override these
/// per task via its own table.
#[derive(Debug, Clone)]
pub struct TokenBudgets {
    pub chat: u32,
    pub vision: u32,
    pub long_form: u32,
    pub search: u32,
    pub financial_modeling: u32,
    pub generation: u32,
}

impl Default for TokenBudgets {
    fn default() -> Self {
        Self {
            chat: env_u32("MODELMUX_BUDGET_CHAT", 1_024),
            vision: env_u32("MODELMUX_BUDGET_VISION", 2_048),
            long_form: env_u32("MODELMUX_BUDGET_LONG_FORM", 4_096),
            search: env_u32("MODELMUX_BUDGET_SEARCH", 1_024),
            financial_modeling: env_u32("MODELMUX_BUDGET_FINANCIAL", 2_048),
            generation: env_u32("MODELMUX_BUDGET_GENERATION", 256),
        }
    }
}

impl TokenBudgets {
    /// Default budget for a task kind.
    pub fn budget(&self, kind: TaskKind) -> u32 {
        match kind {
            TaskKind::Chat => self.chat,
            TaskKind::Vision => self.vision,
            TaskKind::DocumentAnalysis | TaskKind::Code => self.long_form,
            TaskKind::Search => self.search,
            TaskKind::FinancialModeling => self.financial_modeling,
            TaskKind::ImageGeneration | TaskKind::VideoGeneration => self.generation,
        }
    }
}

/// Backend endpoint addresses for the HTTP adapters.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Base URL of the text/code/document completion backend.
    pub text_url: String,
    /// Base URL of the vision completion backend.
    pub vision_url: String,
    /// Base URL of the image/video generation job backend.
    pub generation_url: String,
    /// Bearer token, if the backends require one.
    pub api_key: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            text_url: std::env::var("MODELMUX_TEXT_URL")
                .unwrap_or_else(|_| "http://localhost:8080/v1".into()),
            vision_url: std::env::var("MODELMUX_VISION_URL")
                .unwrap_or_else(|_| "http://localhost:8080/v1".into()),
            generation_url: std::env::var("MODELMUX_GENERATION_URL")
                .unwrap_or_else(|_| "http://localhost:8090".into()),
            api_key: std::env::var("MODELMUX_API_KEY").ok(),
        }
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub breaker: BreakerConfig,
    pub dispatch: DispatchConfig,
    pub validator: ValidatorConfig,
    pub normalizer: NormalizerConfig,
    pub budgets: TokenBudgets,
    pub endpoints: EndpointConfig,
}
