//! Router/Dispatcher: picks a healthy candidate model for a task,
//! invokes it under the request deadline, and runs the bounded retry
//! state machine around the response validator.
//!
//! Retry shape, per request:
//!
//! ```text
//! candidate 1 ── backend error ──▶ candidate 2 ── … (max distinct models)
//!      │
//!      └─ response rejected ──▶ one amended retry, same model,
//!                               strictly larger budget ──▶ Accept | Fail
//! ```
//!
//! Per-request attempts are strictly sequential; the only shared state
//! touched is the breaker bank, exactly one breaker update per attempt.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, BackendSet, Facet, GenerationParams};
use crate::breaker::{Admission, BreakerBank, CircuitState};
use crate::classifier::classify;
use crate::config::{DispatchConfig, OrchestratorConfig, TokenBudgets};
use crate::error::OrchestratorError;
use crate::normalizer::{NormalizedPayload, Normalizer};
use crate::registry::{ModelProfile, ModelRegistry};
use crate::task::{Attachment, AttemptOutcome, Completion, DispatchAttempt, TaskRequest};
use crate::validator::{ResponseValidator, Verdict};

/// Prepended to the amended-retry prompt after an incomplete response.
const CONTINUATION_PREAMBLE: &str = "Your previous answer was cut off before it was complete. \
    Answer again in full, in one response, and do not stop mid-sentence.\n\n";

/// The orchestrator: classify → normalize → dispatch → validate.
///
/// Cheap to share behind an `Arc`; every `submit` runs its own pipeline
/// and synchronizes with other requests only at the breaker bank.
pub struct Orchestrator {
    registry: ModelRegistry,
    backends: BackendSet,
    breakers: Arc<BreakerBank>,
    normalizer: Normalizer,
    validator: ResponseValidator,
    budgets: TokenBudgets,
    dispatch: DispatchConfig,
}

impl Orchestrator {
    /// Build the orchestrator, failing fast on a misconfigured catalog:
    /// every task kind needs a candidate and every declared capability
    /// needs a registered backend facet.
    pub fn new(
        config: OrchestratorConfig,
        registry: ModelRegistry,
        backends: BackendSet,
    ) -> Result<Self, OrchestratorError> {
        registry.validate()?;
        for profile in registry.profiles() {
            for &kind in &profile.capabilities {
                if !backends.supports(&profile.id, kind) {
                    return Err(OrchestratorError::Config(format!(
                        "model '{}' declares '{kind}' but no backend facet is registered",
                        profile.id
                    )));
                }
            }
        }

        Ok(Self {
            registry,
            backends,
            breakers: Arc::new(BreakerBank::new(config.breaker)),
            normalizer: Normalizer::new(config.normalizer),
            validator: ResponseValidator::new(config.validator),
            budgets: config.budgets,
            dispatch: config.dispatch,
        })
    }

    /// The breaker bank, shared for observability and tests.
    pub fn breakers(&self) -> &BreakerBank {
        &self.breakers
    }

    /// Accept one inbound task: classify it, normalize attachments, and
    /// dispatch within `deadline`.
    pub async fn submit(
        &self,
        text: &str,
        attachments: Vec<Attachment>,
        deadline: Duration,
    ) -> Result<Completion, OrchestratorError> {
        let kind = classify(text, &attachments);
        let request = TaskRequest {
            id: Uuid::new_v4(),
            kind,
            text: text.to_string(),
            attachments,
            deadline: Instant::now() + deadline,
        };
        info!(id = %request.id, kind = %kind, "request classified");

        let payload = self
            .normalizer
            .normalize(kind, &request.text, &request.attachments)?;

        self.dispatch(&request, &payload).await
    }

    /// Route a classified, normalized request to a backend and run the
    /// bounded retry loop.
    pub async fn dispatch(
        &self,
        request: &TaskRequest,
        payload: &NormalizedPayload,
    ) -> Result<Completion, OrchestratorError> {
        let candidates = self.registry.candidates(request.kind);
        let mut excluded: Vec<String> = Vec::new();
        let mut attempts: Vec<DispatchAttempt> = Vec::new();
        let mut last_error: Option<OrchestratorError> = None;

        while (excluded.len() as u32) < self.dispatch.max_model_attempts {
            if self.remaining(request) < self.dispatch.min_remaining {
                return Err(OrchestratorError::DeadlineExceeded);
            }

            let Some((profile, is_probe)) = self.admit_next(&candidates, &excluded) else {
                // No candidate passed the breaker filter. If we already
                // burned an attempt, the caller gets that classification.
                return Err(last_error.unwrap_or(OrchestratorError::AllBackendsUnavailable));
            };

            let budget = profile
                .max_output_tokens
                .get(&request.kind)
                .copied()
                .unwrap_or_else(|| self.budgets.budget(request.kind));

            debug!(
                id = %request.id,
                model = %profile.id,
                budget,
                probe = is_probe,
                "dispatching attempt"
            );

            match self
                .try_once(request, payload, profile, payload.prompt(), budget, &mut attempts)
                .await
            {
                Ok(text) => {
                    return self
                        .finish_or_retry(request, payload, profile, budget, text, attempts)
                        .await;
                }
                // Timeout/transport failures feed the breaker and fail
                // over; anything else propagates untouched.
                Err(err) if err.is_retriable() => {
                    self.breakers.record_failure(&profile.id);
                    warn!(
                        id = %request.id,
                        model = %profile.id,
                        error = %err,
                        "attempt failed, excluding model"
                    );
                    excluded.push(profile.id.clone());
                    last_error = Some(err);
                }
                Err(err) => {
                    // Aborting with the probe slot still claimed would
                    // pin this model at Deny with no outcome to free it.
                    if is_probe {
                        self.breakers.release_probe(&profile.id);
                    }
                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or(OrchestratorError::AllBackendsUnavailable))
    }

    /// Candidate selection under the breaker filter: Closed candidates
    /// in registry order first; only when none admits, a single HalfOpen
    /// probe. A probe already in flight means fall to the next candidate
    /// rather than wait.
    fn admit_next<'a>(
        &self,
        candidates: &[&'a ModelProfile],
        excluded: &[String],
    ) -> Option<(&'a ModelProfile, bool)> {
        let eligible = || {
            candidates
                .iter()
                .filter(|p| !excluded.contains(&p.id))
                .copied()
        };

        for profile in eligible() {
            if self.breakers.state(&profile.id) == CircuitState::Closed
                && matches!(self.breakers.admit(&profile.id), Admission::Allow)
            {
                return Some((profile, false));
            }
        }

        for profile in eligible() {
            match self.breakers.admit(&profile.id) {
                Admission::Allow => return Some((profile, false)),
                Admission::AllowProbe => return Some((profile, true)),
                Admission::Deny => {}
            }
        }

        None
    }

    /// Validate a structurally successful response; on rejection, run
    /// exactly one amended retry against the same model with a strictly
    /// larger budget, then accept or give up.
    async fn finish_or_retry(
        &self,
        request: &TaskRequest,
        payload: &NormalizedPayload,
        profile: &ModelProfile,
        budget: u32,
        text: String,
        mut attempts: Vec<DispatchAttempt>,
    ) -> Result<Completion, OrchestratorError> {
        // Generation jobs return a handle, not prose, so there is nothing to validate.
        if request.kind.is_generation() {
            self.breakers.record_success(&profile.id);
            return Ok(self.completion(request, profile, text, &attempts));
        }

        let reason = match self.validator.validate(request.kind, &text) {
            Verdict::Accept => {
                self.breakers.record_success(&profile.id);
                return Ok(self.completion(request, profile, text, &attempts));
            }
            Verdict::Reject(reason) => reason,
        };

        self.breakers.record_failure(&profile.id);
        if let Some(attempt) = attempts.last_mut() {
            attempt.outcome = AttemptOutcome::RejectedIncomplete;
        }
        warn!(
            id = %request.id,
            model = %profile.id,
            reason = %reason,
            "response rejected, issuing amended retry"
        );

        if self.remaining(request) < self.dispatch.min_remaining {
            return Err(OrchestratorError::DeadlineExceeded);
        }

        let retry_budget = budget.saturating_mul(self.dispatch.retry_budget_multiplier);
        let amended_prompt = format!("{CONTINUATION_PREAMBLE}{}", payload.prompt());

        let text = match self
            .try_once(request, payload, profile, &amended_prompt, retry_budget, &mut attempts)
            .await
        {
            Ok(text) => text,
            Err(err) => {
                if err.is_retriable() {
                    self.breakers.record_failure(&profile.id);
                }
                return Err(err);
            }
        };

        match self.validator.validate(request.kind, &text) {
            Verdict::Accept => {
                self.breakers.record_success(&profile.id);
                Ok(self.completion(request, profile, text, &attempts))
            }
            Verdict::Reject(reason) => {
                self.breakers.record_failure(&profile.id);
                if let Some(attempt) = attempts.last_mut() {
                    attempt.outcome = AttemptOutcome::RejectedIncomplete;
                }
                Err(OrchestratorError::ResponseIncomplete { reason })
            }
        }
    }

    /// One backend call through the facet matching the task kind,
    /// bounded by min(model timeout, remaining deadline).
    async fn try_once(
        &self,
        request: &TaskRequest,
        payload: &NormalizedPayload,
        profile: &ModelProfile,
        prompt: &str,
        budget: u32,
        attempts: &mut Vec<DispatchAttempt>,
    ) -> Result<String, OrchestratorError> {
        let call_timeout = profile.timeout.min(self.remaining(request));
        let started_at = Instant::now();

        let result = match Facet::for_kind(request.kind) {
            Facet::Text => {
                let backend = self.backends.text(&profile.id).ok_or_else(|| {
                    OrchestratorError::Config(format!("no text facet for '{}'", profile.id))
                })?;
                self.bounded(call_timeout, backend.generate(prompt, budget, call_timeout))
                    .await
            }
            Facet::Vision => {
                let NormalizedPayload::Vision { image, .. } = payload else {
                    return Err(OrchestratorError::Normalization(
                        "vision dispatch without an encoded image".into(),
                    ));
                };
                let backend = self.backends.vision(&profile.id).ok_or_else(|| {
                    OrchestratorError::Config(format!("no vision facet for '{}'", profile.id))
                })?;
                self.bounded(
                    call_timeout,
                    backend.generate_vision(prompt, image, budget, call_timeout),
                )
                .await
            }
            Facet::Generation => {
                let backend = self.backends.generation(&profile.id).ok_or_else(|| {
                    OrchestratorError::Config(format!("no generation facet for '{}'", profile.id))
                })?;
                let params = GenerationParams { kind: request.kind };
                self.bounded(
                    call_timeout,
                    async move {
                        backend
                            .submit_generation_job(prompt, &params)
                            .await
                            .map(|handle| handle.id)
                    },
                )
                .await
            }
        };

        let outcome = match &result {
            Ok(_) => AttemptOutcome::Success,
            Err(BackendError::Timeout) => AttemptOutcome::Timeout,
            Err(BackendError::Transport(_)) => AttemptOutcome::Transport,
        };
        attempts.push(DispatchAttempt {
            model_id: profile.id.clone(),
            prompt_used: prompt.to_string(),
            token_budget: budget,
            started_at,
            outcome,
        });
        debug!(
            id = %request.id,
            model = %profile.id,
            outcome = %outcome,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "attempt finished"
        );

        result.map_err(|e| match e {
            BackendError::Timeout => OrchestratorError::BackendTimeout {
                model: profile.id.clone(),
            },
            BackendError::Transport(message) => OrchestratorError::BackendTransport {
                model: profile.id.clone(),
                message,
            },
        })
    }

    /// Enforce the call timeout over the backend future, so a hung
    /// collaborator cannot outlive the request deadline.
    async fn bounded<T>(
        &self,
        timeout: Duration,
        fut: impl std::future::Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout),
        }
    }

    fn remaining(&self, request: &TaskRequest) -> Duration {
        request.deadline.saturating_duration_since(Instant::now())
    }

    fn completion(
        &self,
        request: &TaskRequest,
        profile: &ModelProfile,
        text: String,
        attempts: &[DispatchAttempt],
    ) -> Completion {
        let attempt_count = attempts.len() as u32;
        info!(
            id = %request.id,
            kind = %request.kind,
            model = %profile.id,
            attempt_count,
            "request completed"
        );
        Completion {
            text,
            kind: request.kind,
            model_used: profile.id.clone(),
            attempt_count,
        }
    }
}
