//! Response Validator: completeness check, not a quality judgment.
//!
//! A response is rejected when it is below the task's absolute length
//! floor, or when it is short of the task's expected minimum and does
//! not end in terminal punctuation (the signature of a mid-sentence
//! truncation). Everything else is accepted: false rejects cost one
//! amended retry, false accepts leak truncated answers to the caller.

use crate::config::ValidatorConfig;
use crate::task::TaskKind;

/// Verdict on a structurally successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(String),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Completeness validator, configured with per-kind length floors.
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    config: ValidatorConfig,
}

impl ResponseValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Judge whether `text` looks like a finished answer for `kind`.
    pub fn validate(&self, kind: TaskKind, text: &str) -> Verdict {
        let trimmed = text.trim_end();
        let len = trimmed.chars().count();
        let floor = self.config.floor(kind);

        if len < floor {
            return Verdict::Reject(format!(
                "response length {len} below floor {floor} for {kind}"
            ));
        }

        if len < self.config.expected_min(kind) && !ends_terminated(trimmed) {
            return Verdict::Reject(format!(
                "response of length {len} ends mid-sentence for {kind}"
            ));
        }

        Verdict::Accept
    }
}

/// Whether the text ends like a finished answer: terminal punctuation,
/// a closing quote/bracket, or a closed code fence.
fn ends_terminated(text: &str) -> bool {
    if text.ends_with("```") {
        return true;
    }
    matches!(
        text.chars().last(),
        Some('.' | '!' | '?' | '"' | '\'' | '`' | ')' | ']' | '}' | '。' | '！' | '？')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> ResponseValidator {
        ResponseValidator::new(ValidatorConfig {
            chat_floor: 20,
            long_form_floor: 80,
        })
    }

    #[test]
    fn test_below_floor_rejected() {
        let v = validator();
        let verdict = v.validate(TaskKind::DocumentAnalysis, "Too short.");
        assert!(matches!(verdict, Verdict::Reject(_)));
    }

    #[test]
    fn test_doc_floor_higher_than_chat() {
        let v = validator();
        let forty = "This answer has about forty characters.";
        assert!(v.validate(TaskKind::Chat, forty).is_accept());
        assert!(!v.validate(TaskKind::DocumentAnalysis, forty).is_accept());
    }

    #[test]
    fn test_mid_sentence_truncation_rejected() {
        let v = validator();
        // Above the chat floor but below expected minimum, no terminal mark.
        let text = "The summary begins but then it just";
        assert!(matches!(
            v.validate(TaskKind::Chat, text),
            Verdict::Reject(reason) if reason.contains("mid-sentence")
        ));
    }

    #[test]
    fn test_short_but_terminated_accepted() {
        let v = validator();
        let text = "The answer is forty-two, quite simply.";
        assert!(v.validate(TaskKind::Chat, text).is_accept());
    }

    #[test]
    fn test_long_response_accepted_regardless_of_ending() {
        let v = validator();
        let text = "word ".repeat(100);
        assert!(v.validate(TaskKind::DocumentAnalysis, &text).is_accept());
    }

    #[test]
    fn test_code_fence_counts_as_terminated() {
        let v = validator();
        let text = "Here is the function you asked for\n```rust\nfn f() {}\n```";
        assert!(v.validate(TaskKind::Chat, text).is_accept());
    }

    #[test]
    fn test_trailing_whitespace_ignored() {
        let v = validator();
        let text = "A complete sentence with an ending.   \n";
        assert!(v.validate(TaskKind::Chat, text).is_accept());
    }
}
