//! Task Classifier: maps an inbound request to a task kind.
//!
//! Rules apply in a fixed priority order; attachment presence is the
//! strongest signal of intended modality, so an image attachment wins
//! over code-looking text. Classification never fails: anything that
//! matches no rule falls through to `chat`.
//!
//! ## Rule order
//!
//! 1. image attachment        → `vision`
//! 2. pdf attachment          → `document_analysis`
//! 3. coding-intent markers   → `code`
//! 4. generation phrases      → `image_generation` / `video_generation`
//! 5. finance vocabulary      → `financial_modeling`
//! 6. search phrasing         → `search`
//! 7. fallthrough             → `chat`

use std::sync::LazyLock;

use regex::Regex;

use crate::task::{Attachment, AttachmentKind, TaskKind};

static CODE_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(fn|def|function|struct|impl|enum|trait|class|import|println!|#include|compile|refactor|debug|regex|algorithm|unit test)\b",
    )
    .unwrap()
});

static CODE_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)write (a|some|me a?) ?(function|program|script|code|method)").unwrap()
});

static IMAGE_GEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(generate|create|make|draw|produce|render)\s+(an?\s+|some\s+)?(image|picture|photo|illustration|logo|drawing|painting|artwork)\b",
    )
    .unwrap()
});

static VIDEO_GEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(generate|create|make|produce|render)\s+(an?\s+|some\s+)?(video|animation|clip|movie)\b",
    )
    .unwrap()
});

static SEARCH_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(find|look up|search for|look for|latest news|who won|current price)\b")
        .unwrap()
});

const FINANCE_VOCAB: &[&str] = &[
    "portfolio",
    "valuation",
    "cash flow",
    "dcf",
    "npv",
    "irr",
    "balance sheet",
    "income statement",
    "dividend",
    "amortization",
    "financial model",
    "revenue forecast",
    "earnings",
    "p/e ratio",
];

/// Classify a request into its task kind. Infallible.
pub fn classify(text: &str, attachments: &[Attachment]) -> TaskKind {
    if attachments.iter().any(|a| a.kind == AttachmentKind::Image) {
        return TaskKind::Vision;
    }
    if attachments.iter().any(|a| a.kind == AttachmentKind::Pdf) {
        return TaskKind::DocumentAnalysis;
    }

    if text.contains("```") || CODE_PHRASES.is_match(text) || CODE_KEYWORDS.is_match(text) {
        return TaskKind::Code;
    }

    if IMAGE_GEN.is_match(text) {
        return TaskKind::ImageGeneration;
    }
    if VIDEO_GEN.is_match(text) {
        return TaskKind::VideoGeneration;
    }

    let lower = text.to_lowercase();
    if FINANCE_VOCAB.iter().any(|v| lower.contains(v)) {
        return TaskKind::FinancialModeling;
    }

    if SEARCH_PHRASES.is_match(text) {
        return TaskKind::Search;
    }

    tracing::debug!("no classification rule matched, defaulting to chat");
    TaskKind::Chat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_attachment_always_wins() {
        let attachments = vec![Attachment::image(vec![0x89, b'P', b'N', b'G'])];
        // Even code-fenced text classifies as vision.
        assert_eq!(
            classify("```rust\nfn main() {}\n```", &attachments),
            TaskKind::Vision
        );
        assert_eq!(classify("What do you see?", &attachments), TaskKind::Vision);
    }

    #[test]
    fn test_pdf_attachment_beats_text_rules() {
        let attachments = vec![Attachment::pdf(b"%PDF-1.4".to_vec())];
        assert_eq!(
            classify("write a function summarizing this", &attachments),
            TaskKind::DocumentAnalysis
        );
    }

    #[test]
    fn test_image_beats_pdf_when_both_present() {
        let attachments = vec![
            Attachment::pdf(b"%PDF-1.4".to_vec()),
            Attachment::image(vec![0xFF, 0xD8]),
        ];
        assert_eq!(classify("describe these", &attachments), TaskKind::Vision);
    }

    #[test]
    fn test_code_fence() {
        assert_eq!(classify("```py\nprint(1)\n```", &[]), TaskKind::Code);
    }

    #[test]
    fn test_code_phrase() {
        assert_eq!(
            classify("Write a function that reverses a list", &[]),
            TaskKind::Code
        );
    }

    #[test]
    fn test_code_keyword() {
        assert_eq!(
            classify("why does my struct not implement this trait", &[]),
            TaskKind::Code
        );
    }

    #[test]
    fn test_image_generation_intent() {
        assert_eq!(
            classify("Generate an image of a dragon", &[]),
            TaskKind::ImageGeneration
        );
        assert_eq!(
            classify("please create a picture of a sunset", &[]),
            TaskKind::ImageGeneration
        );
    }

    #[test]
    fn test_video_generation_intent() {
        assert_eq!(
            classify("make a video of waves crashing", &[]),
            TaskKind::VideoGeneration
        );
    }

    #[test]
    fn test_finance_vocabulary() {
        assert_eq!(
            classify("Build a DCF valuation for this company", &[]),
            TaskKind::FinancialModeling
        );
        assert_eq!(
            classify("how should I rebalance my portfolio", &[]),
            TaskKind::FinancialModeling
        );
    }

    #[test]
    fn test_search_phrasing() {
        assert_eq!(
            classify("look up the capital of Mongolia", &[]),
            TaskKind::Search
        );
        assert_eq!(
            classify("search for flights to Lisbon", &[]),
            TaskKind::Search
        );
    }

    #[test]
    fn test_fallthrough_is_chat() {
        assert_eq!(classify("hello there", &[]), TaskKind::Chat);
        assert_eq!(classify("", &[]), TaskKind::Chat);
    }
}
