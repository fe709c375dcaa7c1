//! Signal scoring.
//!
//! Turns raw on-screen content into a normalized suspicion score:
//!
//! - [`text::score_text`] matches keyword lists and contact patterns
//! - [`visual::score_image`] asks an image classifier, or falls back to a
//!   colour heuristic when no model is available
//! - [`combine`] blends both into one [`AnalysisResult`]
//!
//! Everything here is pure: identical inputs always give identical results.

pub mod terms;
pub mod text;
pub mod visual;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub use text::{score_text, TextScore, ThreatCategory, TEXT_THREAT_THRESHOLD};
pub use visual::{heuristic_score, score_image, ImageFrame, ViolenceClassifier, VisualScore};

/// Blended score at or above which a signal is suspicious.
pub const COMBINED_THRESHOLD: f32 = 0.5;

const TEXT_WEIGHT: f32 = 0.6;
const VISUAL_WEIGHT: f32 = 0.4;

/// Extracted text kept on an analysis, in characters.
pub const MAX_STORED_TEXT_CHARS: usize = 500;

/// Tolerance for threshold comparisons on accumulated float weights.
const SCORE_EPSILON: f32 = 1e-5;

/// `value >= threshold`, tolerant of float accumulation error.
pub(crate) fn at_least(value: f32, threshold: f32) -> bool {
    value + SCORE_EPSILON >= threshold
}

/// Failure of an external inference capability (OCR, classifier).
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("inference failed: {0}")]
    Failed(String),
}

/// OCR capability.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, frame: &ImageFrame) -> Result<String, CapabilityError>;
}

/// Unit handed from scoring to triage. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub is_suspicious: bool,
    pub confidence: f32,
    pub category: ThreatCategory,
    pub description: String,
    pub extracted_text: Option<String>,
    pub matched_terms: Vec<String>,
    pub violence_score: f32,
    pub text_score: f32,
}

/// Blend a text score and an optional image score.
///
/// The blend is `0.6 * text + 0.4 * visual`. Confidence is the strongest of
/// the blend and the two individual scores, so a decisive single signal is
/// not diluted by a missing or neutral other one.
pub fn combine(text: &TextScore, visual: Option<&VisualScore>, source_text: &str) -> AnalysisResult {
    let visual_score = visual.map_or(0.0, |v| v.score);
    let visual_suspicious = visual.is_some_and(|v| v.is_suspicious);

    let blended = (TEXT_WEIGHT * text.score + VISUAL_WEIGHT * visual_score).clamp(0.0, 1.0);
    let confidence = blended.max(text.score).max(visual_score);

    let is_suspicious =
        text.is_suspicious || visual_suspicious || at_least(blended, COMBINED_THRESHOLD);

    let mut fragments = Vec::new();
    if !text.matched_terms.is_empty() {
        fragments.push(format!(
            "{}: {} (text {:.2})",
            text.category.label(),
            text.matched_terms.join(", "),
            text.score
        ));
    }
    if let Some(v) = visual.filter(|v| v.is_suspicious) {
        fragments.push(format!("Image: {} (image {:.2})", v.note, v.score));
    }
    let description = if fragments.is_empty() {
        "No risk signals detected".to_string()
    } else {
        fragments.join(" | ")
    };

    let category = if text.category != ThreatCategory::None {
        text.category
    } else if visual_suspicious {
        ThreatCategory::Violence
    } else {
        ThreatCategory::None
    };

    AnalysisResult {
        is_suspicious,
        confidence,
        category,
        description,
        extracted_text: truncate_text(source_text),
        matched_terms: text.matched_terms.clone(),
        violence_score: visual_score,
        text_score: text.score,
    }
}

/// Trimmed text capped at [`MAX_STORED_TEXT_CHARS`], `None` when blank.
fn truncate_text(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().count() <= MAX_STORED_TEXT_CHARS {
        return Some(text.to_string());
    }
    let mut truncated: String = text.chars().take(MAX_STORED_TEXT_CHARS).collect();
    truncated.push_str("...");
    Some(truncated)
}

/// Scoring entry point bundling the optional inference capabilities.
#[derive(Clone, Default)]
pub struct SignalScorer {
    extractor: Option<Arc<dyn TextExtractor>>,
    classifier: Option<Arc<dyn ViolenceClassifier>>,
}

impl SignalScorer {
    pub fn new(
        extractor: Option<Arc<dyn TextExtractor>>,
        classifier: Option<Arc<dyn ViolenceClassifier>>,
    ) -> Self {
        Self {
            extractor,
            classifier,
        }
    }

    pub fn score_text(&self, text: &str) -> TextScore {
        score_text(text)
    }

    pub fn score_image(&self, frame: &ImageFrame) -> VisualScore {
        score_image(frame, self.classifier.as_deref())
    }

    /// OCR the frame; failures read as no text.
    pub fn extract_text(&self, frame: &ImageFrame) -> String {
        let Some(extractor) = &self.extractor else {
            return String::new();
        };
        match extractor.extract(frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Text extraction failed, scoring without text");
                String::new()
            }
        }
    }

    /// Score text and, when present, an image.
    ///
    /// Blank text with an image triggers OCR on that image.
    pub fn analyze(&self, text: &str, image: Option<&ImageFrame>) -> AnalysisResult {
        let source = match image {
            Some(frame) if text.trim().is_empty() => self.extract_text(frame),
            _ => text.to_string(),
        };

        let text_score = self.score_text(&source);
        let visual_score = image.map(|frame| self.score_image(frame));

        combine(&text_score, visual_score.as_ref(), &source)
    }
}
