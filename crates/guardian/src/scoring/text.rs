//! Keyword and pattern scoring for extracted text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::at_least;
use super::terms::{
    CONTEXT_MATCH, CYBERBULLYING_TERMS, EMAIL_MATCH, GROOMING_SUBSTANCE_TERMS, MEETING_TERMS,
    PHONE_MATCH, RISKY_APP_TERMS, SECRECY_TERMS, VIOLENCE_TERMS,
};

/// Score at or above which text alone is suspicious.
pub const TEXT_THREAT_THRESHOLD: f32 = 0.6;

const THREAT_TERM_WEIGHT: f32 = 0.3;
const RISKY_APP_WEIGHT: f32 = 0.2;
const CONTEXT_BONUS: f32 = 0.4;
const PHONE_WEIGHT: f32 = 0.2;
const EMAIL_WEIGHT: f32 = 0.1;

/// 9 to 12 digits, optionally grouped as `ddd ddd ddd...`.
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}[\s-]?\d{3}[\s-]?\d{3,6}\b").unwrap());

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}").unwrap());

/// Threat category, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    Violence,
    Cyberbullying,
    RiskyApp,
    SuspiciousOther,
    None,
}

impl ThreatCategory {
    /// Human-readable label used in alert text.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Violence => "Violence / self-harm",
            Self::Cyberbullying => "Cyberbullying",
            Self::RiskyApp => "Risky application",
            Self::SuspiciousOther => "Suspicious content",
            Self::None => "None",
        }
    }
}

impl std::fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of scoring a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextScore {
    pub is_suspicious: bool,
    /// Clamped to [0, 1].
    pub score: f32,
    pub category: ThreatCategory,
    /// Matched terms in detection order, synthetic matches included.
    pub matched_terms: Vec<String>,
}

impl TextScore {
    fn empty() -> Self {
        Self {
            is_suspicious: false,
            score: 0.0,
            category: ThreatCategory::None,
            matched_terms: Vec::new(),
        }
    }
}

/// Score `text` against the fixed term lists and pattern detectors.
pub fn score_text(text: &str) -> TextScore {
    if text.trim().is_empty() {
        return TextScore::empty();
    }

    let lower = text.to_lowercase();
    let mut score = 0.0_f32;
    let mut matched_terms: Vec<String> = Vec::new();

    let mut match_list = |terms: &[&str], weight: f32| -> bool {
        let mut any = false;
        for term in terms.iter().filter(|t| lower.contains(*t)) {
            score += weight;
            matched_terms.push((*term).to_string());
            any = true;
        }
        any
    };

    let violence = match_list(VIOLENCE_TERMS, THREAT_TERM_WEIGHT);
    let bullying = match_list(CYBERBULLYING_TERMS, THREAT_TERM_WEIGHT);
    match_list(GROOMING_SUBSTANCE_TERMS, THREAT_TERM_WEIGHT);
    let risky_app = match_list(RISKY_APP_TERMS, RISKY_APP_WEIGHT);

    let has_any = |terms: &[&str]| terms.iter().any(|t| lower.contains(t));
    if has_any(MEETING_TERMS) && has_any(SECRECY_TERMS) {
        score += CONTEXT_BONUS;
        matched_terms.push(CONTEXT_MATCH.to_string());
    }

    if PHONE_PATTERN.is_match(&lower) {
        score += PHONE_WEIGHT;
        matched_terms.push(PHONE_MATCH.to_string());
    }

    if EMAIL_PATTERN.is_match(&lower) {
        score += EMAIL_WEIGHT;
        matched_terms.push(EMAIL_MATCH.to_string());
    }

    let score = score.clamp(0.0, 1.0);

    let category = if violence {
        ThreatCategory::Violence
    } else if bullying {
        ThreatCategory::Cyberbullying
    } else if risky_app {
        ThreatCategory::RiskyApp
    } else if matched_terms.is_empty() {
        ThreatCategory::None
    } else {
        ThreatCategory::SuspiciousOther
    };

    TextScore {
        is_suspicious: at_least(score, TEXT_THREAT_THRESHOLD),
        score,
        category,
        matched_terms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_empty_text_short_circuits() {
        for text in ["", "   ", "\n\t"] {
            let result = score_text(text);
            assert_eq!(result.score, 0.0);
            assert_eq!(result.category, ThreatCategory::None);
            assert!(!result.is_suspicious);
            assert!(result.matched_terms.is_empty());
        }
    }

    #[test]
    fn test_harmless_text() {
        let result = score_text("Jutro mamy sprawdzian z matematyki");
        assert_eq!(result.score, 0.0);
        assert_eq!(result.category, ThreatCategory::None);
    }

    #[test]
    fn test_single_term_below_threshold() {
        let result = score_text("ktoś ma narkotyki?");
        assert!(approx(result.score, 0.3));
        assert!(!result.is_suspicious);
        assert_eq!(result.matched_terms, vec!["narkotyki"]);
        assert_eq!(result.category, ThreatCategory::SuspiciousOther);
    }

    #[test]
    fn test_three_terms_suspicious() {
        let result = score_text("Mam narkotyki, dopalacze i marihuana na imprezę");
        assert!(approx(result.score, 0.9));
        assert!(result.is_suspicious);
        assert_eq!(result.matched_terms.len(), 3);
    }

    #[test]
    fn test_case_insensitive() {
        let result = score_text("NARKOTYKI");
        assert_eq!(result.matched_terms, vec!["narkotyki"]);
    }

    #[test]
    fn test_phone_pattern_alone() {
        let result = score_text("Zadzwoń: 123456789");
        assert!(approx(result.score, 0.2));
        assert_eq!(result.matched_terms, vec![PHONE_MATCH]);
        assert!(!result.is_suspicious);
    }

    #[test]
    fn test_phone_pattern_is_additive() {
        let result = score_text("narkotyki, zadzwoń 600 100 200");
        assert!(approx(result.score, 0.5));
        assert_eq!(result.matched_terms, vec!["narkotyki", PHONE_MATCH]);
    }

    #[test]
    fn test_short_digit_run_is_not_a_phone() {
        let result = score_text("kod 12345678");
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_email_pattern() {
        let result = score_text("napisz na Kolega.X@example.com");
        assert!(approx(result.score, 0.1));
        assert_eq!(result.matched_terms, vec![EMAIL_MATCH]);
    }

    #[test]
    fn test_context_bonus_clamps() {
        let result = score_text("spotkajmy się, to nasza tajemnica");
        assert_eq!(result.score, 1.0);
        assert!(result.is_suspicious);
        assert_eq!(
            result.matched_terms,
            vec!["spotkajmy się", "tajemnica", CONTEXT_MATCH]
        );
        assert_eq!(result.category, ThreatCategory::SuspiciousOther);
    }

    #[test]
    fn test_category_priority() {
        let result = score_text("debil, zabiję cię");
        assert_eq!(result.category, ThreatCategory::Violence);

        let result = score_text("ty debil, zainstaluj omegle");
        assert_eq!(result.category, ThreatCategory::Cyberbullying);

        let result = score_text("mam konto na tinder");
        assert_eq!(result.category, ThreatCategory::RiskyApp);
        assert!(approx(result.score, 0.2));
    }

    #[test]
    fn test_score_never_exceeds_one() {
        let text = VIOLENCE_TERMS.join(" ");
        let result = score_text(&text);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.matched_terms.len(), VIOLENCE_TERMS.len());
    }
}
