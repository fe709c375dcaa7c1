//! Alert throttling.
//!
//! Decides whether a fresh incident interrupts a parent. The checks run in a
//! fixed order and the first definitive answer wins:
//!
//! 1. severity floor (reject)
//! 2. per-term frequency cap (reject)
//! 3. term diversity override (accept)
//! 4. novelty (accept)
//! 5. high confidence override (accept)
//! 6. otherwise reject

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::incident::Incident;
use crate::scoring::at_least;
use crate::settings::AlertSettings;

/// Outcome of [`AlertDecider::should_notify`] with the check that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "camelCase")]
pub enum AlertDecision {
    BelowSeverityFloor,
    FrequencyCapped { term: String },
    DiversityOverride,
    Novel,
    HighConfidence,
    FilteringDisabled,
    Repetitive,
}

impl AlertDecision {
    /// Whether the incident should be delivered.
    #[must_use]
    pub const fn is_accept(&self) -> bool {
        matches!(
            self,
            Self::DiversityOverride | Self::Novel | Self::HighConfidence | Self::FilteringDisabled
        )
    }

    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::BelowSeverityFloor => "severity below configured floor".to_string(),
            Self::FrequencyCapped { term } => format!("term '{term}' alerted too often"),
            Self::DiversityOverride => "many distinct recent threats".to_string(),
            Self::Novel => "first occurrence of this signal".to_string(),
            Self::HighConfidence => "confidence above override threshold".to_string(),
            Self::FilteringDisabled => "smart filtering disabled".to_string(),
            Self::Repetitive => "repeat of a recent low-confidence signal".to_string(),
        }
    }
}

impl std::fmt::Display for AlertDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verdict = if self.is_accept() { "notify" } else { "suppress" };
        write!(f, "{verdict}: {}", self.reason())
    }
}

/// Stateless, read-only over its inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertDecider;

impl AlertDecider {
    pub fn new() -> Self {
        Self
    }

    /// Decide against one consistent snapshot of recent incidents.
    ///
    /// `recent` may contain incidents outside the frequency window or the
    /// incident itself; both are ignored.
    pub fn should_notify(
        &self,
        incident: &Incident,
        recent: &[Incident],
        settings: &AlertSettings,
        now: DateTime<Utc>,
    ) -> AlertDecision {
        let decision = decide(incident, recent, settings, now);
        debug!(
            incident_id = %incident.id,
            severity = %incident.severity,
            confidence = incident.confidence,
            decision = ?decision,
            "Alert decision"
        );
        decision
    }
}

fn decide(
    incident: &Incident,
    recent: &[Incident],
    settings: &AlertSettings,
    now: DateTime<Utc>,
) -> AlertDecision {
    if !at_least(incident.severity.weight(), settings.min_severity_weight) {
        return AlertDecision::BelowSeverityFloor;
    }

    if !settings.smart_filtering_enabled {
        return AlertDecision::FilteringDisabled;
    }

    let cutoff = now - settings.frequency_window();
    let window: Vec<&Incident> = recent
        .iter()
        .filter(|i| i.id != incident.id && i.timestamp >= cutoff)
        .collect();

    let mut term_counts: HashMap<&str, u32> = HashMap::new();
    for previous in &window {
        for term in &previous.matched_terms {
            *term_counts.entry(term.as_str()).or_insert(0) += 1;
        }
    }
    if let Some(term) = incident
        .matched_terms
        .iter()
        .find(|t| term_counts.get(t.as_str()).copied().unwrap_or(0) >= settings.max_term_frequency)
    {
        return AlertDecision::FrequencyCapped { term: term.clone() };
    }

    let distinct: HashSet<&str> = window
        .iter()
        .flat_map(|i| i.matched_terms.iter().map(String::as_str))
        .collect();
    let shares_recent_term = incident
        .matched_terms
        .iter()
        .any(|t| distinct.contains(t.as_str()));

    if distinct.len() >= settings.min_term_diversity as usize && shares_recent_term {
        return AlertDecision::DiversityOverride;
    }

    if !window.iter().any(|previous| incident.shares_term_with(previous)) {
        return AlertDecision::Novel;
    }

    if at_least(incident.confidence, settings.high_confidence_threshold) {
        return AlertDecision::HighConfidence;
    }

    AlertDecision::Repetitive
}
