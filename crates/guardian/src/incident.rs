//! Incident records and severity classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::terms::{HIGH_RISK_TERMS, MEDIUM_RISK_TERMS};
use crate::scoring::AnalysisResult;

const HIGH_RISK_WEIGHT: f32 = 0.4;
const MEDIUM_RISK_WEIGHT: f32 = 0.2;
const GENERIC_TERM_WEIGHT: f32 = 0.1;

/// Incident severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Lower weight boundary of this severity band.
    #[must_use]
    pub const fn weight(&self) -> f32 {
        match self {
            Self::Low => 0.0,
            Self::Medium => 0.4,
            Self::High => 0.6,
            Self::Critical => 0.8,
        }
    }

    /// Band containing `weight`. Weights above 1.0 are Critical.
    #[must_use]
    pub fn from_weight(weight: f32) -> Self {
        [Self::Critical, Self::High, Self::Medium]
            .into_iter()
            .find(|s| crate::scoring::at_least(weight, s.weight()))
            .unwrap_or(Self::Low)
    }

    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    /// Delivery priority for alerts about an incident of this severity.
    #[must_use]
    pub const fn priority(&self) -> notify::Priority {
        match self {
            Self::Low => notify::Priority::Low,
            Self::Medium => notify::Priority::Normal,
            Self::High => notify::Priority::High,
            Self::Critical => notify::Priority::Critical,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unbounded severity weight: confidence plus a per-term increment.
pub fn severity_weight(matched_terms: &[String], confidence: f32) -> f32 {
    matched_terms.iter().fold(confidence, |weight, term| {
        let term = term.to_lowercase();
        let increment = if HIGH_RISK_TERMS.contains(&term.as_str()) {
            HIGH_RISK_WEIGHT
        } else if MEDIUM_RISK_TERMS.contains(&term.as_str()) {
            MEDIUM_RISK_WEIGHT
        } else {
            GENERIC_TERM_WEIGHT
        };
        weight + increment
    })
}

/// Severity of a detection. Pure in its inputs.
pub fn compute_severity(matched_terms: &[String], confidence: f32) -> Severity {
    Severity::from_weight(severity_weight(matched_terms, confidence))
}

/// Monitored device identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            id: "local".to_string(),
            name: "This device".to_string(),
        }
    }
}

/// A persisted detection.
///
/// Only `reviewed` changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub device_id: String,
    pub device_name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub matched_terms: Vec<String>,
    pub description: String,
    pub confidence: f32,
    #[serde(default)]
    pub extracted_text: Option<String>,
    pub severity: Severity,
    #[serde(default)]
    pub reviewed: bool,
}

impl Incident {
    /// Build an incident from an analysis, computing its severity.
    pub fn from_analysis(analysis: &AnalysisResult, device: &DeviceInfo, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: new_incident_id(timestamp),
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            timestamp,
            matched_terms: analysis.matched_terms.clone(),
            description: analysis.description.clone(),
            confidence: analysis.confidence,
            extracted_text: analysis.extracted_text.clone(),
            severity: compute_severity(&analysis.matched_terms, analysis.confidence),
            reviewed: false,
        }
    }

    /// Whether the incident shares at least one matched term with `other`.
    pub fn shares_term_with(&self, other: &Incident) -> bool {
        self.matched_terms
            .iter()
            .any(|t| other.matched_terms.contains(t))
    }
}

/// Millisecond timestamp prefix keeps ids roughly time-ordered; the random
/// suffix keeps them unique.
fn new_incident_id(timestamp: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("inc-{}-{}", timestamp.timestamp_millis(), &suffix[..12])
}
