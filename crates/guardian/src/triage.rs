//! Detection-to-notification orchestration.
//!
//! A signal is scored, suspicious results become incidents, and the alert
//! decider chooses which incidents reach the delivery queue.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use notify::{DeliveryQueue, MessageKind, Priority, SendOutcome};
use serde::Serialize;
use tracing::{debug, info};

use crate::decider::{AlertDecider, AlertDecision};
use crate::incident::{DeviceInfo, Incident};
use crate::scoring::{AnalysisResult, ImageFrame, SignalScorer};
use crate::settings::SettingsManager;
use crate::sink::{confidence_percent, NotificationSink, TracingSink};
use crate::store::{IncidentStatistics, IncidentStore};

/// Extracted text shown in an alert body, in characters.
const ALERT_EXCERPT_CHARS: usize = 200;

/// Raw observed content. Transient, never stored.
#[derive(Debug, Clone, Default)]
pub struct ContentSignal {
    pub text: String,
    pub image: Option<ImageFrame>,
}

impl ContentSignal {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn image(frame: ImageFrame) -> Self {
        Self {
            text: String::new(),
            image: Some(frame),
        }
    }

    #[must_use]
    pub fn with_image(mut self, frame: ImageFrame) -> Self {
        self.image = Some(frame);
        self
    }
}

/// What happened to one signal.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageOutcome {
    pub analysis: AnalysisResult,
    /// Present when the signal was suspicious and stored.
    pub incident: Option<Incident>,
    pub decision: Option<AlertDecision>,
    /// Present when the decider accepted the incident.
    #[serde(skip)]
    pub delivery: Option<SendOutcome>,
}

impl TriageOutcome {
    /// Whether an alert was handed to the delivery queue.
    pub fn alerted(&self) -> bool {
        self.delivery.is_some()
    }
}

/// Pipeline entry point.
pub struct IncidentTriage {
    scorer: SignalScorer,
    store: Arc<IncidentStore>,
    settings: Arc<SettingsManager>,
    decider: AlertDecider,
    delivery: Arc<DeliveryQueue>,
    sink: Arc<dyn NotificationSink>,
    device: DeviceInfo,
}

impl IncidentTriage {
    pub fn new(
        scorer: SignalScorer,
        store: Arc<IncidentStore>,
        settings: Arc<SettingsManager>,
        delivery: Arc<DeliveryQueue>,
        device: DeviceInfo,
    ) -> Self {
        Self {
            scorer,
            store,
            settings,
            decider: AlertDecider::new(),
            delivery,
            sink: Arc::new(TracingSink),
            device,
        }
    }

    /// Replace the local notification sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn store(&self) -> &Arc<IncidentStore> {
        &self.store
    }

    pub fn settings(&self) -> &Arc<SettingsManager> {
        &self.settings
    }

    pub fn delivery(&self) -> &Arc<DeliveryQueue> {
        &self.delivery
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Score a signal and triage the result.
    pub async fn handle(&self, signal: ContentSignal) -> TriageOutcome {
        let analysis = self.scorer.analyze(&signal.text, signal.image.as_ref());
        if !analysis.is_suspicious {
            debug!(confidence = analysis.confidence, "Signal not suspicious");
            return TriageOutcome {
                analysis,
                incident: None,
                decision: None,
                delivery: None,
            };
        }
        self.record(analysis).await
    }

    /// Persist an analysis as an incident and alert if the decider agrees.
    pub async fn record(&self, analysis: AnalysisResult) -> TriageOutcome {
        let now = Utc::now();
        let incident = Incident::from_analysis(&analysis, &self.device, now);

        // Settings and history are read once so the decision sees one
        // consistent view. History excludes the new incident.
        let settings = self.settings.current();
        let recent = self.store.since(now - settings.frequency_window()).await;

        self.store.add(incident.clone()).await;
        info!(
            incident_id = %incident.id,
            severity = %incident.severity,
            confidence = incident.confidence,
            terms = ?incident.matched_terms,
            "Incident recorded"
        );

        let decision = self.decider.should_notify(&incident, &recent, &settings, now);
        let delivery = if decision.is_accept() {
            Some(self.alert(&incident).await)
        } else {
            debug!(incident_id = %incident.id, reason = %decision.reason(), "Alert suppressed");
            None
        };

        TriageOutcome {
            analysis,
            incident: Some(incident),
            decision: Some(decision),
            delivery,
        }
    }

    async fn alert(&self, incident: &Incident) -> SendOutcome {
        let title = alert_title(incident);
        let body = alert_body(incident);

        self.sink
            .present(&title, &incident.description, confidence_percent(incident.confidence));

        let outcome = self
            .delivery
            .send(MessageKind::Incident, incident.severity.priority(), &title, &body, false)
            .await;
        info!(incident_id = %incident.id, outcome = ?outcome, "Alert dispatched");
        outcome
    }

    /// Send the incident statistics through the delivery queue.
    pub async fn send_summary(&self) -> SendOutcome {
        let stats = self.store.statistics().await;
        let body = summary_body(&stats, &self.device);
        self.delivery
            .send(MessageKind::Summary, Priority::Normal, "Activity summary", &body, false)
            .await
    }
}

fn alert_title(incident: &Incident) -> String {
    format!("{} risk detected on {}", incident.severity, incident.device_name)
}

fn alert_body(incident: &Incident) -> String {
    let mut body = format!(
        "{}\nConfidence: {}%",
        incident.description,
        confidence_percent(incident.confidence)
    );
    if !incident.matched_terms.is_empty() {
        let _ = write!(body, "\nMatched: {}", incident.matched_terms.join(", "));
    }
    if let Some(text) = &incident.extracted_text {
        let excerpt: String = text.chars().take(ALERT_EXCERPT_CHARS).collect();
        let ellipsis = if text.chars().count() > ALERT_EXCERPT_CHARS { "..." } else { "" };
        let _ = write!(body, "\nText: \"{excerpt}{ellipsis}\"");
    }
    let _ = write!(body, "\nIncident: {}", incident.id);
    body
}

fn summary_body(stats: &IncidentStatistics, device: &DeviceInfo) -> String {
    let mut body = format!(
        "Device: {}\nLast 24h: {}\nLast 7 days: {}\nUnreviewed: {}\nAverage confidence: {}%",
        device.name,
        stats.last_24h,
        stats.last_7d,
        stats.unreviewed,
        confidence_percent(stats.average_confidence)
    );
    if !stats.by_severity.is_empty() {
        let counts: Vec<String> = stats
            .by_severity
            .iter()
            .rev()
            .map(|(severity, count)| format!("{severity} {count}"))
            .collect();
        let _ = write!(body, "\nBy severity: {}", counts.join(", "));
    }
    if !stats.top_terms.is_empty() {
        let terms: Vec<String> = stats
            .top_terms
            .iter()
            .map(|t| format!("{} ({})", t.term, t.count))
            .collect();
        let _ = write!(body, "\nTop terms: {}", terms.join(", "));
    }
    body
}
