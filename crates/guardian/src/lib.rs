//! On-device content risk monitoring.
//!
//! Turns observed screen content into parent-facing alerts without flooding
//! the parent with noise:
//!
//! - [`scoring`] maps text and images to a suspicion score
//! - [`store`] keeps detected incidents with snapshot persistence
//! - [`decider`] throttles alerts by frequency, diversity, and confidence
//! - [`triage`] runs the pipeline and hands accepted alerts to [`notify`]
//!
//! # Usage
//!
//! ```no_run
//! use guardian::{ContentSignal, Guardian, GuardianConfig};
//!
//! # async fn run() -> guardian::Result<()> {
//! let config = GuardianConfig::load(None).await?;
//! let guardian = Guardian::start(config).await?;
//!
//! let outcome = guardian
//!     .triage()
//!     .handle(ContentSignal::text("nie mów rodzicom"))
//!     .await;
//! println!("alerted: {}", outcome.alerted());
//!
//! guardian.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decider;
pub mod error;
pub mod incident;
pub mod scoring;
pub mod service;
pub mod settings;
pub mod sink;
pub mod storage;
pub mod store;
pub mod triage;

pub use config::{ChannelsConfig, GuardianConfig, RetentionConfig, MAX_RETENTION_HOURS};
pub use decider::{AlertDecider, AlertDecision};
pub use error::{GuardianError, Result};
pub use incident::{compute_severity, severity_weight, DeviceInfo, Incident, Severity};
pub use scoring::{
    AnalysisResult, CapabilityError, ImageFrame, SignalScorer, TextExtractor, TextScore,
    ThreatCategory, ViolenceClassifier, VisualScore,
};
pub use service::Guardian;
pub use settings::{AlertSettings, SettingsManager};
pub use sink::{NotificationSink, TracingSink};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::{IncidentStatistics, IncidentStore, TermCount};
pub use triage::{ContentSignal, IncidentTriage, TriageOutcome};
