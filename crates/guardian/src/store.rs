//! In-memory incident index with snapshot persistence.
//!
//! Every mutation re-serializes the whole incident set and writes it in the
//! background. Writes are ordered by a generation counter so a slow, older
//! snapshot never overwrites a newer one.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::incident::{Incident, Severity};
use crate::storage::KeyValueStore;

/// Storage key for the incident snapshot.
pub const INCIDENTS_KEY: &str = "incidents";

/// Incidents older than this are evicted.
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Number of terms reported in [`IncidentStatistics::top_terms`].
const TOP_TERMS: usize = 5;

/// A matched term and how often it occurs across stored incidents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermCount {
    pub term: String,
    pub count: usize,
}

/// Aggregate view over the stored incidents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentStatistics {
    pub total_incidents: usize,
    pub last_24h: usize,
    pub last_7d: usize,
    pub unreviewed: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub top_terms: Vec<TermCount>,
    pub average_confidence: f32,
}

/// Indexed incident cache.
pub struct IncidentStore {
    incidents: RwLock<HashMap<String, Incident>>,
    kv: Arc<dyn KeyValueStore>,
    retention: chrono::Duration,
    generation: AtomicU64,
    /// Generation of the last snapshot written to `kv`.
    persisted: Arc<Mutex<u64>>,
}

impl IncidentStore {
    /// Create an empty store.
    pub fn new(kv: Arc<dyn KeyValueStore>, retention: chrono::Duration) -> Self {
        Self::with_incidents(kv, retention, HashMap::new())
    }

    fn with_incidents(
        kv: Arc<dyn KeyValueStore>,
        retention: chrono::Duration,
        incidents: HashMap<String, Incident>,
    ) -> Self {
        Self {
            incidents: RwLock::new(incidents),
            kv,
            retention,
            generation: AtomicU64::new(0),
            persisted: Arc::new(Mutex::new(0)),
        }
    }

    /// Load the persisted snapshot. A missing or corrupt snapshot yields an
    /// empty store.
    pub async fn load(kv: Arc<dyn KeyValueStore>, retention: chrono::Duration) -> Self {
        let incidents = match kv.load(INCIDENTS_KEY).await {
            Ok(Some(blob)) => match serde_json::from_slice::<Vec<Incident>>(&blob) {
                Ok(list) => list.into_iter().map(|i| (i.id.clone(), i)).collect(),
                Err(e) => {
                    warn!(error = %e, "Incident snapshot corrupt, starting empty");
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read incident snapshot, starting empty");
                HashMap::new()
            }
        };

        info!(count = incidents.len(), "Loaded incidents");
        Self::with_incidents(kv, retention, incidents)
    }

    /// Insert an incident and schedule a background snapshot write.
    pub async fn add(&self, incident: Incident) {
        let mut incidents = self.incidents.write().await;
        let id = incident.id.clone();
        if incidents.insert(id.clone(), incident).is_some() {
            warn!(incident_id = %id, "Replaced incident with duplicate id");
        }
        debug!(incident_id = %id, total = incidents.len(), "Incident stored");
        self.schedule_persist(&incidents);
    }

    pub async fn get(&self, id: &str) -> Option<Incident> {
        self.incidents.read().await.get(id).cloned()
    }

    /// Incidents newer than `window`, newest first.
    pub async fn recent(&self, window: chrono::Duration) -> Vec<Incident> {
        self.since(Utc::now() - window).await
    }

    /// Incidents at or after `cutoff`, newest first.
    pub async fn since(&self, cutoff: DateTime<Utc>) -> Vec<Incident> {
        let incidents = self.incidents.read().await;
        sorted_desc(incidents.values().filter(|i| i.timestamp >= cutoff))
    }

    /// Incidents from one device, newest first.
    pub async fn for_device(&self, device_id: &str) -> Vec<Incident> {
        let incidents = self.incidents.read().await;
        sorted_desc(incidents.values().filter(|i| i.device_id == device_id))
    }

    /// Incidents not yet reviewed, newest first.
    pub async fn unreviewed(&self) -> Vec<Incident> {
        let incidents = self.incidents.read().await;
        sorted_desc(incidents.values().filter(|i| !i.reviewed))
    }

    /// Mark an incident reviewed. Returns `false` if the id is unknown.
    pub async fn mark_reviewed(&self, id: &str) -> bool {
        let mut incidents = self.incidents.write().await;
        let Some(incident) = incidents.get_mut(id) else {
            return false;
        };
        if !incident.reviewed {
            incident.reviewed = true;
            info!(incident_id = %id, "Incident marked reviewed");
            self.schedule_persist(&incidents);
        }
        true
    }

    pub async fn len(&self) -> usize {
        self.incidents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.incidents.read().await.is_empty()
    }

    /// Counts, top terms, and mean confidence over the current snapshot.
    pub async fn statistics(&self) -> IncidentStatistics {
        let now = Utc::now();
        let day_ago = now - chrono::Duration::hours(24);
        let week_ago = now - chrono::Duration::days(7);

        let incidents = self.incidents.read().await;

        let mut by_severity = BTreeMap::new();
        let mut term_counts: HashMap<&str, usize> = HashMap::new();
        let mut confidence_sum = 0.0_f32;
        let mut last_24h = 0;
        let mut last_7d = 0;
        let mut unreviewed = 0;

        for incident in incidents.values() {
            if incident.timestamp >= day_ago {
                last_24h += 1;
            }
            if incident.timestamp >= week_ago {
                last_7d += 1;
            }
            if !incident.reviewed {
                unreviewed += 1;
            }
            *by_severity.entry(incident.severity).or_insert(0) += 1;
            for term in &incident.matched_terms {
                *term_counts.entry(term.as_str()).or_insert(0) += 1;
            }
            confidence_sum += incident.confidence;
        }

        let mut top_terms: Vec<TermCount> = term_counts
            .into_iter()
            .map(|(term, count)| TermCount {
                term: term.to_string(),
                count,
            })
            .collect();
        top_terms.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term.cmp(&b.term)));
        top_terms.truncate(TOP_TERMS);

        let total_incidents = incidents.len();
        let average_confidence = if total_incidents == 0 {
            0.0
        } else {
            confidence_sum / total_incidents as f32
        };

        IncidentStatistics {
            total_incidents,
            last_24h,
            last_7d,
            unreviewed,
            by_severity,
            top_terms,
            average_confidence,
        }
    }

    /// Drop incidents older than the retention window.
    pub async fn evict_expired(&self) -> usize {
        self.evict_older_than(Utc::now() - self.retention).await
    }

    /// Drop incidents strictly older than `cutoff`. Unconditional: reviewed
    /// state and severity do not matter.
    pub async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut incidents = self.incidents.write().await;
        let before = incidents.len();
        incidents.retain(|_, incident| incident.timestamp >= cutoff);
        let removed = before - incidents.len();

        if removed > 0 {
            info!(removed, remaining = incidents.len(), "Evicted expired incidents");
            self.schedule_persist(&incidents);
        }
        removed
    }

    /// Write the current snapshot and wait for it.
    pub async fn flush(&self) {
        let (generation, blob) = {
            let incidents = self.incidents.read().await;
            (self.generation.load(Ordering::Acquire), serialize_snapshot(&incidents))
        };
        if let Some(blob) = blob {
            write_snapshot(self.kv.as_ref(), &self.persisted, generation, &blob).await;
        }
    }

    /// Must be called with the index lock held so the generation matches the
    /// serialized contents.
    fn schedule_persist(&self, incidents: &HashMap<String, Incident>) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let Some(blob) = serialize_snapshot(incidents) else {
            return;
        };

        let kv = Arc::clone(&self.kv);
        let persisted = Arc::clone(&self.persisted);
        tokio::spawn(async move {
            write_snapshot(kv.as_ref(), &persisted, generation, &blob).await;
        });
    }

    /// Start the periodic retention sweep.
    pub fn spawn_retention(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.evict_expired().await;
                        debug!(removed, "Retention sweep finished");
                    }
                }
            }

            debug!("Retention sweep stopped");
        })
    }
}

fn sorted_desc<'a>(incidents: impl Iterator<Item = &'a Incident>) -> Vec<Incident> {
    let mut list: Vec<Incident> = incidents.cloned().collect();
    list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
    list
}

fn serialize_snapshot(incidents: &HashMap<String, Incident>) -> Option<Vec<u8>> {
    let mut list: Vec<&Incident> = incidents.values().collect();
    list.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

    match serde_json::to_vec(&list) {
        Ok(blob) => Some(blob),
        Err(e) => {
            error!(error = %e, "Failed to serialize incident snapshot");
            None
        }
    }
}

async fn write_snapshot(kv: &dyn KeyValueStore, persisted: &Mutex<u64>, generation: u64, blob: &[u8]) {
    let mut last = persisted.lock().await;
    if *last >= generation && generation != 0 {
        debug!(generation, last = *last, "Newer snapshot already persisted");
        return;
    }

    match kv.save(INCIDENTS_KEY, blob).await {
        Ok(()) => {
            *last = generation;
            debug!(generation, bytes = blob.len(), "Incident snapshot persisted");
        }
        Err(e) => error!(error = %e, "Failed to persist incident snapshot"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn incident(id: &str, age_minutes: i64, terms: &[&str], confidence: f32) -> Incident {
        Incident {
            id: id.to_string(),
            device_id: "tablet".to_string(),
            device_name: "Tablet".to_string(),
            timestamp: Utc::now() - chrono::Duration::minutes(age_minutes),
            matched_terms: terms.iter().map(|t| (*t).to_string()).collect(),
            description: "test".to_string(),
            confidence,
            extracted_text: None,
            severity: Severity::High,
            reviewed: false,
        }
    }

    fn store() -> (Arc<MemoryStore>, IncidentStore) {
        let kv = Arc::new(MemoryStore::new());
        let store = IncidentStore::new(kv.clone(), chrono::Duration::hours(DEFAULT_RETENTION_HOURS));
        (kv, store)
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let (_kv, store) = store();
        store.add(incident("a", 1, &["krew"], 0.7)).await;

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("a").await.unwrap().matched_terms, vec!["krew"]);
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_recent_sorted_newest_first() {
        let (_kv, store) = store();
        store.add(incident("old", 50, &[], 0.5)).await;
        store.add(incident("new", 5, &[], 0.5)).await;
        store.add(incident("mid", 20, &[], 0.5)).await;
        store.add(incident("outside", 120, &[], 0.5)).await;

        let ids: Vec<String> = store
            .recent(chrono::Duration::hours(1))
            .await
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_for_device() {
        let (_kv, store) = store();
        let mut other = incident("b", 1, &[], 0.5);
        other.device_id = "phone".to_string();
        store.add(incident("a", 1, &[], 0.5)).await;
        store.add(other).await;

        let phone = store.for_device("phone").await;
        assert_eq!(phone.len(), 1);
        assert_eq!(phone[0].id, "b");
    }

    #[tokio::test]
    async fn test_mark_reviewed() {
        let (_kv, store) = store();
        store.add(incident("a", 1, &[], 0.5)).await;

        assert!(store.mark_reviewed("a").await);
        assert!(store.get("a").await.unwrap().reviewed);
        assert!(store.unreviewed().await.is_empty());
        assert!(!store.mark_reviewed("nope").await);
    }

    #[tokio::test]
    async fn test_statistics() {
        let (_kv, store) = store();
        store.add(incident("a", 10, &["krew", "debil"], 0.4)).await;
        store.add(incident("b", 20, &["krew"], 0.8)).await;
        store.add(incident("c", 60 * 30, &["krew", "tinder"], 0.6)).await;

        let stats = store.statistics().await;
        assert_eq!(stats.total_incidents, 3);
        assert_eq!(stats.last_24h, 2);
        assert_eq!(stats.last_7d, 3);
        assert_eq!(stats.unreviewed, 3);
        assert_eq!(stats.by_severity.get(&Severity::High), Some(&3));
        assert_eq!(
            stats.top_terms[0],
            TermCount {
                term: "krew".to_string(),
                count: 3
            }
        );
        assert_eq!(stats.top_terms.len(), 3);
        assert!((stats.average_confidence - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_statistics_top_five_only() {
        let (_kv, store) = store();
        store
            .add(incident("a", 1, &["t1", "t2", "t3", "t4", "t5", "t6"], 0.5))
            .await;
        store.add(incident("b", 1, &["t6"], 0.5)).await;

        let stats = store.statistics().await;
        assert_eq!(stats.top_terms.len(), 5);
        assert_eq!(stats.top_terms[0].term, "t6");
    }

    #[tokio::test]
    async fn test_total_tracks_adds_minus_evictions() {
        let (_kv, store) = store();
        store.add(incident("fresh", 10, &[], 0.5)).await;
        store.add(incident("stale", 60 * 25, &[], 0.5)).await;
        store.add(incident("staler", 60 * 48, &[], 0.5)).await;

        let removed = store.evict_expired().await;
        assert_eq!(removed, 2);
        assert_eq!(store.statistics().await.total_incidents, 3 - removed);
    }

    #[tokio::test]
    async fn test_eviction_ignores_review_state() {
        let (_kv, store) = store();
        let mut reviewed = incident("r", 60 * 30, &[], 0.9);
        reviewed.reviewed = true;
        let mut critical = incident("c", 60 * 30, &[], 1.0);
        critical.severity = Severity::Critical;
        store.add(reviewed).await;
        store.add(critical).await;

        assert_eq!(store.evict_expired().await, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_flush_and_reload() {
        let (kv, store) = store();
        store.add(incident("a", 5, &["krew"], 0.7)).await;
        store.add(incident("b", 3, &["debil"], 0.6)).await;
        store.flush().await;

        let reloaded = IncidentStore::load(kv, chrono::Duration::hours(24)).await;
        assert_eq!(reloaded.len().await, 2);
        assert_eq!(reloaded.get("b").await.unwrap().matched_terms, vec!["debil"]);
    }

    #[tokio::test]
    async fn test_background_persist_eventually_lands() {
        let (kv, store) = store();
        store.add(incident("a", 5, &[], 0.7)).await;

        for _ in 0..50 {
            if kv.load(INCIDENTS_KEY).await.unwrap().is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let blob = kv.load(INCIDENTS_KEY).await.unwrap().unwrap();
        let list: Vec<Incident> = serde_json::from_slice(&blob).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_generation_is_not_written() {
        let kv = MemoryStore::new();
        let persisted = Mutex::new(0);

        write_snapshot(&kv, &persisted, 2, b"[\"new\"]").await;
        write_snapshot(&kv, &persisted, 1, b"[\"old\"]").await;

        assert_eq!(kv.load(INCIDENTS_KEY).await.unwrap().unwrap(), b"[\"new\"]");
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_loads_empty() {
        let kv = Arc::new(MemoryStore::new());
        kv.save(INCIDENTS_KEY, b"garbage").await.unwrap();

        let store = IncidentStore::load(kv, chrono::Duration::hours(24)).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_with_eviction_sweep() {
        const FRESH: usize = 40;
        let (kv, store) = store();
        let store = Arc::new(store);
        for i in 0..10 {
            store.add(incident(&format!("stale-{i}"), 60 * 25, &["krew"], 0.5)).await;
        }

        let adders: Vec<_> = (0..FRESH)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store.add(incident(&format!("fresh-{i}"), 1, &["debil"], 0.6)).await;
                })
            })
            .collect();
        let sweeper = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut evicted = 0;
                for _ in 0..FRESH {
                    evicted += store.evict_older_than(Utc::now() - chrono::Duration::hours(24)).await;
                    let stats = store.statistics().await;
                    assert!(stats.last_24h <= FRESH);
                    assert!(store.recent(chrono::Duration::hours(1)).await.len() <= FRESH);
                    tokio::task::yield_now().await;
                }
                evicted
            })
        };

        for adder in adders {
            adder.await.unwrap();
        }
        let evicted = sweeper.await.unwrap()
            + store.evict_older_than(Utc::now() - chrono::Duration::hours(24)).await;

        assert_eq!(evicted, 10);
        assert_eq!(store.len().await, FRESH);

        store.flush().await;
        let reloaded = IncidentStore::load(kv, chrono::Duration::hours(24)).await;
        assert_eq!(reloaded.len().await, FRESH);
        assert!(reloaded.get("fresh-0").await.is_some());
        assert!(reloaded.get("stale-0").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_task_sweeps_and_stops() {
        let kv = Arc::new(MemoryStore::new());
        let store = Arc::new(IncidentStore::new(kv, chrono::Duration::hours(24)));
        store.add(incident("stale", 60 * 25, &[], 0.5)).await;

        let cancel = CancellationToken::new();
        let handle = Arc::clone(&store).spawn_retention(Duration::from_secs(3600), cancel.clone());

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.is_empty().await);

        cancel.cancel();
        handle.await.unwrap();
    }
}
