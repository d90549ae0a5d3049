//! Time-bounded shared memory store.
//!
//! Holds the four record kinds the engine learns from: cached content
//! classifications, strategy performance history, user preference snapshots
//! and aggregated content patterns. Pure TTL expiry, not LRU: reads refresh
//! access statistics but never extend a record's life. A miss is a normal
//! outcome, never an error.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MemoryStoreConfig;
use crate::types::{Complexity, ContentPatternStats, ContentType, MemoryStats};

/// Record kinds held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    ContentAnalysis,
    StrategyPerformance,
    UserPreferences,
    ContentPattern,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::ContentAnalysis => "content_analysis",
            RecordKind::StrategyPerformance => "strategy_performance",
            RecordKind::UserPreferences => "user_preferences",
            RecordKind::ContentPattern => "content_pattern",
        }
    }

    /// Kinds that overwrite by key instead of appending. Content analyses
    /// are keyed by a content hash, pattern aggregates by (type, complexity);
    /// duplicate writes carry identical or superseding data, so
    /// last-writer-wins is acceptable.
    pub fn is_deduplicated(&self) -> bool {
        matches!(
            self,
            RecordKind::ContentAnalysis | RecordKind::ContentPattern
        )
    }
}

/// Generic record envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub kind: RecordKind,
    pub key: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    #[serde(with = "millis")]
    pub ttl: Duration,
    pub tags: Vec<String>,
    pub source: String,
    pub confidence: Option<f64>,
}

impl MemoryRecord {
    /// Expired records must be treated as absent by every read path
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => age >= ttl,
            Err(_) => false, // TTL too large to represent; treat as unbounded
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Optional metadata for a `put`
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Overrides the configured per-kind default TTL
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub confidence: Option<f64>,
}

/// Query filter: predicates are conjunctive
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    pub kind: Option<RecordKind>,
    pub key: Option<String>,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub min_confidence: Option<f64>,
    pub max_age: Option<Duration>,
    pub sort_by: SortBy,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    CreatedAt,
    LastAccessed,
    AccessCount,
    Confidence,
}

/// Thread-safe TTL store shared by classifier, selector and coordinator.
pub struct MemoryStore {
    config: MemoryStoreConfig,
    records: DashMap<String, MemoryRecord>,
}

pub type SharedMemoryStore = Arc<MemoryStore>;

impl MemoryStore {
    pub fn new(config: MemoryStoreConfig) -> SharedMemoryStore {
        Arc::new(Self {
            config,
            records: DashMap::new(),
        })
    }

    /// Storage key: deduplicated kinds collapse onto their lookup key,
    /// history kinds get a unique slot per record.
    fn storage_key(kind: RecordKind, key: &str, id: Uuid) -> String {
        if kind.is_deduplicated() {
            format!("{}:{}", kind.as_str(), key)
        } else {
            format!("{}:{}#{}", kind.as_str(), key, id)
        }
    }

    /// Store a payload. Returns the new record id.
    pub fn put(
        &self,
        kind: RecordKind,
        key: impl Into<String>,
        payload: serde_json::Value,
        opts: PutOptions,
    ) -> Uuid {
        let key = key.into();
        let id = Uuid::new_v4();
        let now = Utc::now();
        let record = MemoryRecord {
            id,
            kind,
            key: key.clone(),
            payload,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            ttl: opts.ttl.unwrap_or_else(|| self.config.default_ttl(kind)),
            tags: opts.tags,
            source: opts.source.unwrap_or_else(|| "engine".to_string()),
            confidence: opts.confidence,
        };

        let storage_key = Self::storage_key(kind, &key, id);
        debug!(kind = kind.as_str(), key = %key, "memory put");
        self.records.insert(storage_key, record);
        id
    }

    /// Serialize-and-put convenience for typed payloads.
    pub fn put_json<T: Serialize>(
        &self,
        kind: RecordKind,
        key: impl Into<String>,
        payload: &T,
        opts: PutOptions,
    ) -> Uuid {
        let value = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        self.put(kind, key, value, opts)
    }

    /// Read a record by key, applying the expiry check before returning.
    /// A hit bumps the access count and last-access time.
    pub fn get(&self, kind: RecordKind, key: &str) -> Option<MemoryRecord> {
        let storage_key = if kind.is_deduplicated() {
            Self::storage_key(kind, key, Uuid::nil())
        } else {
            // History kinds have no single slot; resolve to the newest match.
            self.newest_matching(kind, key)?
        };

        let now = Utc::now();
        let mut entry = self.records.get_mut(&storage_key)?;
        if entry.is_expired_at(now) {
            drop(entry);
            self.records.remove(&storage_key);
            return None;
        }
        entry.access_count += 1;
        entry.last_accessed = now;
        Some(entry.clone())
    }

    /// Typed read of a record payload.
    pub fn get_json<T: DeserializeOwned>(&self, kind: RecordKind, key: &str) -> Option<T> {
        let record = self.get(kind, key)?;
        serde_json::from_value(record.payload).ok()
    }

    fn newest_matching(&self, kind: RecordKind, key: &str) -> Option<String> {
        let now = Utc::now();
        self.records
            .iter()
            .filter(|e| e.kind == kind && e.key == key && !e.is_expired_at(now))
            .max_by_key(|e| e.created_at)
            .map(|e| e.key().clone())
    }

    /// Linear scan with conjunctive filters, sorted descending by the
    /// requested field.
    pub fn query(&self, query: &MemoryQuery) -> Vec<MemoryRecord> {
        let now = Utc::now();
        let max_age = query.max_age.and_then(|d| chrono::Duration::from_std(d).ok());

        let mut results: Vec<MemoryRecord> = self
            .records
            .iter()
            .filter(|e| !e.is_expired_at(now))
            .filter(|e| query.kind.map_or(true, |k| e.kind == k))
            .filter(|e| query.key.as_deref().map_or(true, |k| e.key == k))
            .filter(|e| query.source.as_deref().map_or(true, |s| e.source == s))
            .filter(|e| {
                query
                    .min_confidence
                    .map_or(true, |min| e.confidence.unwrap_or(0.0) >= min)
            })
            .filter(|e| {
                max_age.map_or(true, |max| now.signed_duration_since(e.created_at) <= max)
            })
            .filter(|e| query.tags.iter().all(|t| e.tags.contains(t)))
            .map(|e| e.clone())
            .collect();

        match query.sort_by {
            SortBy::CreatedAt => results.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortBy::LastAccessed => results.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed)),
            SortBy::AccessCount => results.sort_by(|a, b| b.access_count.cmp(&a.access_count)),
            SortBy::Confidence => results.sort_by(|a, b| {
                b.confidence
                    .unwrap_or(0.0)
                    .partial_cmp(&a.confidence.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
        }

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        results
    }

    /// Remove every record past its TTL. Idempotent; safe to run
    /// concurrently with reads and writes since expiry is monotonic.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|e| e.is_expired_at(now))
            .map(|e| e.key().clone())
            .collect();

        let count = expired.len();
        for key in expired {
            self.records.remove(&key);
        }
        if count > 0 {
            debug!(count, "swept expired memory records");
        }
        count
    }

    /// Increment the occurrence aggregate for a (type, complexity) pair.
    /// Confidence rises asymptotically toward 1.0 on repeated observation.
    /// The update happens under the map entry lock so concurrent workflows
    /// cannot lose increments.
    pub fn record_pattern(&self, content_type: ContentType, complexity: Complexity) {
        let key = ContentPatternStats::pattern_key(content_type, complexity);
        let storage_key = Self::storage_key(RecordKind::ContentPattern, &key, Uuid::nil());
        let now = Utc::now();

        let mut entry = self.records.entry(storage_key).or_insert_with(|| MemoryRecord {
            id: Uuid::new_v4(),
            kind: RecordKind::ContentPattern,
            key,
            payload: serde_json::Value::Null,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            ttl: self.config.default_ttl(RecordKind::ContentPattern),
            tags: Vec::new(),
            source: "engine".to_string(),
            confidence: None,
        });

        // Expired aggregates restart from scratch
        let prior = if entry.is_expired_at(now) {
            None
        } else {
            serde_json::from_value::<ContentPatternStats>(entry.payload.clone()).ok()
        };
        let mut stats = prior.unwrap_or(ContentPatternStats {
            content_type,
            complexity,
            occurrences: 0,
            confidence: 0.5,
        });
        stats.occurrences += 1;
        if stats.occurrences > 1 {
            stats.confidence = (stats.confidence + (1.0 - stats.confidence) * 0.1).min(1.0);
        }

        // Observations are writes, so they refresh the aggregate's TTL
        entry.created_at = now;
        entry.last_accessed = now;
        entry.confidence = Some(stats.confidence);
        entry.payload = serde_json::to_value(&stats).unwrap_or(serde_json::Value::Null);
    }

    /// Drop everything. Used by tests and operator resets.
    pub fn clear(&self) {
        self.records.clear();
    }

    pub fn stats(&self) -> MemoryStats {
        let now = Utc::now();
        let mut by_kind: HashMap<String, usize> = HashMap::new();
        let mut estimated_bytes = 0usize;
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;
        let mut most_accessed: Option<(String, u64)> = None;
        let mut confidence_sum = 0.0;
        let mut confidence_count = 0usize;
        let mut total = 0usize;

        for entry in self.records.iter() {
            if entry.is_expired_at(now) {
                continue;
            }
            total += 1;
            *by_kind.entry(entry.kind.as_str().to_string()).or_insert(0) += 1;
            estimated_bytes += entry.key.len()
                + serde_json::to_string(&entry.payload)
                    .map(|s| s.len())
                    .unwrap_or(0);
            oldest = Some(oldest.map_or(entry.created_at, |o| o.min(entry.created_at)));
            newest = Some(newest.map_or(entry.created_at, |n| n.max(entry.created_at)));
            if most_accessed
                .as_ref()
                .map_or(true, |(_, count)| entry.access_count > *count)
            {
                most_accessed = Some((entry.key.clone(), entry.access_count));
            }
            if let Some(c) = entry.confidence {
                confidence_sum += c;
                confidence_count += 1;
            }
        }

        MemoryStats {
            total_entries: total,
            by_kind,
            estimated_bytes,
            oldest,
            newest,
            most_accessed_key: most_accessed.map(|(k, _)| k),
            avg_confidence: if confidence_count > 0 {
                confidence_sum / confidence_count as f64
            } else {
                0.0
            },
        }
    }
}

/// Background sweep worker owning its own scheduled task.
///
/// Explicit start/stop lifecycle: `spawn` starts the loop, the notifier
/// stops it deterministically (no ambient timers left behind in tests).
pub struct MemorySweeper {
    store: SharedMemoryStore,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl MemorySweeper {
    pub fn new(store: SharedMemoryStore, interval: Duration) -> Self {
        Self {
            store,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval = ?self.interval, "starting memory sweep worker");
            loop {
                tokio::select! {
                    () = tokio::time::sleep(self.interval) => {
                        let removed = self.store.sweep_expired();
                        if removed > 0 {
                            info!(removed, "memory sweep completed");
                        }
                    }
                    () = self.shutdown.notified() => {
                        info!("memory sweep worker shutting down");
                        break;
                    }
                }
            }
        })
    }
}

/// Serde module for Duration as milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SharedMemoryStore {
        MemoryStore::new(MemoryStoreConfig::default())
    }

    #[test]
    fn test_put_get_roundtrip() {
        let store = store();
        store.put(
            RecordKind::ContentAnalysis,
            "hash-abc",
            json!({"word_count": 42}),
            PutOptions::default(),
        );

        let record = store.get(RecordKind::ContentAnalysis, "hash-abc").unwrap();
        assert_eq!(record.payload["word_count"], 42);
        assert_eq!(record.access_count, 1);

        // Second read bumps access stats
        let record = store.get(RecordKind::ContentAnalysis, "hash-abc").unwrap();
        assert_eq!(record.access_count, 2);
    }

    #[test]
    fn test_miss_is_absent_not_error() {
        let store = store();
        assert!(store.get(RecordKind::ContentAnalysis, "nope").is_none());
    }

    #[test]
    fn test_dedup_overwrites_by_key() {
        let store = store();
        store.put(
            RecordKind::ContentAnalysis,
            "hash-abc",
            json!({"v": 1}),
            PutOptions::default(),
        );
        store.put(
            RecordKind::ContentAnalysis,
            "hash-abc",
            json!({"v": 2}),
            PutOptions::default(),
        );

        let record = store.get(RecordKind::ContentAnalysis, "hash-abc").unwrap();
        assert_eq!(record.payload["v"], 2);
        assert_eq!(store.stats().total_entries, 1);
    }

    #[test]
    fn test_history_kinds_append() {
        let store = store();
        for i in 0..3 {
            store.put(
                RecordKind::StrategyPerformance,
                "perf/x",
                json!({"run": i}),
                PutOptions::default(),
            );
        }
        assert_eq!(store.stats().total_entries, 3);
    }

    #[tokio::test]
    async fn test_ttl_expiry_on_read() {
        let store = store();
        store.put(
            RecordKind::ContentAnalysis,
            "short-lived",
            json!({}),
            PutOptions {
                ttl: Some(Duration::from_millis(30)),
                ..Default::default()
            },
        );

        assert!(store.get(RecordKind::ContentAnalysis, "short-lived").is_some());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get(RecordKind::ContentAnalysis, "short-lived").is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_only() {
        let store = store();
        store.put(
            RecordKind::StrategyPerformance,
            "perf/a",
            json!({}),
            PutOptions {
                ttl: Some(Duration::from_millis(20)),
                ..Default::default()
            },
        );
        store.put(
            RecordKind::StrategyPerformance,
            "perf/b",
            json!({}),
            PutOptions::default(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.sweep_expired(), 0); // idempotent
        assert_eq!(store.stats().total_entries, 1);
    }

    #[test]
    fn test_query_filters_and_sort() {
        let store = store();
        store.put(
            RecordKind::StrategyPerformance,
            "perf/a",
            json!({}),
            PutOptions {
                confidence: Some(0.9),
                tags: vec!["html".to_string()],
                ..Default::default()
            },
        );
        store.put(
            RecordKind::StrategyPerformance,
            "perf/b",
            json!({}),
            PutOptions {
                confidence: Some(0.4),
                ..Default::default()
            },
        );
        store.put(
            RecordKind::ContentAnalysis,
            "hash-x",
            json!({}),
            PutOptions::default(),
        );

        let results = store.query(&MemoryQuery {
            kind: Some(RecordKind::StrategyPerformance),
            ..Default::default()
        });
        assert_eq!(results.len(), 2);

        let results = store.query(&MemoryQuery {
            kind: Some(RecordKind::StrategyPerformance),
            min_confidence: Some(0.5),
            ..Default::default()
        });
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, "perf/a");

        let results = store.query(&MemoryQuery {
            tags: vec!["html".to_string()],
            ..Default::default()
        });
        assert_eq!(results.len(), 1);

        let results = store.query(&MemoryQuery {
            sort_by: SortBy::Confidence,
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].confidence, Some(0.9));
    }

    #[test]
    fn test_pattern_confidence_monotone_and_bounded() {
        let store = store();
        let mut last = 0.0;
        for _ in 0..100 {
            store.record_pattern(ContentType::Html, Complexity::Medium);
            let stats: ContentPatternStats = store
                .get_json(
                    RecordKind::ContentPattern,
                    &ContentPatternStats::pattern_key(ContentType::Html, Complexity::Medium),
                )
                .unwrap();
            assert!(stats.confidence >= last);
            assert!(stats.confidence <= 1.0);
            last = stats.confidence;
        }
        let stats: ContentPatternStats = store
            .get_json(
                RecordKind::ContentPattern,
                &ContentPatternStats::pattern_key(ContentType::Html, Complexity::Medium),
            )
            .unwrap();
        assert_eq!(stats.occurrences, 100);
    }

    #[test]
    fn test_pattern_increments_survive_contention() {
        let store = store();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    store.record_pattern(ContentType::Text, Complexity::Simple);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let stats: ContentPatternStats = store
            .get_json(
                RecordKind::ContentPattern,
                &ContentPatternStats::pattern_key(ContentType::Text, Complexity::Simple),
            )
            .unwrap();
        assert_eq!(stats.occurrences, 200);
        assert!(stats.confidence <= 1.0);
    }

    #[tokio::test]
    async fn test_sweeper_lifecycle() {
        let store = store();
        store.put(
            RecordKind::ContentAnalysis,
            "doomed",
            json!({}),
            PutOptions {
                ttl: Some(Duration::from_millis(10)),
                ..Default::default()
            },
        );

        let sweeper = MemorySweeper::new(Arc::clone(&store), Duration::from_millis(25));
        let shutdown = sweeper.shutdown_notifier();
        let handle = sweeper.spawn();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.stats().total_entries, 0);

        shutdown.notify_one();
        handle.await.unwrap();
    }
}
