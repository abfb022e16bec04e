//! Tiered store
//!
//! Hot/warm/cold placement and retrieval over a user's corpus. The warm
//! layer keeps the normalized index row for every record, so filters and
//! time-range queries cover all tiers; reads probe hot → warm → cold and
//! pass through a short-TTL record cache.

mod cold;
mod db;
mod hot;
mod migrations;
mod warm;

pub use cold::ColdStore;
pub use db::Database;
pub use hot::HotStore;
pub use migrations::{Migration, MIGRATIONS};
pub use warm::{IndexRow, WarmStore};

use crate::config::{EngineConfig, TierPolicy};
use crate::error::StoreError;
use crate::record::{tier_for, Record, Tier};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ============================================================================
// QUERY FILTER
// ============================================================================

/// Filter predicate for store queries and bulk write targeting
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryFilter {
    /// Owner; always required
    pub user_id: String,
    /// Minimum influence weight
    pub min_influence: Option<f64>,
    /// Match any of these sources
    pub sources: Option<Vec<String>>,
    /// Match records carrying any of these tags
    pub tags: Option<Vec<String>>,
    /// Event-time range, inclusive
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Maximum ids to return
    pub limit: Option<usize>,
}

// ============================================================================
// METRICS
// ============================================================================

/// Snapshot of store health counters
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMetrics {
    /// Exponentially-weighted cache hit rate
    pub cache_hit_rate: f64,
    /// Exponentially-weighted average retrieval latency in milliseconds
    pub average_retrieval_ms: f64,
    /// Total writes accepted
    pub puts: u64,
    /// Total reads served
    pub gets: u64,
    /// Records moved by migration passes
    pub migrations: u64,
}

impl StoreMetrics {
    fn note_get(&mut self, cache_hit: bool, elapsed: Duration) {
        self.gets += 1;
        let hit = if cache_hit { 1.0 } else { 0.0 };
        self.cache_hit_rate = self.cache_hit_rate * 0.9 + hit * 0.1;
        self.average_retrieval_ms =
            self.average_retrieval_ms * 0.9 + elapsed.as_secs_f64() * 1000.0 * 0.1;
    }
}

/// Result of a tier migration pass
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// Index rows examined
    pub examined: usize,
    /// Records whose tier changed
    pub moved: usize,
}

// ============================================================================
// TIERED STORE
// ============================================================================

/// Facade over the three storage tiers
pub struct TieredStore {
    hot: HotStore,
    warm: WarmStore,
    cold: ColdStore,
    cache: DashMap<String, (Record, Instant)>,
    cache_ttl: Duration,
    policy: TierPolicy,
    metrics: Mutex<StoreMetrics>,
}

impl TieredStore {
    /// Build the store over a shared database and a cold shard root
    pub fn new(
        db: Arc<Database>,
        cold_root: &Path,
        config: &EngineConfig,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            hot: HotStore::new(
                Duration::from_secs(config.hot_ttl_sec),
                config.hot_capacity,
            ),
            warm: WarmStore::new(db),
            cold: ColdStore::new(cold_root)?,
            cache: DashMap::new(),
            cache_ttl: Duration::from_secs(config.cache_ttl_sec),
            policy: config.tiers.clone(),
            metrics: Mutex::new(StoreMetrics::default()),
        })
    }

    /// The tier routing thresholds in effect
    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    /// Store a record in the tier it is routed to
    ///
    /// Idempotent by id: re-putting replaces the stored copy. The index
    /// row and (for hot/warm) the document must land in the warm layer
    /// for the write to be acknowledged; hot materialization is an
    /// accelerator on top.
    pub fn put(&self, record: &Record) -> Result<(), StoreError> {
        match record.tier {
            Tier::Hot => {
                self.warm.put(record, true)?;
                if record.deleted {
                    self.hot.remove(&record.id);
                } else {
                    self.hot.put(record);
                }
            }
            Tier::Warm => {
                self.warm.put(record, true)?;
                self.hot.remove(&record.id);
            }
            Tier::Cold => {
                self.warm.put(record, false)?;
                // Replace any previous shard copy before appending
                self.cold.remove(&record.id, &record.user_id)?;
                self.cold.append(record)?;
                self.hot.remove(&record.id);
            }
        }
        self.cache.remove(&record.id);
        if let Ok(mut m) = self.metrics.lock() {
            m.puts += 1;
        }
        Ok(())
    }

    /// Fetch a record; soft-deleted records are invisible here
    pub fn get(&self, id: &str, user_id: &str) -> Result<Option<Record>, StoreError> {
        let started = Instant::now();

        if let Some(entry) = self.cache.get(id) {
            let (record, inserted) = entry.value();
            if inserted.elapsed() <= self.cache_ttl && record.user_id == user_id {
                let record = record.clone();
                drop(entry);
                self.note_get(true, started);
                return Ok(Some(record));
            }
        }

        // The index row is authoritative for deletion: cold shard
        // documents are not rewritten on soft delete
        if let Ok(Some(row)) = self.warm.index_row(id) {
            if row.deleted {
                self.note_get(false, started);
                return Ok(None);
            }
        }

        let found = self.get_uncached(id, user_id)?;
        let visible = found.filter(|r| !r.deleted);
        if let Some(record) = &visible {
            self.cache
                .insert(id.to_string(), (record.clone(), Instant::now()));
        }
        self.note_get(false, started);
        Ok(visible)
    }

    /// Fetch a record including soft-deleted ones (governed writes, audit)
    pub fn get_any(&self, id: &str, user_id: &str) -> Result<Option<Record>, StoreError> {
        let mut found = self.get_uncached(id, user_id)?;
        if let Some(record) = &mut found {
            // Cold shard documents keep their pre-delete flag; the index
            // row is authoritative
            if let Some(row) = self.warm.index_row(id)? {
                if row.deleted {
                    record.deleted = true;
                }
            }
        }
        Ok(found)
    }

    fn get_uncached(&self, id: &str, user_id: &str) -> Result<Option<Record>, StoreError> {
        if let Some(record) = self.hot.get(id) {
            if record.user_id == user_id {
                return Ok(Some(record));
            }
            return Ok(None);
        }

        match self.warm.get(id, user_id) {
            Ok(Some(record)) => return Ok(Some(record)),
            Ok(None) => {}
            Err(e) => {
                // Warm probe failed; fall through to cold before giving up
                tracing::warn!(record_id = %id, "warm tier read failed: {e}");
            }
        }

        let date_hint = self
            .warm
            .index_row(id)
            .ok()
            .flatten()
            .filter(|row| row.user_id == user_id)
            .map(|row| row.timestamp.date_naive());
        self.cold.get(id, user_id, date_hint)
    }

    /// The index row for an id, regardless of owner or deletion
    pub fn index_row(&self, id: &str) -> Result<Option<IndexRow>, StoreError> {
        self.warm.index_row(id)
    }

    /// Ids matching a filter, highest influence first
    pub fn query_by_filter(&self, filter: &QueryFilter) -> Result<Vec<String>, StoreError> {
        self.warm.query_by_filter(filter)
    }

    /// Ids for a user inside a time range, newest first
    pub fn query_by_time_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        self.warm.query_time_range(user_id, from, to)
    }

    /// Full documents newer than `since` for the attention window
    pub fn records_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Record>, StoreError> {
        self.warm.records_since(user_id, since)
    }

    /// Full-text hits `(id, score)` for the index layer
    pub fn fulltext(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        self.warm.fulltext(user_id, query, limit)
    }

    /// Stored embeddings for rebuilding the vector index
    pub fn load_embeddings(&self) -> Result<Vec<(String, String, Vec<f32>)>, StoreError> {
        self.warm.load_embeddings()
    }

    /// Soft-delete: invisible to retrieval, retained for audit
    pub fn soft_delete(
        &self,
        id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.hot.remove(id);
        self.cache.remove(id);
        self.warm.soft_delete(id, user_id, now)
    }

    /// Remove a record from every tier
    pub fn hard_delete(&self, id: &str, user_id: &str) -> Result<bool, StoreError> {
        self.hot.remove(id);
        self.cache.remove(id);
        let in_cold = self.cold.remove(id, user_id)?;
        let in_warm = self.warm.hard_delete(id, user_id)?;
        Ok(in_cold || in_warm)
    }

    /// Re-evaluate tier placement for every live record
    ///
    /// A no-op immediately after a write: tiers only change when a
    /// record's age crosses a boundary.
    pub fn migrate(&self, now: DateTime<Utc>) -> Result<MigrationReport, StoreError> {
        let rows = self.warm.scan_index()?;
        let mut report = MigrationReport {
            examined: rows.len(),
            moved: 0,
        };

        for row in rows {
            let age_days = (now - row.timestamp).num_days().max(0);
            let target = tier_for(row.influence, age_days, &self.policy);
            if target == row.tier {
                continue;
            }
            let Some(mut record) = self.get_any(&row.id, &row.user_id)? else {
                tracing::warn!(record_id = %row.id, "index row without document during migration");
                continue;
            };
            let previous = record.tier;
            record.tier = target;
            self.put(&record)?;
            if previous == Tier::Cold && target != Tier::Cold {
                self.cold.remove(&record.id, &record.user_id)?;
            }
            report.moved += 1;
            tracing::debug!(
                record_id = %row.id,
                from = %previous,
                to = %target,
                "tier migration"
            );
        }

        if report.moved > 0 {
            if let Ok(mut m) = self.metrics.lock() {
                m.migrations += report.moved as u64;
            }
        }
        Ok(report)
    }

    /// Expire hot entries and stale cache rows
    pub fn sweep(&self) -> usize {
        let expired = self.hot.sweep_expired().len();
        self.cache
            .retain(|_, (_, inserted)| inserted.elapsed() <= self.cache_ttl);
        expired
    }

    /// Current health counters
    pub fn metrics(&self) -> StoreMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }

    fn note_get(&self, cache_hit: bool, started: Instant) {
        if let Ok(mut m) = self.metrics.lock() {
            m.note_get(cache_hit, started.elapsed());
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AccessLevel, ProcessingMetadata};

    fn store() -> (TieredStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::open_in_memory().expect("db"));
        let store =
            TieredStore::new(db, &dir.path().join("cold"), &EngineConfig::default()).expect("store");
        (store, dir)
    }

    fn record(id: &str, user: &str, quality: f64, attention: f64, age_days: i64) -> Record {
        let ts = Utc::now() - chrono::Duration::days(age_days);
        let mut rec = Record {
            id: id.into(),
            user_id: user.into(),
            timestamp: ts,
            source: "app".into(),
            highlight: "observation text".into(),
            note: "details".into(),
            address: "https://a".into(),
            tags: vec!["t".into()],
            access: AccessLevel::Private,
            raw: serde_json::json!({}),
            enhanced_tags: vec![],
            recommended_highlights: vec![],
            semantic: None,
            embedding: None,
            quality,
            attention,
            attention_metrics: None,
            influence: 0.05,
            tier: Tier::Hot,
            deleted: false,
            deleted_at: None,
            created_at: ts,
            updated_at: ts,
            processing: ProcessingMetadata::default(),
        };
        rec.reroute(&TierPolicy::default(), Utc::now());
        rec
    }

    #[test]
    fn test_put_routes_per_tier_function() {
        let (store, _dir) = store();

        let hot = record("hot", "u1", 0.9, 0.9, 0);
        assert_eq!(hot.tier, Tier::Hot);
        store.put(&hot).expect("put");

        let warm = record("warm", "u1", 0.5, 0.5, 10);
        assert_eq!(warm.tier, Tier::Warm);
        store.put(&warm).expect("put");

        let cold = record("cold", "u1", 0.0, 0.0, 90);
        assert_eq!(cold.tier, Tier::Cold);
        store.put(&cold).expect("put");

        for id in ["hot", "warm", "cold"] {
            let rec = store.get(id, "u1").expect("get").expect("found");
            assert_eq!(rec.id, id);
        }
    }

    #[test]
    fn test_get_is_owner_scoped() {
        let (store, _dir) = store();
        store.put(&record("r1", "u1", 0.9, 0.9, 0)).expect("put");
        assert!(store.get("r1", "intruder").expect("get").is_none());
    }

    #[test]
    fn test_soft_delete_invisible_but_retained() {
        let (store, _dir) = store();
        store.put(&record("r1", "u1", 0.9, 0.9, 0)).expect("put");
        assert!(store.soft_delete("r1", "u1", Utc::now()).expect("delete"));

        assert!(store.get("r1", "u1").expect("get").is_none());
        let retained = store.get_any("r1", "u1").expect("get").expect("retained");
        assert!(retained.deleted);
    }

    #[test]
    fn test_hard_delete_all_tiers() {
        let (store, _dir) = store();
        store.put(&record("c1", "u1", 0.0, 0.0, 90)).expect("put");
        assert!(store.hard_delete("c1", "u1").expect("delete"));
        assert!(store.get_any("c1", "u1").expect("get").is_none());
        assert!(store.index_row("c1").expect("row").is_none());
    }

    #[test]
    fn test_migration_noop_after_write() {
        let (store, _dir) = store();
        store.put(&record("a", "u1", 0.9, 0.9, 0)).expect("put");
        store.put(&record("b", "u1", 0.5, 0.5, 10)).expect("put");
        let report = store.migrate(Utc::now()).expect("migrate");
        assert_eq!(report.examined, 2);
        assert_eq!(report.moved, 0);
    }

    #[test]
    fn test_migration_moves_aged_records() {
        let (store, _dir) = store();
        // Low influence, recent: hot only by recency
        let mut rec = record("r1", "u1", 0.1, 0.1, 0);
        assert_eq!(rec.tier, Tier::Hot);
        store.put(&rec).expect("put");

        // Same record evaluated as if 15 days passed: falls to warm
        rec.timestamp = Utc::now() - chrono::Duration::days(15);
        store.put(&rec).expect("put");
        let report = store.migrate(Utc::now()).expect("migrate");
        assert_eq!(report.moved, 1);
        let row = store.index_row("r1").expect("row").expect("exists");
        assert_eq!(row.tier, Tier::Warm);

        // And 45 days out it reaches cold, document now in shards
        let mut rec = store.get_any("r1", "u1").expect("get").expect("rec");
        rec.timestamp = Utc::now() - chrono::Duration::days(45);
        store.put(&rec).expect("put");
        let report = store.migrate(Utc::now()).expect("migrate");
        assert_eq!(report.moved, 1);
        let row = store.index_row("r1").expect("row").expect("exists");
        assert_eq!(row.tier, Tier::Cold);
        assert!(store.get("r1", "u1").expect("get").is_some());
    }

    #[test]
    fn test_filter_covers_all_tiers() {
        let (store, _dir) = store();
        store.put(&record("hot", "u1", 0.9, 0.9, 0)).expect("put");
        store.put(&record("cold", "u1", 0.0, 0.0, 90)).expect("put");

        let ids = store
            .query_by_filter(&QueryFilter {
                user_id: "u1".into(),
                ..Default::default()
            })
            .expect("query");
        assert!(ids.contains(&"hot".to_string()));
        assert!(ids.contains(&"cold".to_string()));
    }

    #[test]
    fn test_cache_serves_repeat_reads() {
        let (store, _dir) = store();
        store.put(&record("r1", "u1", 0.9, 0.9, 0)).expect("put");
        store.get("r1", "u1").expect("get");
        store.get("r1", "u1").expect("get");
        let metrics = store.metrics();
        assert_eq!(metrics.gets, 2);
        assert!(metrics.cache_hit_rate > 0.0);
    }

    #[test]
    fn test_idempotent_reput() {
        let (store, _dir) = store();
        let rec = record("r1", "u1", 0.9, 0.9, 0);
        store.put(&rec).expect("put");
        store.put(&rec).expect("put");
        let ids = store
            .query_by_filter(&QueryFilter {
                user_id: "u1".into(),
                ..Default::default()
            })
            .expect("query");
        assert_eq!(ids.len(), 1);
    }
}
