//! Hot tier
//!
//! Low-latency in-process layer for high-influence and recent records.
//! Layout mirrors the persisted-state contract: full document under the
//! record id, a per-user set ranked by influence, a per-tag set ranked by
//! influence, and a per-user timeline ranked by event time. Bounded by
//! TTL and capacity; capacity eviction removes lowest influence first.

use crate::record::Record;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::RwLock;
use std::time::Duration;

struct HotEntry {
    record: Record,
    inserted_at: DateTime<Utc>,
}

/// A ranked id set; kept sorted descending by score
type RankedSet = RwLock<Vec<(f64, String)>>;

/// In-process hot store
pub struct HotStore {
    docs: DashMap<String, HotEntry>,
    by_user: DashMap<String, RankedSet>,
    by_tag: DashMap<String, RankedSet>,
    timeline: DashMap<String, RwLock<Vec<(i64, String)>>>,
    ttl: Duration,
    capacity: usize,
}

impl HotStore {
    /// Create a hot store with the given TTL and capacity bounds
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            docs: DashMap::new(),
            by_user: DashMap::new(),
            by_tag: DashMap::new(),
            timeline: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Number of materialized documents
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// True when no documents are materialized
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Insert or replace a record; evicts the lowest-influence entry when full
    pub fn put(&self, record: &Record) {
        self.remove(&record.id);

        if self.docs.len() >= self.capacity {
            self.evict_lowest_influence();
        }

        ranked_insert(
            &self.by_user,
            record.user_id.clone(),
            record.influence,
            &record.id,
        );
        for tag in record.all_tags() {
            ranked_insert(&self.by_tag, tag, record.influence, &record.id);
        }
        self.timeline
            .entry(record.user_id.clone())
            .or_default()
            .write()
            .map(|mut tl| {
                let epoch = record.timestamp.timestamp();
                let pos = tl.partition_point(|(e, _)| *e >= epoch);
                tl.insert(pos, (epoch, record.id.clone()));
            })
            .ok();

        self.docs.insert(
            record.id.clone(),
            HotEntry {
                record: record.clone(),
                inserted_at: Utc::now(),
            },
        );
    }

    /// Fetch a record by id, honoring the TTL
    pub fn get(&self, id: &str) -> Option<Record> {
        let expired = {
            let entry = self.docs.get(id)?;
            let age = Utc::now() - entry.inserted_at;
            if age.to_std().unwrap_or_default() > self.ttl {
                true
            } else {
                return Some(entry.record.clone());
            }
        };
        if expired {
            self.remove(id);
        }
        None
    }

    /// Remove a record and all its index entries
    pub fn remove(&self, id: &str) {
        let Some((_, entry)) = self.docs.remove(id) else {
            return;
        };
        let record = entry.record;
        ranked_remove(&self.by_user, &record.user_id, id);
        for tag in record.all_tags() {
            ranked_remove(&self.by_tag, &tag, id);
        }
        if let Some(tl) = self.timeline.get(&record.user_id) {
            if let Ok(mut tl) = tl.write() {
                tl.retain(|(_, rid)| rid != id);
            }
        }
    }

    /// Top ids for a user by influence
    pub fn top_by_user(&self, user_id: &str, limit: usize, min_influence: f64) -> Vec<String> {
        ranked_top(&self.by_user, user_id, limit, min_influence)
    }

    /// Top ids for a tag by influence
    pub fn top_by_tag(&self, tag: &str, limit: usize, min_influence: f64) -> Vec<String> {
        ranked_top(&self.by_tag, tag, limit, min_influence)
    }

    /// Ids for a user inside a time range, newest first
    pub fn ids_in_time_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<String> {
        let Some(tl) = self.timeline.get(user_id) else {
            return Vec::new();
        };
        let Ok(tl) = tl.read() else {
            return Vec::new();
        };
        let (from_e, to_e) = (from.timestamp(), to.timestamp());
        tl.iter()
            .filter(|(e, _)| *e >= from_e && *e <= to_e)
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Drop every entry older than the TTL; returns the removed ids
    pub fn sweep_expired(&self) -> Vec<String> {
        let now = Utc::now();
        let expired: Vec<String> = self
            .docs
            .iter()
            .filter(|entry| {
                (now - entry.inserted_at).to_std().unwrap_or_default() > self.ttl
            })
            .map(|entry| entry.key().clone())
            .collect();
        for id in &expired {
            self.remove(id);
        }
        expired
    }

    fn evict_lowest_influence(&self) {
        let victim = self
            .docs
            .iter()
            .min_by(|a, b| {
                a.record
                    .influence
                    .partial_cmp(&b.record.influence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|entry| entry.key().clone());
        if let Some(id) = victim {
            tracing::debug!(record_id = %id, "hot tier capacity eviction");
            self.remove(&id);
        }
    }
}

fn ranked_insert(map: &DashMap<String, RankedSet>, key: String, score: f64, id: &str) {
    let set = map.entry(key).or_default();
    if let Ok(mut ranked) = set.write() {
        let pos = ranked.partition_point(|(s, _)| *s >= score);
        ranked.insert(pos, (score, id.to_string()));
    }
}

fn ranked_remove(map: &DashMap<String, RankedSet>, key: &str, id: &str) {
    if let Some(set) = map.get(key) {
        if let Ok(mut ranked) = set.write() {
            ranked.retain(|(_, rid)| rid != id);
        }
    }
}

fn ranked_top(
    map: &DashMap<String, RankedSet>,
    key: &str,
    limit: usize,
    min_score: f64,
) -> Vec<String> {
    let Some(set) = map.get(key) else {
        return Vec::new();
    };
    let Ok(ranked) = set.read() else {
        return Vec::new();
    };
    ranked
        .iter()
        .take_while(|(score, _)| *score >= min_score)
        .take(limit)
        .map(|(_, id)| id.clone())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
