//! Profile persistence
//!
//! Components live in the shared database; whole profiles are cached
//! with a short TTL so renders and matches do not hit SQLite per call.
//! Writers invalidate the cache after saving.

use super::{ComponentKind, Priority, Profile, ProfileComponent};
use crate::embeddings;
use crate::error::StoreError;
use crate::store::Database;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::params;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Profile store over the shared database
pub struct ProfileStore {
    db: Arc<Database>,
    cache: DashMap<String, (Profile, Instant)>,
    cache_ttl: Duration,
}

impl ProfileStore {
    /// Create a profile store
    pub fn new(db: Arc<Database>, cache_ttl: Duration) -> Self {
        Self {
            db,
            cache: DashMap::new(),
            cache_ttl,
        }
    }

    /// Load a profile, via the cache
    ///
    /// A user with no components gets an empty profile, not an error.
    pub fn load(&self, user_id: &str) -> Result<Profile, StoreError> {
        if let Some(entry) = self.cache.get(user_id) {
            let (profile, cached_at) = entry.value();
            if cached_at.elapsed() <= self.cache_ttl {
                return Ok(profile.clone());
            }
        }
        let profile = self.load_uncached(user_id)?;
        self.cache
            .insert(user_id.to_string(), (profile.clone(), Instant::now()));
        Ok(profile)
    }

    /// Persist every component of a profile and refresh the cache
    pub fn save(&self, profile: &Profile) -> Result<(), StoreError> {
        self.db.with_transaction(|tx| {
            for component in profile.components.values() {
                upsert_component(tx, &profile.user_id, component)?;
            }
            Ok(())
        })?;
        self.cache.insert(
            profile.user_id.to_string(),
            (profile.clone(), Instant::now()),
        );
        Ok(())
    }

    /// Permanently remove a component (user-initiated deletion only)
    pub fn delete_component(&self, user_id: &str, component_id: &str) -> Result<bool, StoreError> {
        let removed = self.db.with_writer(|conn| {
            Ok(conn.execute(
                "DELETE FROM psp_components WHERE user_id = ?1 AND id = ?2",
                params![user_id, component_id],
            )?)
        })?;
        self.invalidate(user_id);
        Ok(removed > 0)
    }

    /// Drop the cached copy for a user
    pub fn invalidate(&self, user_id: &str) {
        self.cache.remove(user_id);
    }

    /// Expire stale cache rows
    pub fn sweep(&self) {
        self.cache
            .retain(|_, (_, cached_at)| cached_at.elapsed() <= self.cache_ttl);
    }

    fn load_uncached(&self, user_id: &str) -> Result<Profile, StoreError> {
        let rows: Vec<ComponentRow> = self.db.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, description, embedding, confidence, total_attention,
                        normalized_weight, priority, activation_threshold, evidence,
                        evolution, source_apps, created_at, updated_at, last_activated_at,
                        archived, below_floor_since
                 FROM psp_components WHERE user_id = ?1",
            )?;
            let rows = stmt
                .query_map(params![user_id], row_to_component)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut profile = Profile::empty(user_id);
        let mut last_updated: Option<DateTime<Utc>> = None;
        for row in rows {
            let component = row.into_component()?;
            last_updated = Some(match last_updated {
                Some(t) => t.max(component.updated_at),
                None => component.updated_at,
            });
            profile.components.insert(component.id.clone(), component);
        }
        if let Some(t) = last_updated {
            profile.last_updated = t;
        }
        profile.recompute_active(Utc::now());
        Ok(profile)
    }
}

/// Raw row before JSON columns are decoded
struct ComponentRow {
    id: String,
    kind: String,
    description: String,
    embedding: Option<Vec<u8>>,
    confidence: f64,
    total_attention: f64,
    normalized_weight: f64,
    priority: String,
    activation_threshold: f64,
    evidence: String,
    evolution: String,
    source_apps: String,
    created_at: String,
    updated_at: String,
    last_activated_at: Option<String>,
    archived: bool,
    below_floor_since: Option<String>,
}

impl ComponentRow {
    fn into_component(self) -> Result<ProfileComponent, StoreError> {
        let kind = ComponentKind::parse_name(&self.kind)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown component kind: {}", self.kind)))?;
        let source_apps: BTreeSet<String> = serde_json::from_str(&self.source_apps)?;
        Ok(ProfileComponent {
            id: self.id,
            kind,
            description: self.description,
            embedding: self.embedding.as_deref().and_then(embeddings::from_bytes),
            confidence: self.confidence,
            total_attention: self.total_attention,
            normalized_weight: self.normalized_weight,
            priority: Priority::parse_name(&self.priority),
            activation_threshold: self.activation_threshold,
            evidence: serde_json::from_str(&self.evidence)?,
            evolution: serde_json::from_str(&self.evolution)?,
            source_apps,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
            last_activated_at: self
                .last_activated_at
                .as_deref()
                .map(parse_time)
                .transpose()?,
            archived: self.archived,
            below_floor_since: self
                .below_floor_since
                .as_deref()
                .map(parse_time)
                .transpose()?,
        })
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s}: {e}")))
}

fn row_to_component(row: &rusqlite::Row<'_>) -> rusqlite::Result<ComponentRow> {
    Ok(ComponentRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        description: row.get(2)?,
        embedding: row.get(3)?,
        confidence: row.get(4)?,
        total_attention: row.get(5)?,
        normalized_weight: row.get(6)?,
        priority: row.get(7)?,
        activation_threshold: row.get(8)?,
        evidence: row.get(9)?,
        evolution: row.get(10)?,
        source_apps: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        last_activated_at: row.get(14)?,
        archived: row.get::<_, i64>(15)? != 0,
        below_floor_since: row.get(16)?,
    })
}

fn upsert_component(
    tx: &rusqlite::Transaction<'_>,
    user_id: &str,
    component: &ProfileComponent,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO psp_components
             (id, user_id, kind, description, embedding, confidence, total_attention,
              normalized_weight, priority, activation_threshold, evidence, evolution,
              source_apps, created_at, updated_at, last_activated_at, archived,
              below_floor_since)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
         ON CONFLICT(id, user_id) DO UPDATE SET
             description = excluded.description,
             embedding = excluded.embedding,
             confidence = excluded.confidence,
             total_attention = excluded.total_attention,
             normalized_weight = excluded.normalized_weight,
             priority = excluded.priority,
             activation_threshold = excluded.activation_threshold,
             evidence = excluded.evidence,
             evolution = excluded.evolution,
             source_apps = excluded.source_apps,
             updated_at = excluded.updated_at,
             last_activated_at = excluded.last_activated_at,
             archived = excluded.archived,
             below_floor_since = excluded.below_floor_since",
        params![
            component.id,
            user_id,
            component.kind.as_str(),
            component.description,
            component.embedding.as_deref().map(embeddings::to_bytes),
            component.confidence,
            component.total_attention,
            component.normalized_weight,
            component.priority.as_str(),
            component.activation_threshold,
            serde_json::to_string(&component.evidence)?,
            serde_json::to_string(&component.evolution)?,
            serde_json::to_string(&component.source_apps)?,
            component.created_at.to_rfc3339(),
            component.updated_at.to_rfc3339(),
            component.last_activated_at.map(|t| t.to_rfc3339()),
            component.archived as i64,
            component.below_floor_since.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
