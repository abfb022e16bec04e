//! Backup snapshots
//!
//! Every mutating operation snapshots the affected records before
//! applying. Snapshots are retained for a bounded window and are the
//! restore source after a bad bulk edit or hard delete.

use crate::error::StoreError;
use crate::record::Record;
use crate::store::Database;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A pre-mutation copy of affected records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    /// Snapshot id
    pub id: String,
    /// Owner of the covered records
    pub user_id: String,
    /// Operation the snapshot was taken for
    pub operation_id: String,
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
    /// When the snapshot becomes eligible for removal
    pub expires_at: DateTime<Utc>,
    /// The covered records as they were before the mutation
    pub records: Vec<Record>,
}

/// Snapshot store over the shared database
pub struct BackupStore {
    db: Arc<Database>,
    retention_hours: i64,
}

impl BackupStore {
    /// Create a backup store with the configured retention window
    pub fn new(db: Arc<Database>, retention_hours: i64) -> Self {
        Self {
            db,
            retention_hours: retention_hours.max(1),
        }
    }

    /// Snapshot the given records; returns the snapshot id
    pub fn create(
        &self,
        user_id: &str,
        operation_id: &str,
        records: &[Record],
    ) -> Result<String, StoreError> {
        let now = Utc::now();
        let snapshot = BackupSnapshot {
            id: format!("backup_{}", uuid::Uuid::new_v4()),
            user_id: user_id.to_string(),
            operation_id: operation_id.to_string(),
            created_at: now,
            expires_at: now + Duration::hours(self.retention_hours),
            records: records.to_vec(),
        };
        let records_json = serde_json::to_string(&snapshot.records)?;
        self.db.with_writer(|conn| {
            conn.execute(
                "INSERT INTO backups (id, user_id, operation_id, created_at, expires_at, records)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    snapshot.id,
                    snapshot.user_id,
                    snapshot.operation_id,
                    snapshot.created_at.to_rfc3339(),
                    snapshot.expires_at.to_rfc3339(),
                    records_json,
                ],
            )?;
            Ok(())
        })?;
        Ok(snapshot.id)
    }

    /// Load a snapshot by id; expired snapshots read as absent
    pub fn get(&self, backup_id: &str) -> Result<Option<BackupSnapshot>, StoreError> {
        let row: Option<(String, String, String, String, String)> =
            self.db.with_reader(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT user_id, operation_id, created_at, expires_at, records
                         FROM backups WHERE id = ?1",
                        params![backup_id],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                            ))
                        },
                    )
                    .optional()?)
            })?;

        let Some((user_id, operation_id, created_at, expires_at, records)) = row else {
            return Ok(None);
        };
        let expires_at = parse_time(&expires_at)?;
        if expires_at < Utc::now() {
            return Ok(None);
        }
        Ok(Some(BackupSnapshot {
            id: backup_id.to_string(),
            user_id,
            operation_id,
            created_at: parse_time(&created_at)?,
            expires_at,
            records: serde_json::from_str(&records)?,
        }))
    }

    /// Most recent snapshots for a user inside the retention window
    pub fn recent_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<BackupSnapshot>, StoreError> {
        let ids: Vec<String> = self.db.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM backups WHERE user_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )?;
            let ids = stmt
                .query_map(params![user_id, limit as i64], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })?;
        let mut snapshots = Vec::new();
        for id in ids {
            if let Some(snapshot) = self.get(&id)? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }

    /// Remove snapshots past their retention window; returns count removed
    pub fn sweep_expired(&self) -> Result<usize, StoreError> {
        self.db.with_writer(|conn| {
            let removed = conn.execute(
                "DELETE FROM backups WHERE expires_at < ?1",
                params![Utc::now().to_rfc3339()],
            )?;
            Ok(removed)
        })
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s}: {e}")))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AccessLevel, ProcessingMetadata, Tier};

    fn store(retention_hours: i64) -> BackupStore {
        BackupStore::new(
            Arc::new(Database::open_in_memory().expect("db")),
            retention_hours,
        )
    }

    fn record(id: &str) -> Record {
        let now = Utc::now();
        Record {
            id: id.into(),
            user_id: "u1".into(),
            timestamp: now,
            source: "app".into(),
            highlight: "h".into(),
            note: "n".into(),
            address: "https://a".into(),
            tags: vec!["python".into()],
            access: AccessLevel::Private,
            raw: serde_json::json!({}),
            enhanced_tags: vec![],
            recommended_highlights: vec![],
            semantic: None,
            embedding: None,
            quality: 0.5,
            attention: 0.5,
            attention_metrics: None,
            influence: 0.5,
            tier: Tier::Warm,
            deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            processing: ProcessingMetadata::default(),
        }
    }

    #[test]
    fn test_create_and_restore_snapshot() {
        let store = store(24);
        let id = store
            .create("u1", "op-1", &[record("a"), record("b")])
            .expect("create");

        let snapshot = store.get(&id).expect("get").expect("snapshot");
        assert_eq!(snapshot.user_id, "u1");
        assert_eq!(snapshot.operation_id, "op-1");
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.records[0].tags, vec!["python".to_string()]);
    }

    #[test]
    fn test_missing_snapshot() {
        let store = store(24);
        assert!(store.get("backup_nope").expect("get").is_none());
    }

    #[test]
    fn test_recent_for_user() {
        let store = store(24);
        store.create("u1", "op-1", &[record("a")]).expect("create");
        store.create("u1", "op-2", &[record("b")]).expect("create");
        store.create("u2", "op-3", &[record("c")]).expect("create");

        let snapshots = store.recent_for_user("u1", 10).expect("recent");
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| s.user_id == "u1"));
    }

    #[test]
    fn test_expired_snapshots_unreadable_and_swept() {
        // 1-hour minimum retention; build an already-expired row directly
        let db = Arc::new(Database::open_in_memory().expect("db"));
        let store = BackupStore::new(db.clone(), 1);
        let id = store.create("u1", "op-1", &[record("a")]).expect("create");

        let past = (Utc::now() - Duration::hours(2)).to_rfc3339();
        db.with_writer(|conn| {
            conn.execute(
                "UPDATE backups SET expires_at = ?1 WHERE id = ?2",
                params![past, id],
            )?;
            Ok(())
        })
        .expect("expire");

        assert!(store.get(&id).expect("get").is_none());
        assert_eq!(store.sweep_expired().expect("sweep"), 1);
    }
}
