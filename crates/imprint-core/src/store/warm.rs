//! Warm tier
//!
//! Relational layer over the shared database. Holds the normalized index
//! row for every record regardless of tier, full documents for hot- and
//! warm-tier records, the tag index, embedding blobs, and the FTS5 table
//! the full-text strategy searches.

use super::db::Database;
use super::QueryFilter;
use crate::embeddings;
use crate::error::StoreError;
use crate::record::{Record, Tier};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

/// The normalized index row kept for every record
#[derive(Debug, Clone)]
pub struct IndexRow {
    pub id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub influence: f64,
    pub attention: f64,
    pub quality: f64,
    pub tier: Tier,
    pub deleted: bool,
}

/// Warm store over the shared database
pub struct WarmStore {
    db: Arc<Database>,
}

impl WarmStore {
    /// Create a warm store
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Upsert a record: index row, tags, FTS, embedding, and (unless the
    /// record lives in cold shards) the full document
    pub fn put(&self, record: &Record, include_document: bool) -> Result<(), StoreError> {
        let document = serde_json::to_string(record)?;
        self.db.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO records
                     (id, user_id, timestamp, timestamp_epoch, source, influence,
                      attention, quality, tier, content_hash, deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                     timestamp = excluded.timestamp,
                     timestamp_epoch = excluded.timestamp_epoch,
                     source = excluded.source,
                     influence = excluded.influence,
                     attention = excluded.attention,
                     quality = excluded.quality,
                     tier = excluded.tier,
                     content_hash = excluded.content_hash,
                     deleted = excluded.deleted",
                params![
                    record.id,
                    record.user_id,
                    record.timestamp.to_rfc3339(),
                    record.timestamp.timestamp(),
                    record.source,
                    record.influence,
                    record.attention,
                    record.quality,
                    record.tier.as_str(),
                    record.content_hash(),
                    record.deleted as i64,
                ],
            )?;

            if include_document {
                tx.execute(
                    "INSERT INTO record_docs (id, document) VALUES (?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET document = excluded.document",
                    params![record.id, document],
                )?;
            } else {
                tx.execute("DELETE FROM record_docs WHERE id = ?1", params![record.id])?;
            }

            tx.execute(
                "DELETE FROM record_tags WHERE record_id = ?1",
                params![record.id],
            )?;
            for tag in record.all_tags() {
                tx.execute(
                    "INSERT OR IGNORE INTO record_tags (record_id, user_id, tag)
                     VALUES (?1, ?2, ?3)",
                    params![record.id, record.user_id, tag],
                )?;
            }

            tx.execute("DELETE FROM records_fts WHERE id = ?1", params![record.id])?;
            if !record.deleted {
                let tags_text = record
                    .all_tags()
                    .into_iter()
                    .collect::<Vec<_>>()
                    .join(" ");
                tx.execute(
                    "INSERT INTO records_fts (id, user_id, highlight, note, tags)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        record.id,
                        record.user_id,
                        record.highlight,
                        record.note,
                        tags_text
                    ],
                )?;
            }

            match &record.embedding {
                Some(vector) if !record.deleted => {
                    tx.execute(
                        "INSERT INTO record_embeddings (record_id, user_id, embedding, dimensions, model)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT(record_id) DO UPDATE SET
                             embedding = excluded.embedding,
                             dimensions = excluded.dimensions,
                             model = excluded.model",
                        params![
                            record.id,
                            record.user_id,
                            embeddings::to_bytes(vector),
                            vector.len() as i64,
                            "",
                        ],
                    )?;
                }
                _ => {
                    tx.execute(
                        "DELETE FROM record_embeddings WHERE record_id = ?1",
                        params![record.id],
                    )?;
                }
            }

            Ok(())
        })
    }

    /// Fetch a record document by id, scoped to its owner
    pub fn get(&self, id: &str, user_id: &str) -> Result<Option<Record>, StoreError> {
        let document: Option<String> = self.db.with_reader(|conn| {
            Ok(conn
                .query_row(
                    "SELECT d.document FROM record_docs d
                     JOIN records r ON r.id = d.id
                     WHERE d.id = ?1 AND r.user_id = ?2",
                    params![id, user_id],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        match document {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    /// Fetch the index row for an id, ignoring ownership (existence checks)
    pub fn index_row(&self, id: &str) -> Result<Option<IndexRow>, StoreError> {
        self.db.with_reader(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, user_id, timestamp, source, influence, attention, quality,
                            tier, deleted
                     FROM records WHERE id = ?1",
                    params![id],
                    row_to_index,
                )
                .optional()?)
        })
    }

    /// Ids matching a filter, sorted by influence descending
    pub fn query_by_filter(&self, filter: &QueryFilter) -> Result<Vec<String>, StoreError> {
        let mut sql = String::from(
            "SELECT r.id FROM records r WHERE r.user_id = ?1 AND r.deleted = 0",
        );
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(filter.user_id.clone())];

        if let Some(min_influence) = filter.min_influence {
            args.push(Box::new(min_influence));
            sql.push_str(&format!(" AND r.influence >= ?{}", args.len()));
        }
        if let Some(sources) = &filter.sources {
            if !sources.is_empty() {
                let placeholders: Vec<String> = sources
                    .iter()
                    .map(|s| {
                        args.push(Box::new(s.clone()));
                        format!("?{}", args.len())
                    })
                    .collect();
                sql.push_str(&format!(" AND r.source IN ({})", placeholders.join(", ")));
            }
        }
        if let Some(tags) = &filter.tags {
            if !tags.is_empty() {
                let placeholders: Vec<String> = tags
                    .iter()
                    .map(|t| {
                        args.push(Box::new(t.clone()));
                        format!("?{}", args.len())
                    })
                    .collect();
                sql.push_str(&format!(
                    " AND r.id IN (SELECT record_id FROM record_tags
                       WHERE user_id = r.user_id AND tag IN ({}))",
                    placeholders.join(", ")
                ));
            }
        }
        if let Some((from, to)) = &filter.time_range {
            args.push(Box::new(from.timestamp()));
            sql.push_str(&format!(" AND r.timestamp_epoch >= ?{}", args.len()));
            args.push(Box::new(to.timestamp()));
            sql.push_str(&format!(" AND r.timestamp_epoch <= ?{}", args.len()));
        }

        sql.push_str(" ORDER BY r.influence DESC, r.timestamp_epoch DESC");
        if let Some(limit) = filter.limit {
            args.push(Box::new(limit as i64));
            sql.push_str(&format!(" LIMIT ?{}", args.len()));
        }

        self.db.with_reader(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                args.iter().map(|b| b.as_ref()).collect();
            let ids = stmt
                .query_map(params.as_slice(), |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Ids for a user inside a time range, newest first
    pub fn query_time_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        self.db.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM records
                 WHERE user_id = ?1 AND deleted = 0
                   AND timestamp_epoch >= ?2 AND timestamp_epoch <= ?3
                 ORDER BY timestamp_epoch DESC",
            )?;
            let ids = stmt
                .query_map(
                    params![user_id, from.timestamp(), to.timestamp()],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Full documents for a user's records newer than `since`, newest first
    ///
    /// The attention window is 30 days, and records younger than the warm
    /// recency bound always keep a document row, so this never needs the
    /// cold shards.
    pub fn records_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Record>, StoreError> {
        let documents: Vec<String> = self.db.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT d.document FROM record_docs d
                 JOIN records r ON r.id = d.id
                 WHERE r.user_id = ?1 AND r.deleted = 0 AND r.timestamp_epoch >= ?2
                 ORDER BY r.timestamp_epoch DESC",
            )?;
            let docs = stmt
                .query_map(params![user_id, since.timestamp()], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(docs)
        })?;
        documents
            .iter()
            .map(|d| serde_json::from_str(d).map_err(StoreError::from))
            .collect()
    }

    /// Mark a record soft-deleted; returns false when it does not exist
    pub fn soft_delete(
        &self,
        id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let record = self.get(id, user_id)?;
        let Some(mut record) = record else {
            // Index row without a document (cold tier) still gets flagged
            return self.db.with_transaction(|tx| {
                let changed = tx.execute(
                    "UPDATE records SET deleted = 1 WHERE id = ?1 AND user_id = ?2",
                    params![id, user_id],
                )?;
                tx.execute("DELETE FROM records_fts WHERE id = ?1", params![id])?;
                tx.execute(
                    "DELETE FROM record_embeddings WHERE record_id = ?1",
                    params![id],
                )?;
                Ok(changed > 0)
            });
        };

        record.deleted = true;
        record.deleted_at = Some(now);
        record.updated_at = now;
        self.put(&record, true)?;
        Ok(true)
    }

    /// Remove every trace of a record; returns false when it does not exist
    pub fn hard_delete(&self, id: &str, user_id: &str) -> Result<bool, StoreError> {
        self.db.with_transaction(|tx| {
            let changed = tx.execute(
                "DELETE FROM records WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            // FTS rows are not covered by foreign keys
            tx.execute("DELETE FROM records_fts WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
    }

    /// Full-text search over highlight (2x weight) and note
    ///
    /// Returns `(id, score)` pairs, best first.
    pub fn fulltext(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        let match_expr = sanitize_fts_query(query);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        self.db.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT f.id, -bm25(records_fts, 0.0, 0.0, 2.0, 1.0, 1.0) AS score
                 FROM records_fts f
                 WHERE records_fts MATCH ?1 AND f.user_id = ?2
                 ORDER BY score DESC
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![match_expr, user_id, limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All stored embeddings, for rebuilding the vector index at startup
    pub fn load_embeddings(&self) -> Result<Vec<(String, String, Vec<f32>)>, StoreError> {
        self.db.with_reader(|conn| {
            let mut stmt = conn
                .prepare("SELECT user_id, record_id, embedding FROM record_embeddings")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows
                .into_iter()
                .filter_map(|(user, id, bytes)| {
                    embeddings::from_bytes(&bytes).map(|v| (user, id, v))
                })
                .collect())
        })
    }

    /// Every live index row; drives the tier migration pass
    pub fn scan_index(&self) -> Result<Vec<IndexRow>, StoreError> {
        self.db.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, timestamp, source, influence, attention, quality,
                        tier, deleted
                 FROM records WHERE deleted = 0",
            )?;
            let rows = stmt
                .query_map([], row_to_index)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Update only the tier column after a migration decision
    pub fn set_tier(&self, id: &str, tier: Tier) -> Result<(), StoreError> {
        self.db.with_writer(|conn| {
            conn.execute(
                "UPDATE records SET tier = ?1 WHERE id = ?2",
                params![tier.as_str(), id],
            )?;
            Ok(())
        })
    }

    /// Drop a document row when its record moves to cold shards
    pub fn drop_document(&self, id: &str) -> Result<(), StoreError> {
        self.db.with_writer(|conn| {
            conn.execute("DELETE FROM record_docs WHERE id = ?1", params![id])?;
            Ok(())
        })
    }
}

fn row_to_index(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexRow> {
    let timestamp: String = row.get(2)?;
    Ok(IndexRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        source: row.get(3)?,
        influence: row.get(4)?,
        attention: row.get(5)?,
        quality: row.get(6)?,
        tier: Tier::parse_name(&row.get::<_, String>(7)?),
        deleted: row.get::<_, i64>(8)? != 0,
    })
}

/// Reduce arbitrary query text to a safe FTS5 OR-expression
///
/// Single-character tokens are dropped: they match half the corpus and
/// carry no signal.
fn sanitize_fts_query(query: &str) -> String {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    tokens.join(" OR ")
}

// ============================================================================
// TESTS
// ============================================================================
