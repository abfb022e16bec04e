//! Write executor
//!
//! Applies validated mutations to the tiered store. The executor owns
//! targeting (filter resolution), dry-run estimation, backups, batching,
//! and per-item outcomes; re-enrichment and profile repropagation happen
//! in the engine, driven by the `content_changed` flag on each mutated
//! record.

use super::{
    BackupStore, ItemOutcome, RecordPatch, SplitSpec, UpdateOptions, WriteOp, WriteOutcome,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result, Status};
use crate::index::IndexLayer;
use crate::record::{normalize_tags, Record, Validator};
use crate::store::TieredStore;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// Sample size included in dry-run previews
const PREVIEW_SAMPLE: usize = 5;

/// A record the executor touched
#[derive(Debug, Clone)]
pub struct MutatedRecord {
    /// The record after the mutation
    pub record: Record,
    /// True when content-bearing fields changed and the record needs
    /// re-enrichment before rescoring
    pub content_changed: bool,
}

/// Executor result: the caller-facing outcome plus repropagation input
#[derive(Debug, Clone)]
pub struct MutationResult {
    /// Caller-facing outcome
    pub outcome: WriteOutcome,
    /// Records to repropagate through enrichment/attention/profile
    pub mutated: Vec<MutatedRecord>,
}

/// Pre-mutation impact of an operation, for dry-run previews and risk
/// assessment
#[derive(Debug, Clone, Default)]
pub struct ImpactEstimate {
    /// Records the operation would touch
    pub matched_count: usize,
    /// Sample of matched ids
    pub sample: Vec<String>,
    /// Distinct data sources of the targeted records
    pub target_sources: Vec<String>,
}

/// The write executor
pub struct WriteExecutor {
    store: Arc<TieredStore>,
    index: Arc<IndexLayer>,
    backups: BackupStore,
    batch_size_default: usize,
    batch_size_hard_cap: usize,
}

impl WriteExecutor {
    /// Create an executor
    pub fn new(
        store: Arc<TieredStore>,
        index: Arc<IndexLayer>,
        backups: BackupStore,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            index,
            backups,
            batch_size_default: config.batch_size_default.max(1),
            batch_size_hard_cap: config.batch_size_hard_cap.max(1),
        }
    }

    /// The backup store behind this executor
    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Pre-mutation impact estimate
    pub fn estimate(&self, user_id: &str, op: &WriteOp) -> Result<ImpactEstimate> {
        let matched = match op {
            WriteOp::Create { draft } => {
                return Ok(ImpactEstimate {
                    matched_count: 1,
                    sample: draft.id.clone().into_iter().collect(),
                    target_sources: draft.source.clone().into_iter().collect(),
                });
            }
            WriteOp::Update { id, .. } | WriteOp::Split { id, .. } => {
                self.existing_owned(user_id, std::slice::from_ref(id))?
            }
            WriteOp::Delete { ids, .. } | WriteOp::Merge { ids } => {
                self.existing_owned(user_id, ids)?
            }
            WriteOp::BulkTag { filter, .. }
            | WriteOp::BulkRetag { filter, .. }
            | WriteOp::BatchUpdate { filter, .. } => {
                let mut scoped = filter.clone();
                scoped.user_id = user_id.to_string();
                scoped.limit = None;
                self.store.query_by_filter(&scoped)?
            }
        };

        let mut target_sources = BTreeSet::new();
        for id in &matched {
            if let Some(row) = self.store.index_row(id)? {
                if row.user_id == user_id && !row.source.is_empty() {
                    target_sources.insert(row.source);
                }
            }
        }

        Ok(ImpactEstimate {
            matched_count: matched.len(),
            sample: matched.iter().take(PREVIEW_SAMPLE).cloned().collect(),
            target_sources: target_sources.into_iter().collect(),
        })
    }

    /// Execute a mutation
    ///
    /// Dry runs return the impact estimate without touching the store or
    /// creating a backup. Real runs snapshot every affected record first.
    /// Bulk operations commit per batch; an expired deadline stops
    /// further batches at the checkpoint, never mid-record.
    pub fn execute(
        &self,
        user_id: &str,
        op: &WriteOp,
        dry_run: bool,
        batch_size: Option<usize>,
        deadline: Option<std::time::Duration>,
    ) -> Result<MutationResult> {
        let started = Instant::now();
        let operation_id = format!("op_{}", uuid::Uuid::new_v4());
        let estimate = self.estimate(user_id, op)?;
        let matched_count = estimate.matched_count;
        let sample = estimate.sample;

        if matched_count > self.batch_size_hard_cap {
            return Err(EngineError::BatchTooLarge {
                got: matched_count,
                limit: self.batch_size_hard_cap,
            });
        }

        if dry_run {
            return Ok(MutationResult {
                outcome: WriteOutcome {
                    operation_id,
                    status: Status::Success,
                    affected_count: 0,
                    matched_count,
                    sample,
                    per_item: Vec::new(),
                    errors: Vec::new(),
                    warnings: Vec::new(),
                    backup_id: None,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                    dry_run: true,
                },
                mutated: Vec::new(),
            });
        }

        // Snapshot affected records before mutating; creates have nothing
        // to cover yet
        let affected_before = self.load_targets(user_id, op)?;
        let backup_id = if affected_before.is_empty() {
            None
        } else {
            Some(
                self.backups
                    .create(user_id, &operation_id, &affected_before)?,
            )
        };

        if op.is_hard_delete() && backup_id.is_none() && matched_count > 0 {
            return Err(EngineError::Conflict(
                "hard delete requires a backup snapshot of the affected records".into(),
            ));
        }

        let batch = batch_size.unwrap_or(self.batch_size_default).max(1);
        let mut per_item: Vec<ItemOutcome> = Vec::new();
        let mut mutated: Vec<MutatedRecord> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        match op {
            WriteOp::Create { draft } => {
                let record = self.apply_create(user_id, draft.clone())?;
                per_item.push(ok_item(&record.id));
                mutated.push(MutatedRecord {
                    record,
                    content_changed: true,
                });
            }
            WriteOp::Update { id, patch, options } => {
                let record = self.apply_update(user_id, id, patch, *options)?;
                per_item.push(ok_item(id));
                let content_changed = patch.touches_content() && !options.preserve_derived;
                mutated.push(MutatedRecord {
                    record,
                    content_changed,
                });
            }
            WriteOp::Delete { ids, soft } => {
                for chunk in ids.chunks(batch) {
                    if deadline_expired(started, deadline) {
                        cancel_remaining(ids, &mut per_item);
                        break;
                    }
                    for id in chunk {
                        match self.apply_delete(user_id, id, *soft) {
                            Ok(record) => {
                                per_item.push(ok_item(id));
                                if let Some(record) = record {
                                    mutated.push(MutatedRecord {
                                        record,
                                        content_changed: false,
                                    });
                                }
                            }
                            Err(e) => per_item.push(failed_item(id, &e)),
                        }
                    }
                }
            }
            WriteOp::BulkTag { tags, .. } | WriteOp::BulkRetag { tags, .. } => {
                let replace = matches!(op, WriteOp::BulkRetag { .. });
                let ids: Vec<String> = affected_before.iter().map(|r| r.id.clone()).collect();
                for chunk in ids.chunks(batch) {
                    if deadline_expired(started, deadline) {
                        cancel_remaining(&ids, &mut per_item);
                        break;
                    }
                    for id in chunk {
                        match self.apply_retag(user_id, id, tags, replace) {
                            Ok(record) => {
                                per_item.push(ok_item(id));
                                mutated.push(MutatedRecord {
                                    record,
                                    content_changed: false,
                                });
                            }
                            Err(e) => per_item.push(failed_item(id, &e)),
                        }
                    }
                }
            }
            WriteOp::BatchUpdate { patch, .. } => {
                let ids: Vec<String> = affected_before.iter().map(|r| r.id.clone()).collect();
                for chunk in ids.chunks(batch) {
                    if deadline_expired(started, deadline) {
                        cancel_remaining(&ids, &mut per_item);
                        break;
                    }
                    for id in chunk {
                        match self.apply_update(user_id, id, patch, UpdateOptions::default()) {
                            Ok(record) => {
                                per_item.push(ok_item(id));
                                mutated.push(MutatedRecord {
                                    record,
                                    content_changed: patch.touches_content(),
                                });
                            }
                            Err(e) => per_item.push(failed_item(id, &e)),
                        }
                    }
                }
            }
            WriteOp::Merge { ids } => {
                let (survivor, removed) = self.apply_merge(user_id, ids)?;
                per_item.push(ok_item(&survivor.record.id));
                for record in &removed {
                    per_item.push(ok_item(&record.id));
                }
                mutated.push(survivor);
                mutated.extend(removed.into_iter().map(|record| MutatedRecord {
                    record,
                    content_changed: false,
                }));
            }
            WriteOp::Split { id, spec } => {
                let (parts, original) = self.apply_split(user_id, id, spec)?;
                per_item.push(ok_item(id));
                for part in &parts {
                    per_item.push(ok_item(&part.record.id));
                }
                mutated.extend(parts);
                mutated.push(MutatedRecord {
                    record: original,
                    content_changed: false,
                });
            }
        }

        let ok = per_item.iter().filter(|i| i.success).count();
        let failed = per_item.len() - ok;
        if failed > 0 {
            errors.push(format!("{failed} of {} items failed", per_item.len()));
        }

        Ok(MutationResult {
            outcome: WriteOutcome {
                operation_id,
                status: Status::from_counts(ok, failed),
                affected_count: ok,
                matched_count,
                sample,
                per_item,
                errors,
                warnings: Vec::new(),
                backup_id,
                processing_time_ms: started.elapsed().as_millis() as u64,
                dry_run: false,
            },
            mutated,
        })
    }

    /// Put records from a snapshot back into the store
    pub fn restore(&self, user_id: &str, backup_id: &str) -> Result<usize> {
        let snapshot = self
            .backups
            .get(backup_id)?
            .ok_or_else(|| EngineError::NotFound(format!("backup {backup_id}")))?;
        if snapshot.user_id != user_id {
            return Err(EngineError::NotFound(format!("backup {backup_id}")));
        }
        for record in &snapshot.records {
            self.store.put(record)?;
            self.index.index_record(record);
        }
        tracing::info!(
            user_id = %user_id,
            backup_id = %backup_id,
            count = snapshot.records.len(),
            "restored records from backup"
        );
        Ok(snapshot.records.len())
    }

    // ========================================================================
    // PER-KIND APPLICATION
    // ========================================================================

    fn apply_create(&self, user_id: &str, draft: crate::record::RawRecord) -> Result<Record> {
        let now = Utc::now();
        let record = Validator::new()
            .normalize(draft, user_id, now)
            .map_err(EngineError::Validation)?;

        if let Some(existing) = self.store.index_row(&record.id)? {
            let what = if existing.deleted { "a soft-deleted" } else { "an existing" };
            return Err(EngineError::Conflict(format!(
                "id {} already names {what} record",
                record.id
            )));
        }

        self.store.put(&record)?;
        Ok(record)
    }

    fn apply_update(
        &self,
        user_id: &str,
        id: &str,
        patch: &RecordPatch,
        options: UpdateOptions,
    ) -> Result<Record> {
        let mut record = self
            .store
            .get_any(id, user_id)?
            .ok_or_else(|| EngineError::NotFound(format!("record {id}")))?;
        if record.deleted {
            return Err(EngineError::Conflict(format!(
                "record {id} is soft-deleted; restore it before updating"
            )));
        }

        if let Some(highlight) = &patch.highlight {
            record.highlight = highlight.clone();
        }
        if let Some(note) = &patch.note {
            record.note = note.clone();
        }
        if let Some(address) = &patch.address {
            record.address = address.clone();
        }
        if let Some(access) = patch.access {
            record.access = access;
        }
        if let Some(tags) = &patch.tags {
            record.tags = if options.merge_tags {
                merge_tag_sets(&record.tags, tags)
            } else {
                normalize_tags(tags.clone())
            };
        }
        record.updated_at = Utc::now();

        self.store.put(&record)?;
        self.index.index_record(&record);
        Ok(record)
    }

    fn apply_delete(&self, user_id: &str, id: &str, soft: bool) -> Result<Option<Record>> {
        if soft {
            let now = Utc::now();
            if !self.store.soft_delete(id, user_id, now)? {
                return Err(EngineError::NotFound(format!("record {id}")));
            }
            self.index.remove_record(user_id, id);
            Ok(self.store.get_any(id, user_id)?)
        } else {
            if !self.store.hard_delete(id, user_id)? {
                return Err(EngineError::NotFound(format!("record {id}")));
            }
            self.index.remove_record(user_id, id);
            Ok(None)
        }
    }

    fn apply_retag(
        &self,
        user_id: &str,
        id: &str,
        tags: &[String],
        replace: bool,
    ) -> Result<Record> {
        let patch = RecordPatch {
            tags: Some(tags.to_vec()),
            ..Default::default()
        };
        let options = UpdateOptions {
            merge_tags: !replace,
            preserve_derived: true,
        };
        self.apply_update(user_id, id, &patch, options)
    }

    fn apply_merge(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<(MutatedRecord, Vec<Record>)> {
        if ids.len() < 2 {
            return Err(EngineError::Validation(vec![
                crate::record::ValidationIssue {
                    field: "ids".into(),
                    message: "merge needs at least two records".into(),
                },
            ]));
        }
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let record = self
                .store
                .get(id, user_id)?
                .ok_or_else(|| EngineError::NotFound(format!("record {id}")))?;
            records.push(record);
        }

        let mut survivor = records.remove(0);
        let now = Utc::now();
        let mut tags: BTreeSet<String> = survivor.tags.iter().cloned().collect();
        for other in &records {
            if !other.note.trim().is_empty() {
                if !survivor.note.trim().is_empty() {
                    survivor.note.push_str("\n\n");
                }
                survivor.note.push_str(&other.note);
            }
            tags.extend(other.tags.iter().cloned());
        }
        survivor.tags = tags.into_iter().collect();
        survivor.updated_at = now;
        self.store.put(&survivor)?;
        self.index.index_record(&survivor);

        let mut removed = Vec::with_capacity(records.len());
        for other in records {
            self.store.soft_delete(&other.id, user_id, now)?;
            self.index.remove_record(user_id, &other.id);
            if let Some(record) = self.store.get_any(&other.id, user_id)? {
                removed.push(record);
            }
        }

        Ok((
            MutatedRecord {
                record: survivor,
                content_changed: true,
            },
            removed,
        ))
    }

    fn apply_split(
        &self,
        user_id: &str,
        id: &str,
        spec: &SplitSpec,
    ) -> Result<(Vec<MutatedRecord>, Record)> {
        if spec.parts.is_empty() {
            return Err(EngineError::Validation(vec![
                crate::record::ValidationIssue {
                    field: "spec.parts".into(),
                    message: "split needs at least one part".into(),
                },
            ]));
        }
        let original = self
            .store
            .get(id, user_id)?
            .ok_or_else(|| EngineError::NotFound(format!("record {id}")))?;

        let now = Utc::now();
        let mut parts = Vec::with_capacity(spec.parts.len());
        for (i, note) in spec.parts.iter().enumerate() {
            let mut part = original.clone();
            part.id = format!("{id}::part{}", i + 1);
            part.note = note.clone();
            part.created_at = now;
            part.updated_at = now;
            part.deleted = false;
            part.deleted_at = None;
            if self.store.index_row(&part.id)?.is_some() {
                return Err(EngineError::Conflict(format!(
                    "split target id {} already exists",
                    part.id
                )));
            }
            self.store.put(&part)?;
            parts.push(MutatedRecord {
                record: part,
                content_changed: true,
            });
        }

        self.store.soft_delete(id, user_id, now)?;
        self.index.remove_record(user_id, id);
        let original = self
            .store
            .get_any(id, user_id)?
            .unwrap_or(original);

        Ok((parts, original))
    }

    /// Full pre-images of the records an operation will touch
    fn load_targets(&self, user_id: &str, op: &WriteOp) -> Result<Vec<Record>> {
        let ids: Vec<String> = match op {
            WriteOp::Create { .. } => Vec::new(),
            WriteOp::Update { id, .. } | WriteOp::Split { id, .. } => vec![id.clone()],
            WriteOp::Delete { ids, .. } | WriteOp::Merge { ids } => ids.clone(),
            WriteOp::BulkTag { filter, .. }
            | WriteOp::BulkRetag { filter, .. }
            | WriteOp::BatchUpdate { filter, .. } => {
                let mut scoped = filter.clone();
                scoped.user_id = user_id.to_string();
                scoped.limit = None;
                self.store.query_by_filter(&scoped)?
            }
        };
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.store.get_any(&id, user_id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Ids from the list that exist and belong to the user
    fn existing_owned(&self, user_id: &str, ids: &[String]) -> Result<Vec<String>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(row) = self.store.index_row(id)? {
                if row.user_id == user_id {
                    found.push(id.clone());
                }
            }
        }
        Ok(found)
    }
}

fn merge_tag_sets(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut combined: Vec<String> = existing.to_vec();
    combined.extend(incoming.iter().cloned());
    normalize_tags(combined)
}

fn deadline_expired(started: Instant, deadline: Option<std::time::Duration>) -> bool {
    deadline.map(|d| started.elapsed() > d).unwrap_or(false)
}

/// Mark every id not yet processed as cancelled
///
/// `per_item` holds exactly one entry per id already handled, in order,
/// so the unprocessed tail starts at its length.
fn cancel_remaining(ids: &[String], per_item: &mut Vec<ItemOutcome>) {
    for id in ids.iter().skip(per_item.len()) {
        per_item.push(ItemOutcome {
            id: id.clone(),
            success: false,
            error: Some("cancelled at batch checkpoint: deadline exceeded".into()),
        });
    }
}

fn ok_item(id: &str) -> ItemOutcome {
    ItemOutcome {
        id: id.to_string(),
        success: true,
        error: None,
    }
}

fn failed_item(id: &str, error: &EngineError) -> ItemOutcome {
    ItemOutcome {
        id: id.to_string(),
        success: false,
        error: Some(error.to_string()),
    }
}

// ============================================================================
// TESTS
// ============================================================================
