//! Engine facade
//!
//! The named interface applications consume: batch ingestion, context
//! views, retrieval, and governed writes. The engine wires the pipeline
//! components together and owns the concurrency model: per-user profile
//! updates are serialized, ingestion runs behind bounded permits, and
//! read paths honor per-request deadlines.

mod types;

pub use types::{
    BatchItemError, BatchResult, ComponentSummary, ContextRequest, ContextResponse,
    ConversationalWriteRequest, ConversationalWriteResponse, EnhancementResponse, SearchRequest,
    WriteRequest,
};

use crate::attention::{AttentionScorer, HistoryEntry, HISTORY_WINDOW_DAYS};
use crate::config::EngineConfig;
use crate::embeddings::{EmbeddingProvider, HashProjectionEmbedder};
use crate::enrich::{EnrichmentPipeline, UserContext};
use crate::error::{EngineError, Result, Status};
use crate::index::{IndexLayer, SearchQuery, SearchResponse, Strategy};
use crate::intent::IntentExtractor;
use crate::permission::{Authorizer, OperationContext, OperationShape};
use crate::profile::{personalized_prompt, render, ArchivePolicy, ProfileStore, Synthesizer};
use crate::record::{Record, Validator};
use crate::store::{Database, TieredStore};
use crate::write::{
    BackupStore, ConversationalWriter, MutatedRecord, WriteExecutor, WriteOp, WriteOutcome,
};
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};

/// Maximum records per ingestion batch
pub const MAX_BATCH_RECORDS: usize = 100;
/// Maximum results per search call
pub const MAX_SEARCH_LIMIT: usize = 50;
/// Maximum results for question-scoped retrieval
pub const MAX_QUESTION_LIMIT: usize = 20;
/// Maximum knowledge components in a personalized enhancement
pub const MAX_ENHANCEMENT_CONTEXT: usize = 10;

/// The personalization engine
pub struct Engine {
    config: EngineConfig,
    validator: Validator,
    pipeline: EnrichmentPipeline,
    attention: AttentionScorer,
    extractor: IntentExtractor,
    synthesizer: Synthesizer,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<TieredStore>,
    index: Arc<IndexLayer>,
    profiles: ProfileStore,
    executor: WriteExecutor,
    authorizer: Authorizer,
    conversational: ConversationalWriter,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
    batch_permits: Arc<Semaphore>,
    user_queues: DashMap<String, Arc<Semaphore>>,
}

impl Engine {
    /// Open the engine with the default on-disk layout and embedder
    pub fn new(config: EngineConfig) -> Result<Self> {
        let data_dir = config.resolve_data_dir().map_err(crate::error::StoreError::Io)?;
        let db = Arc::new(Database::open(&data_dir.join("imprint.db"))?);
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashProjectionEmbedder::default());
        Self::with_parts(config, db, &data_dir.join("cold"), embedder)
    }

    /// Build the engine over explicit parts (embedded deployments, tests)
    pub fn with_parts(
        config: EngineConfig,
        db: Arc<Database>,
        cold_root: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let store = Arc::new(TieredStore::new(db.clone(), cold_root, &config)?);
        let index = Arc::new(IndexLayer::new(store.clone(), embedder.clone(), &config)?);
        let profiles = ProfileStore::new(
            db.clone(),
            Duration::from_secs(config.profile_cache_ttl_sec),
        );
        let backups = BackupStore::new(db.clone(), config.backup_retention_hours);
        let executor = WriteExecutor::new(store.clone(), index.clone(), backups, &config);
        let authorizer = Authorizer::new(
            db,
            config.daily_op_default,
            config.batch_size_default,
        );
        let batch_permits = Arc::new(Semaphore::new(config.max_in_flight_batches.max(1)));

        Ok(Self {
            validator: Validator::new(),
            pipeline: EnrichmentPipeline::new(embedder.clone()),
            attention: AttentionScorer::new(),
            extractor: IntentExtractor::new(),
            synthesizer: Synthesizer::new(),
            embedder,
            store,
            index,
            profiles,
            executor,
            authorizer,
            conversational: ConversationalWriter::new(),
            user_locks: DashMap::new(),
            batch_permits,
            user_queues: DashMap::new(),
            config,
        })
    }

    /// The effective configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The tiered store (diagnostics and tests)
    pub fn store(&self) -> &Arc<TieredStore> {
        &self.store
    }

    /// The authorizer, for administering permission profiles
    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// The backup store behind the write path
    pub fn backups(&self) -> &BackupStore {
        self.executor.backups()
    }

    // ========================================================================
    // INGESTION (§6.1)
    // ========================================================================

    /// Submit a batch of observations for one user
    ///
    /// Records are validated, enriched, scored, stored, and indexed;
    /// profile updates derived from the batch complete before this
    /// returns. Backpressure surfaces as a retryable `RateLimited`.
    pub async fn submit_batch(
        &self,
        app_id: &str,
        user_id: &str,
        records: Vec<crate::record::RawRecord>,
        deadline: Option<Duration>,
    ) -> Result<BatchResult> {
        if records.len() > MAX_BATCH_RECORDS {
            return Err(EngineError::BatchTooLarge {
                got: records.len(),
                limit: MAX_BATCH_RECORDS,
            });
        }

        let _global = self
            .batch_permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| EngineError::RateLimited("too many in-flight batches".into()))?;
        let queue = self
            .user_queues
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.per_user_queue_depth.max(1))))
            .clone();
        let _slot = queue
            .try_acquire_owned()
            .map_err(|_| EngineError::RateLimited(format!("queue full for user {user_id}")))?;

        let started = Instant::now();
        let now = Utc::now();
        let since = now - ChronoDuration::days(HISTORY_WINDOW_DAYS);
        let mut history: Vec<HistoryEntry> = self
            .store
            .records_since(user_id, since)?
            .iter()
            .map(HistoryEntry::from)
            .collect();

        let ctx = UserContext {
            user_id: user_id.to_string(),
            corpus_dimensions: Some(self.embedder.dimensions()),
        };
        let mut result = BatchResult {
            status: Status::Success,
            processed_count: 0,
            errors: Vec::new(),
            degraded: false,
        };
        let mut intents = Vec::new();

        for (position, raw) in records.into_iter().enumerate() {
            if let Some(deadline) = deadline {
                if started.elapsed() > deadline {
                    result.errors.push(BatchItemError {
                        index: position,
                        id: raw.id.clone(),
                        message: "deadline exceeded; record not processed (retryable)".into(),
                    });
                    continue;
                }
            }

            let id = raw.id.clone();
            match self.ingest_one(raw, user_id, app_id, &ctx, &mut history) {
                Ok(Some(record)) => {
                    result.processed_count += 1;
                    if record.processing.is_degraded() {
                        result.degraded = true;
                    }
                    intents.extend(self.extractor.extract(&record));
                }
                Ok(None) => {
                    // Idempotent re-ingest of identical content
                    result.processed_count += 1;
                }
                Err(e) => {
                    result.errors.push(BatchItemError {
                        index: position,
                        id,
                        message: e.to_string(),
                    });
                }
            }
        }

        if !intents.is_empty() {
            self.update_profile(user_id, intents).await?;
        }

        let failed = result.errors.len();
        result.status = Status::from_counts(result.processed_count, failed);
        Ok(result)
    }

    /// Validate, enrich, score, store, and index one record
    ///
    /// Returns `None` for an idempotent re-ingest (same id, same content).
    fn ingest_one(
        &self,
        raw: crate::record::RawRecord,
        user_id: &str,
        app_id: &str,
        ctx: &UserContext,
        history: &mut Vec<HistoryEntry>,
    ) -> Result<Option<Record>> {
        let now = Utc::now();
        let mut record = self
            .validator
            .normalize(raw, user_id, now)
            .map_err(EngineError::Validation)?;
        if record.source.is_empty() {
            record.source = app_id.to_string();
        }

        if let Some(existing) = self.store.index_row(&record.id)? {
            if existing.user_id != user_id {
                return Err(EngineError::Conflict(format!(
                    "id {} belongs to another user's record",
                    record.id
                )));
            }
            if existing.deleted {
                if !self.config.revive_on_reingest {
                    return Err(EngineError::Conflict(format!(
                        "id {} names a soft-deleted record; use the governed restore path",
                        record.id
                    )));
                }
                // Revive: continue as a rewrite, audit history untouched
            } else if let Some(stored) = self.store.get(&record.id, user_id)? {
                if stored.content_hash() == record.content_hash() {
                    return Ok(None);
                }
            }
        }

        self.pipeline.enrich(&mut record, ctx);
        let (attention, metrics) = self.attention.score(&record, history);
        record.attention = attention;
        record.attention_metrics = Some(metrics);
        record.reroute(self.store.policy(), now);

        self.store.put(&record)?;
        self.index.index_record(&record);
        history.insert(0, HistoryEntry::from(&record));
        Ok(Some(record))
    }

    /// Apply intents to a user's profile under the user's lock
    async fn update_profile(
        &self,
        user_id: &str,
        intents: Vec<crate::intent::Intent>,
    ) -> Result<()> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let now = Utc::now();
        let mut profile = self.profiles.load(user_id)?;
        self.synthesizer.apply(&mut profile, intents, now);
        self.synthesizer.archive_low_weight(
            &mut profile,
            &ArchivePolicy {
                weight_floor: self.config.archive_weight_floor,
                after_days: self.config.archive_after_days,
            },
            now,
        );
        self.profiles.save(&profile)?;
        Ok(())
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ========================================================================
    // PROFILE CONTEXT (§6.2)
    // ========================================================================

    /// The context view downstream apps prepend to their prompts
    pub async fn get_context(&self, req: ContextRequest) -> Result<ContextResponse> {
        let profile = self.profiles.load(&req.user_id)?;
        let request_embedding = req
            .current_request
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .and_then(|t| self.embedder.embed(t).ok());
        let view = render(&profile, request_embedding.as_deref());

        let details = req.include_details.then(|| {
            let mut components: Vec<ComponentSummary> = profile
                .live_components()
                .map(|c| ComponentSummary {
                    id: c.id.clone(),
                    kind: c.kind,
                    description: c.description.clone(),
                    normalized_weight: c.normalized_weight,
                    priority: c.priority,
                    confidence: c.confidence,
                    evidence_count: c.evidence.len(),
                })
                .collect();
            components.sort_by(|a, b| {
                b.normalized_weight
                    .partial_cmp(&a.normalized_weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            components
        });

        Ok(ContextResponse { view, details })
    }

    // ========================================================================
    // RETRIEVAL (§6.3)
    // ========================================================================

    /// Ranked multi-strategy search over the user's corpus
    pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
        let query = SearchQuery {
            user_id: req.user_id.clone(),
            query_text: req.query_text.clone(),
            query_vector: req.query_vector.clone(),
            filter: req.filters.clone(),
            limit: req.limit.min(MAX_SEARCH_LIMIT).max(1),
            min_relevance: req
                .min_relevance_score
                .unwrap_or(self.config.min_relevance_default),
            strategies: None,
        };
        self.search_with_deadline(query, req.deadline_ms.map(Duration::from_millis))
            .await
    }

    /// Vector + text fusion only, independent of the profile
    pub async fn query_relevant_for_question(
        &self,
        user_id: &str,
        question: &str,
        limit: usize,
        min_relevance_score: Option<f64>,
    ) -> Result<SearchResponse> {
        let query = SearchQuery {
            user_id: user_id.to_string(),
            query_text: Some(question.to_string()),
            query_vector: None,
            filter: crate::store::QueryFilter {
                user_id: user_id.to_string(),
                ..Default::default()
            },
            limit: limit.min(MAX_QUESTION_LIMIT).max(1),
            min_relevance: min_relevance_score.unwrap_or(self.config.min_relevance_default),
            strategies: Some(vec![Strategy::Semantic, Strategy::FullText]),
        };
        self.search_with_deadline(query, None).await
    }

    /// Personalized prompt plus the supporting knowledge components
    pub async fn personalized_enhancement(
        &self,
        user_id: &str,
        question: &str,
        context_limit: usize,
    ) -> Result<EnhancementResponse> {
        let profile = self.profiles.load(user_id)?;
        let question_embedding = self.embedder.embed(question).ok();
        let view = render(&profile, question_embedding.as_deref());

        // The context limit bounds this surface; no relevance floor, the
        // fusion ranking alone decides what fills the slots
        let retrieval = self
            .query_relevant_for_question(
                user_id,
                question,
                context_limit.min(MAX_ENHANCEMENT_CONTEXT).max(1),
                Some(0.0),
            )
            .await?;

        let live = profile.live_components().count();
        let psp_summary = format!(
            "{live} profile components, {} active; last updated {}",
            view.active_components_count,
            view.last_updated.to_rfc3339()
        );

        Ok(EnhancementResponse {
            personalized_prompt: personalized_prompt(&view, question),
            knowledge_components: retrieval.results,
            psp_summary,
        })
    }

    async fn search_with_deadline(
        &self,
        query: SearchQuery,
        deadline: Option<Duration>,
    ) -> Result<SearchResponse> {
        let index = self.index.clone();
        let task = tokio::task::spawn_blocking(move || index.search(&query));

        let joined = match deadline {
            Some(deadline) => match tokio::time::timeout(deadline, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    // Abandon the in-flight read; partial answer, degraded
                    return Ok(SearchResponse {
                        results: Vec::new(),
                        degraded: true,
                        strategies_used: Vec::new(),
                    });
                }
            },
            None => task.await,
        };
        joined
            .map_err(|e| EngineError::TierUnavailable(format!("search task failed: {e}")))?
            .map_err(EngineError::from)
    }

    // ========================================================================
    // GOVERNED WRITES (§6.4)
    // ========================================================================

    /// Execute a governed mutation
    pub async fn write(&self, req: WriteRequest) -> Result<WriteOutcome> {
        let estimate = self.executor.estimate(&req.user_id, &req.op)?;
        let shape = OperationShape {
            kind: Some(req.op.kind()),
            estimated_affected: estimate.matched_count,
            hard_delete: req.op.is_hard_delete(),
            target_sources: estimate.target_sources,
        };

        let decision = self
            .authorizer
            .authorize(&req.user_id, &shape, &req.context, req.dry_run)?;
        if !decision.allowed {
            return Err(decision.into_error());
        }

        let lock = self.user_lock(&req.user_id);
        let _guard = lock.lock().await;

        let result = self.executor.execute(
            &req.user_id,
            &req.op,
            req.dry_run,
            req.batch_size,
            req.deadline_ms.map(Duration::from_millis),
        )?;
        let mut outcome = result.outcome;

        if !req.dry_run {
            if let Err(e) = self.repropagate(&req.user_id, result.mutated).await {
                outcome
                    .warnings
                    .push(format!("post-mutation propagation incomplete: {e}"));
            }
        }
        Ok(outcome)
    }

    /// Bulk specialization of [`Engine::write`] (§6.4 `POST bulk`)
    ///
    /// Progress lands in the per-item outcomes: each batch commits at
    /// the tier boundary, and an expired deadline stops at the next
    /// checkpoint with the remaining items marked cancelled.
    pub async fn bulk(&self, req: WriteRequest) -> Result<WriteOutcome> {
        if !req.op.kind().is_bulk() {
            return Err(EngineError::Validation(vec![
                crate::record::ValidationIssue {
                    field: "op".into(),
                    message: format!("{} is not a bulk operation", req.op.kind()),
                },
            ]));
        }
        self.write(req).await
    }

    /// Delete records (§6.4 `POST delete`)
    pub async fn delete(
        &self,
        user_id: &str,
        ids: Vec<String>,
        soft: bool,
        context: OperationContext,
    ) -> Result<WriteOutcome> {
        self.write(WriteRequest {
            user_id: user_id.to_string(),
            op: WriteOp::Delete { ids, soft },
            intent_description: String::new(),
            dry_run: false,
            batch_size: None,
            deadline_ms: None,
            context,
        })
        .await
    }

    /// Recent audit entries for a user
    pub fn write_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<crate::permission::AuditEntry>> {
        Ok(self.authorizer.audit().recent(user_id, limit.max(1))?)
    }

    /// Restore records from a retained backup snapshot
    pub async fn restore_backup(&self, user_id: &str, backup_id: &str) -> Result<usize> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.executor.restore(user_id, backup_id)
    }

    /// Conversational write: map a structured intent onto the write path
    pub async fn conversational_write(
        &self,
        req: ConversationalWriteRequest,
    ) -> Result<ConversationalWriteResponse> {
        if req.auto_confirm {
            let (op, outcome) = self
                .conversational
                .propose(&req.user_id, &req.intent, true)?;
            let Some(op) = op else {
                return Err(EngineError::Conflict(
                    "auto-confirmed intent produced no operation".into(),
                ));
            };
            let write_outcome = self
                .write(WriteRequest {
                    user_id: req.user_id,
                    op,
                    intent_description: req.intent.description.clone(),
                    dry_run: req.dry_run,
                    batch_size: None,
                    deadline_ms: None,
                    context: req.context,
                })
                .await?;
            return Ok(ConversationalWriteResponse {
                session_id: None,
                needs_confirmation: false,
                description: outcome.description,
                preview: Some(write_outcome),
            });
        }

        // Preview the impact, then park the operation for confirmation
        let preview = if req.dry_run {
            let op = req.intent.to_op(&req.user_id)?;
            Some(
                self.write(WriteRequest {
                    user_id: req.user_id.clone(),
                    op,
                    intent_description: req.intent.description.clone(),
                    dry_run: true,
                    batch_size: None,
                    deadline_ms: None,
                    context: req.context.clone(),
                })
                .await?,
            )
        } else {
            None
        };

        let (_, outcome) = self
            .conversational
            .propose(&req.user_id, &req.intent, false)?;
        Ok(ConversationalWriteResponse {
            session_id: outcome.session_id,
            needs_confirmation: true,
            description: outcome.description,
            preview,
        })
    }

    /// Resolve a pending conversational write
    pub async fn confirm_write(
        &self,
        session_id: &str,
        confirmed: bool,
        context: OperationContext,
    ) -> Result<Option<WriteOutcome>> {
        let Some((user_id, op, description)) =
            self.conversational.confirm(session_id, confirmed)?
        else {
            return Ok(None);
        };
        let outcome = self
            .write(WriteRequest {
                user_id,
                op,
                intent_description: description,
                dry_run: false,
                batch_size: None,
                deadline_ms: None,
                context,
            })
            .await?;
        Ok(Some(outcome))
    }

    /// Re-enrich, re-score, re-route, re-index, and re-derive intents for
    /// records a mutation touched
    async fn repropagate(&self, user_id: &str, mutated: Vec<MutatedRecord>) -> Result<()> {
        if mutated.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let since = now - ChronoDuration::days(HISTORY_WINDOW_DAYS);
        let history: Vec<HistoryEntry> = self
            .store
            .records_since(user_id, since)?
            .iter()
            .map(HistoryEntry::from)
            .collect();
        let ctx = UserContext {
            user_id: user_id.to_string(),
            corpus_dimensions: Some(self.embedder.dimensions()),
        };

        let mut intents = Vec::new();
        for MutatedRecord {
            mut record,
            content_changed,
        } in mutated
        {
            if record.deleted {
                continue;
            }
            if content_changed {
                self.pipeline.enrich(&mut record, &ctx);
            }
            // A record is not its own history
            let window: Vec<HistoryEntry> = history
                .iter()
                .filter(|h| h.id != record.id)
                .cloned()
                .collect();
            let (attention, metrics) = self.attention.score(&record, &window);
            record.attention = attention;
            record.attention_metrics = Some(metrics);
            record.reroute(self.store.policy(), now);
            self.store.put(&record)?;
            self.index.index_record(&record);
            intents.extend(self.extractor.extract(&record));
        }

        if !intents.is_empty() {
            // Already under the user lock from the write path
            let mut profile = self.profiles.load(user_id)?;
            self.synthesizer.apply(&mut profile, intents, now);
            self.profiles.save(&profile)?;
        }
        Ok(())
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// One background maintenance pass: tier migration, cache expiry,
    /// backup retention, stale confirmation sessions
    pub fn run_maintenance(&self) -> Result<crate::store::MigrationReport> {
        let report = self.store.migrate(Utc::now())?;
        self.store.sweep();
        self.profiles.sweep();
        self.executor.backups().sweep_expired()?;
        self.conversational.sweep_expired();
        tracing::debug!(
            examined = report.examined,
            moved = report.moved,
            "maintenance pass complete"
        );
        Ok(report)
    }

    /// Spawn a periodic maintenance task; stop it via `JoinHandle::abort`
    pub fn start_maintenance(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = engine.run_maintenance() {
                    tracing::warn!("maintenance pass failed: {e}");
                }
            }
        })
    }
}
