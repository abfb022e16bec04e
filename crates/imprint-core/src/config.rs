//! Engine configuration
//!
//! Every tunable the core recognizes, with the defaults the rest of the
//! crate assumes. Deployments deserialize this from their own config
//! layer; the library never reads files or environment variables itself.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tier routing thresholds
///
/// `tier_for` in the record module is a pure function of these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TierPolicy {
    /// Influence above which a record is hot regardless of age
    pub min_influence_hot: f64,
    /// Influence above which a record is at least warm
    pub min_influence_warm: f64,
    /// Age in days under which a record is hot
    pub recency_hot_days: i64,
    /// Age in days under which a record is at least warm
    pub recency_warm_days: i64,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            min_influence_hot: 0.7,
            min_influence_warm: 0.3,
            recency_hot_days: 7,
            recency_warm_days: 30,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Data directory; `None` resolves to the platform data dir
    pub data_dir: Option<PathBuf>,

    /// Read-through record cache TTL in seconds
    pub cache_ttl_sec: u64,
    /// Hot tier entry TTL in seconds (7 days)
    pub hot_ttl_sec: u64,
    /// Hot tier capacity; eviction removes lowest influence first
    pub hot_capacity: usize,

    /// Enable the semantic (vector) search strategy
    pub enable_vector_index: bool,
    /// Enable the full-text search strategy
    pub enable_fulltext_index: bool,

    /// Tier routing thresholds
    pub tiers: TierPolicy,

    /// Profile cache TTL in seconds
    pub profile_cache_ttl_sec: u64,

    /// Default bulk batch size when the request does not set one
    pub batch_size_default: usize,
    /// No bulk operation may exceed this many matched records
    pub batch_size_hard_cap: usize,
    /// Default daily operation limit for new permission profiles
    pub daily_op_default: u32,
    /// Backup snapshot retention window in hours
    pub backup_retention_hours: i64,

    /// Default relevance floor for retrieval when the request omits one
    pub min_relevance_default: f64,

    /// Maximum concurrently processed ingestion batches
    pub max_in_flight_batches: usize,
    /// Maximum queued batches per user before Busy is returned
    pub per_user_queue_depth: usize,
    /// Bounded worker pool size for enrichment stages
    pub enrich_workers: usize,

    /// Components below this normalized weight are archival candidates
    pub archive_weight_floor: f64,
    /// Days a component must stay below the floor before archival
    pub archive_after_days: i64,
    /// Revive a soft-deleted record when the same id is re-ingested;
    /// when false the re-ingest is rejected as a conflict
    pub revive_on_reingest: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            cache_ttl_sec: 60,
            hot_ttl_sec: 7 * 24 * 3600,
            hot_capacity: 10_000,
            enable_vector_index: true,
            enable_fulltext_index: true,
            tiers: TierPolicy::default(),
            profile_cache_ttl_sec: 3600,
            batch_size_default: 100,
            batch_size_hard_cap: 1000,
            daily_op_default: 100,
            backup_retention_hours: 24,
            min_relevance_default: 0.5,
            max_in_flight_batches: 32,
            per_user_queue_depth: 4,
            enrich_workers: 8,
            archive_weight_floor: 0.01,
            archive_after_days: 90,
            revive_on_reingest: false,
        }
    }
}

impl EngineConfig {
    /// Resolve the data directory, creating it if necessary
    pub fn resolve_data_dir(&self) -> std::io::Result<PathBuf> {
        let dir = match &self.data_dir {
            Some(d) => d.clone(),
            None => directories::ProjectDirs::from("com", "imprint", "core")
                .map(|p| p.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".imprint")),
        };
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.tiers.min_influence_hot, 0.7);
        assert_eq!(cfg.tiers.min_influence_warm, 0.3);
        assert_eq!(cfg.tiers.recency_hot_days, 7);
        assert_eq!(cfg.tiers.recency_warm_days, 30);
        assert_eq!(cfg.batch_size_hard_cap, 1000);
        assert_eq!(cfg.backup_retention_hours, 24);
        assert!(!cfg.revive_on_reingest);
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"enableVectorIndex": false}"#).expect("parse");
        assert!(!cfg.enable_vector_index);
        assert!(cfg.enable_fulltext_index);
        assert_eq!(cfg.hot_capacity, 10_000);
    }
}
