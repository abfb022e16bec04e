//! Database migrations
//!
//! Schema migration definitions for the relational layer. The same
//! database backs the warm tier, profile persistence, and governance
//! tables (audit, backups, permission profiles).

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Warm tier: record index, documents, tags, embeddings, FTS5",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Profile synthesis: PSP components",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Governance: permission profiles, audit log, backups",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: warm tier
const MIGRATION_V1_UP: &str = r#"
-- Normalized index row for every record, regardless of tier
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    timestamp_epoch INTEGER NOT NULL,
    source TEXT NOT NULL,
    influence REAL NOT NULL DEFAULT 0.05,
    attention REAL NOT NULL DEFAULT 0.0,
    quality REAL NOT NULL DEFAULT 0.0,
    tier TEXT NOT NULL DEFAULT 'warm',
    content_hash TEXT NOT NULL DEFAULT '',
    deleted INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_records_user_ts ON records(user_id, timestamp_epoch DESC);
CREATE INDEX IF NOT EXISTS idx_records_user_influence ON records(user_id, influence DESC);
CREATE INDEX IF NOT EXISTS idx_records_user_source ON records(user_id, source);

-- Full document for hot- and warm-tier records; cold documents live in shards
CREATE TABLE IF NOT EXISTS record_docs (
    id TEXT PRIMARY KEY REFERENCES records(id) ON DELETE CASCADE,
    document TEXT NOT NULL
);

-- Secondary tag index
CREATE TABLE IF NOT EXISTS record_tags (
    record_id TEXT NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (record_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_record_tags_user_tag ON record_tags(user_id, tag);

-- Embedding blobs, loaded into the vector index at startup
CREATE TABLE IF NOT EXISTS record_embeddings (
    record_id TEXT PRIMARY KEY REFERENCES records(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    model TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_record_embeddings_user ON record_embeddings(user_id);

-- FTS5 table, maintained by the warm store on every mutation
CREATE VIRTUAL TABLE IF NOT EXISTS records_fts USING fts5(
    id UNINDEXED,
    user_id UNINDEXED,
    highlight,
    note,
    tags,
    tokenize = 'porter unicode61'
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// V2: profile synthesis
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS psp_components (
    id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    embedding BLOB,
    confidence REAL NOT NULL DEFAULT 0.0,
    total_attention REAL NOT NULL DEFAULT 0.0,
    normalized_weight REAL NOT NULL DEFAULT 0.0,
    priority TEXT NOT NULL DEFAULT 'low',
    activation_threshold REAL NOT NULL DEFAULT 0.5,
    evidence TEXT NOT NULL DEFAULT '[]',
    evolution TEXT NOT NULL DEFAULT '[]',
    source_apps TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_activated_at TEXT,
    archived INTEGER NOT NULL DEFAULT 0,
    below_floor_since TEXT,
    PRIMARY KEY (id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_psp_user ON psp_components(user_id, archived);
"#;

/// V3: governance
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS permission_profiles (
    user_id TEXT PRIMARY KEY,
    profile TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Append-only; rows are never updated or deleted by the engine
CREATE TABLE IF NOT EXISTS audit_log (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    op TEXT NOT NULL,
    risk TEXT NOT NULL,
    risk_score REAL NOT NULL DEFAULT 0.0,
    flags TEXT NOT NULL DEFAULT '[]',
    outcome TEXT NOT NULL,
    affected_count INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    source_app TEXT NOT NULL DEFAULT '',
    session_id TEXT NOT NULL DEFAULT '',
    ip TEXT NOT NULL DEFAULT '',
    day TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_user_time ON audit_log(user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_audit_user_day ON audit_log(user_id, day);

CREATE TABLE IF NOT EXISTS backups (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    operation_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    records TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_backups_user ON backups(user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_backups_operation ON backups(operation_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version, i as u32 + 1);
            assert!(!migration.up.trim().is_empty());
        }
    }
}
