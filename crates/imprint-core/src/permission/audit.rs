//! Append-only audit log
//!
//! One entry per authorization decision, written before any mutation
//! proceeds. The log is append-only: the engine never updates or deletes
//! rows, and a failed append blocks the operation it would have covered.

use super::RiskLevel;
use crate::error::{EngineError, StoreError};
use crate::store::Database;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Decision outcomes recorded in the log
pub const OUTCOME_APPROVED: &str = "approved";
pub const OUTCOME_DENIED: &str = "denied";
pub const OUTCOME_PREVIEWED: &str = "previewed";

/// One audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Entry id
    pub id: String,
    /// User the operation targets
    pub user_id: String,
    /// Operation name
    pub op: String,
    /// Assessed risk level
    pub risk: RiskLevel,
    /// Raw risk score
    pub risk_score: f64,
    /// Risk flags raised during assessment
    pub flags: Vec<String>,
    /// Decision outcome
    pub outcome: String,
    /// Estimated records affected
    pub affected_count: usize,
    /// Authorization duration
    pub duration_ms: u64,
    /// Application that submitted the operation
    pub source_app: String,
    /// Session the operation ran under
    pub session_id: String,
    /// Caller address as reported by the transport
    pub ip: String,
    /// Entry time
    pub time: DateTime<Utc>,
}

impl AuditEntry {
    /// Build an entry with a fresh id at the current time
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: &str,
        op: &str,
        risk: RiskLevel,
        risk_score: f64,
        flags: Vec<String>,
        outcome: &str,
        affected_count: usize,
    ) -> Self {
        Self {
            id: format!("audit_{}", uuid::Uuid::new_v4()),
            user_id: user_id.to_string(),
            op: op.to_string(),
            risk,
            risk_score,
            flags,
            outcome: outcome.to_string(),
            affected_count,
            duration_ms: 0,
            source_app: String::new(),
            session_id: String::new(),
            ip: String::new(),
            time: Utc::now(),
        }
    }
}

/// The audit sink
///
/// Writes serialize through the shared database writer connection, so
/// appends from concurrent operations cannot interleave.
pub struct AuditLog {
    db: Arc<Database>,
}

impl AuditLog {
    /// Create an audit log over the shared database
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append an entry; failure here must block the covered mutation
    pub fn append(&self, entry: &AuditEntry) -> Result<(), EngineError> {
        self.db
            .with_writer(|conn| {
                conn.execute(
                    "INSERT INTO audit_log
                         (id, user_id, op, risk, risk_score, flags, outcome,
                          affected_count, duration_ms, source_app, session_id, ip,
                          day, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        entry.id,
                        entry.user_id,
                        entry.op,
                        entry.risk.as_str(),
                        entry.risk_score,
                        serde_json::to_string(&entry.flags).map_err(StoreError::from)?,
                        entry.outcome,
                        entry.affected_count as i64,
                        entry.duration_ms as i64,
                        entry.source_app,
                        entry.session_id,
                        entry.ip,
                        entry.time.format("%Y-%m-%d").to_string(),
                        entry.time.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .map_err(|e| EngineError::AuditUnavailable(e.to_string()))
    }

    /// Recent entries for a user, newest first
    pub fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        self.db.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, op, risk, risk_score, flags, outcome,
                        affected_count, duration_ms, source_app, session_id, ip, created_at
                 FROM audit_log WHERE user_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![user_id, limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, i64>(8)?,
                        row.get::<_, String>(9)?,
                        row.get::<_, String>(10)?,
                        row.get::<_, String>(11)?,
                        row.get::<_, String>(12)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut entries = Vec::with_capacity(rows.len());
            for (
                id,
                user_id,
                op,
                risk,
                risk_score,
                flags,
                outcome,
                affected,
                duration,
                source_app,
                session_id,
                ip,
                created_at,
            ) in rows
            {
                entries.push(AuditEntry {
                    id,
                    user_id,
                    op,
                    risk: RiskLevel::parse_name(&risk),
                    risk_score,
                    flags: serde_json::from_str(&flags)?,
                    outcome,
                    affected_count: affected.max(0) as usize,
                    duration_ms: duration.max(0) as u64,
                    source_app,
                    session_id,
                    ip,
                    time: DateTime::parse_from_rfc3339(&created_at)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                });
            }
            Ok(entries)
        })
    }

    /// Approved operations for a user on the given day (daily limit check)
    pub fn count_approved_on(&self, user_id: &str, day: DateTime<Utc>) -> Result<u32, StoreError> {
        self.db.with_reader(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM audit_log
                 WHERE user_id = ?1 AND day = ?2 AND outcome = ?3",
                params![
                    user_id,
                    day.format("%Y-%m-%d").to_string(),
                    OUTCOME_APPROVED
                ],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u32)
        })
    }

    /// Total entries for a user (tests and diagnostics)
    pub fn count_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        self.db.with_reader(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM audit_log WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
