//! Permission and risk layer
//!
//! Per-user permission profiles, risk scoring for every mutation, and
//! the authorization rules gating the write path. Every decision is
//! appended to the audit log before the covered mutation may proceed.

mod audit;

pub use audit::{AuditEntry, AuditLog, OUTCOME_APPROVED, OUTCOME_DENIED, OUTCOME_PREVIEWED};

use crate::error::{EngineError, StoreError};
use crate::store::Database;
use crate::write::WriteOpKind;
use chrono::{DateTime, Timelike, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// PERMISSION PROFILE
// ============================================================================

/// Permission level granted to an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// No access at all
    None,
    /// May read but never mutate
    ReadOnly,
    /// May perform low- and medium-risk mutations
    WriteLimited,
    /// May perform high-risk mutations
    WriteFull,
    /// May perform critical mutations
    Admin,
}

impl PermissionLevel {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::None => "none",
            PermissionLevel::ReadOnly => "read_only",
            PermissionLevel::WriteLimited => "write_limited",
            PermissionLevel::WriteFull => "write_full",
            PermissionLevel::Admin => "admin",
        }
    }
}

/// Per-user permission profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionProfile {
    /// Owner
    pub user_id: String,
    /// Granted level
    pub level: PermissionLevel,
    /// When non-empty, only these operations are allowed
    #[serde(default)]
    pub allowed_ops: Vec<WriteOpKind>,
    /// Operations always denied
    #[serde(default)]
    pub forbidden_ops: Vec<WriteOpKind>,
    /// Approved operations allowed per day; hard ceiling
    pub daily_op_limit: u32,
    /// Maximum records one operation may touch; hard ceiling
    pub batch_size_limit: usize,
    /// Require a 2FA-verified session for high and critical risk
    pub require_2fa: bool,
    /// When set, operations may only come from these source apps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_sources: Option<Vec<String>>,
    /// Profile validity window
    pub valid_from: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl PermissionProfile {
    /// The default profile granted on first use
    pub fn default_for(user_id: &str, daily_op_limit: u32, batch_size_limit: usize) -> Self {
        Self {
            user_id: user_id.to_string(),
            level: PermissionLevel::WriteLimited,
            allowed_ops: Vec::new(),
            forbidden_ops: Vec::new(),
            daily_op_limit,
            batch_size_limit,
            require_2fa: false,
            allowed_sources: None,
            valid_from: Utc::now(),
            valid_until: None,
        }
    }

    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_from && self.valid_until.map(|t| now <= t).unwrap_or(true)
    }
}

// ============================================================================
// RISK ASSESSMENT
// ============================================================================

/// Risk level an operation was assessed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Parse from string name; unknown names read as critical
    pub fn parse_name(s: &str) -> Self {
        match s {
            "low" => RiskLevel::Low,
            "medium" => RiskLevel::Medium,
            "high" => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

/// Assessed risk for one operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    /// Mapped level
    pub level: RiskLevel,
    /// Raw score, capped at 1.0
    pub score: f64,
    /// Factors that contributed
    pub flags: Vec<String>,
}

/// Deletes touching more than this many records carry the bulk flag
const BULK_DELETE_THRESHOLD: usize = 50;

/// Shape of the operation being assessed
#[derive(Debug, Clone, Default)]
pub struct OperationShape {
    /// Operation kind
    pub kind: Option<WriteOpKind>,
    /// Estimated records affected
    pub estimated_affected: usize,
    /// Hard (permanent) delete
    pub hard_delete: bool,
    /// Distinct data sources of the records the operation targets
    pub target_sources: Vec<String>,
}

/// Session context the transport hands down with each operation
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    /// Submitting application
    pub source_app: String,
    /// Session identifier
    pub session_id: String,
    /// Caller address
    pub ip: String,
    /// Whether this session passed 2FA verification
    pub two_factor_verified: bool,
}

fn base_risk(kind: WriteOpKind) -> f64 {
    match kind {
        WriteOpKind::Create => 0.1,
        WriteOpKind::Update => 0.3,
        WriteOpKind::Delete => 0.8,
        WriteOpKind::BulkTag => 0.4,
        WriteOpKind::BulkRetag => 0.5,
        WriteOpKind::BatchUpdate => 0.6,
        WriteOpKind::Merge => 0.7,
        WriteOpKind::Split => 0.6,
    }
}

/// Score an operation's risk given its shape, time, and the profile
pub fn assess_risk(
    shape: &OperationShape,
    profile: &PermissionProfile,
    now: DateTime<Utc>,
) -> RiskAssessment {
    let mut score = shape.kind.map(base_risk).unwrap_or(0.5);
    let mut flags = Vec::new();

    if shape.estimated_affected > 1000 {
        score += 0.8;
        flags.push("large_batch_operation".to_string());
    } else if shape.estimated_affected > 100 {
        score += 0.5;
        flags.push("medium_batch_operation".to_string());
    } else if shape.estimated_affected > 10 {
        score += 0.2;
        flags.push("small_batch_operation".to_string());
    }

    if shape.hard_delete {
        score += 0.3;
        flags.push("hard_delete".to_string());
    }
    if shape.kind == Some(WriteOpKind::Delete)
        && shape.estimated_affected > BULK_DELETE_THRESHOLD
    {
        score += 0.4;
        flags.push("bulk_delete".to_string());
    }

    let hour = now.hour();
    if !(6..=22).contains(&hour) {
        score += 0.1;
        flags.push("off_hours_operation".to_string());
    }

    if profile.level == PermissionLevel::WriteLimited
        && shape.kind.map(|k| k.is_bulk()).unwrap_or(false)
    {
        score += 0.3;
        flags.push("limited_user_bulk_operation".to_string());
    }

    // Checked against the data sources of the targeted records, not the
    // calling application's identity
    if let Some(allowed) = &profile.allowed_sources {
        if shape.target_sources.iter().any(|s| !allowed.contains(s)) {
            score += 0.5;
            flags.push("unauthorized_source_access".to_string());
        }
    }

    let level = if score >= 1.0 {
        RiskLevel::Critical
    } else if score >= 0.7 {
        RiskLevel::High
    } else if score >= 0.4 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    RiskAssessment {
        level,
        score: score.min(1.0),
        flags,
    }
}

// ============================================================================
// AUTHORIZER
// ============================================================================

/// Result of an authorization check
#[derive(Debug, Clone)]
pub struct Decision {
    /// Whether the operation may proceed
    pub allowed: bool,
    /// Why it was allowed or refused
    pub reason: String,
    /// What would be required when refused
    pub required: String,
    /// The risk assessment behind the decision
    pub risk: RiskAssessment,
}

impl Decision {
    /// Turn a refusal into the engine error callers receive
    pub fn into_error(self) -> EngineError {
        EngineError::PermissionDenied {
            reason: self.reason,
            required: self.required,
            flags: self.risk.flags,
        }
    }
}

/// Permission profiles plus the authorization rules
pub struct Authorizer {
    db: Arc<Database>,
    audit: AuditLog,
    default_daily_limit: u32,
    default_batch_limit: usize,
}

impl Authorizer {
    /// Create an authorizer over the shared database
    pub fn new(
        db: Arc<Database>,
        default_daily_limit: u32,
        default_batch_limit: usize,
    ) -> Self {
        Self {
            audit: AuditLog::new(db.clone()),
            db,
            default_daily_limit,
            default_batch_limit,
        }
    }

    /// The audit log this authorizer writes to
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Check an operation and append the decision to the audit log
    ///
    /// Exactly one entry is written per call. An audit append failure is
    /// returned as `AuditUnavailable` and must block the mutation.
    pub fn authorize(
        &self,
        user_id: &str,
        shape: &OperationShape,
        ctx: &OperationContext,
        dry_run: bool,
    ) -> Result<Decision, EngineError> {
        let started = std::time::Instant::now();
        let now = Utc::now();
        let profile = self.load_or_create_profile(user_id)?;
        let decision = self.decide(&profile, shape, ctx, now);

        let outcome = if !decision.allowed {
            OUTCOME_DENIED
        } else if dry_run {
            OUTCOME_PREVIEWED
        } else {
            OUTCOME_APPROVED
        };

        let op_name = shape
            .kind
            .map(|k| k.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let mut entry = AuditEntry::new(
            user_id,
            &op_name,
            decision.risk.level,
            decision.risk.score,
            decision.risk.flags.clone(),
            outcome,
            shape.estimated_affected,
        );
        entry.duration_ms = started.elapsed().as_millis() as u64;
        entry.source_app = ctx.source_app.clone();
        entry.session_id = ctx.session_id.clone();
        entry.ip = ctx.ip.clone();
        self.audit.append(&entry)?;

        Ok(decision)
    }

    fn decide(
        &self,
        profile: &PermissionProfile,
        shape: &OperationShape,
        ctx: &OperationContext,
        now: DateTime<Utc>,
    ) -> Decision {
        let risk = assess_risk(shape, profile, now);
        let deny = |reason: String, required: &str, risk: RiskAssessment| Decision {
            allowed: false,
            reason,
            required: required.to_string(),
            risk,
        };

        if !profile.is_valid_at(now) {
            return deny(
                "permission profile is outside its validity window".into(),
                "a currently valid permission profile",
                risk,
            );
        }

        match profile.level {
            PermissionLevel::None => {
                return deny(
                    "no write access granted".into(),
                    "write_limited or higher",
                    risk,
                );
            }
            PermissionLevel::ReadOnly => {
                return deny(
                    "read-only operators cannot mutate records".into(),
                    "write_limited or higher",
                    risk,
                );
            }
            _ => {}
        }

        if let Some(kind) = shape.kind {
            if profile.forbidden_ops.contains(&kind) {
                return deny(
                    format!("operation {kind} is forbidden for this operator"),
                    "removal of the operation from forbidden_ops",
                    risk,
                );
            }
            if !profile.allowed_ops.is_empty() && !profile.allowed_ops.contains(&kind) {
                return deny(
                    format!("operation {kind} is not in the operator's allowed set"),
                    "the operation added to allowed_ops",
                    risk,
                );
            }
        }

        if shape.estimated_affected > profile.batch_size_limit {
            return deny(
                format!(
                    "operation would touch {} records, above the batch limit {}",
                    shape.estimated_affected, profile.batch_size_limit
                ),
                "a smaller batch",
                risk,
            );
        }

        match self.audit.count_approved_on(&profile.user_id, now) {
            Ok(count) if count >= profile.daily_op_limit => {
                return deny(
                    format!("daily operation limit {} reached", profile.daily_op_limit),
                    "waiting until the next day",
                    risk,
                );
            }
            Ok(_) => {}
            Err(e) => {
                return deny(
                    format!("daily limit check unavailable: {e}"),
                    "a reachable audit store",
                    risk,
                );
            }
        }

        match risk.level {
            RiskLevel::Critical if profile.level != PermissionLevel::Admin => {
                return deny(
                    "critical-risk operations require admin".into(),
                    "admin",
                    risk,
                );
            }
            RiskLevel::High
                if !matches!(
                    profile.level,
                    PermissionLevel::WriteFull | PermissionLevel::Admin
                ) =>
            {
                return deny(
                    "high-risk operations require full write permissions".into(),
                    "write_full or admin",
                    risk,
                );
            }
            _ => {}
        }

        if profile.require_2fa
            && matches!(risk.level, RiskLevel::High | RiskLevel::Critical)
            && !ctx.two_factor_verified
        {
            return deny(
                "two-factor verification required for this risk level".into(),
                "a 2FA-verified session",
                risk,
            );
        }

        Decision {
            allowed: true,
            reason: "permission granted".into(),
            required: String::new(),
            risk,
        }
    }

    /// Load a profile, creating and persisting the default on first use
    pub fn load_or_create_profile(
        &self,
        user_id: &str,
    ) -> Result<PermissionProfile, EngineError> {
        if let Some(profile) = self.load_profile(user_id)? {
            return Ok(profile);
        }
        let profile = PermissionProfile::default_for(
            user_id,
            self.default_daily_limit,
            self.default_batch_limit,
        );
        self.save_profile(&profile)?;
        Ok(profile)
    }

    /// Load a stored profile
    pub fn load_profile(&self, user_id: &str) -> Result<Option<PermissionProfile>, StoreError> {
        let json: Option<String> = self.db.with_reader(|conn| {
            Ok(conn
                .query_row(
                    "SELECT profile FROM permission_profiles WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json).map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }

    /// Persist a profile (administration and tests)
    pub fn save_profile(&self, profile: &PermissionProfile) -> Result<(), StoreError> {
        let json = serde_json::to_string(profile)?;
        self.db.with_writer(|conn| {
            conn.execute(
                "INSERT INTO permission_profiles (user_id, profile, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                     profile = excluded.profile,
                     updated_at = excluded.updated_at",
                params![profile.user_id, json, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
