//! Error taxonomy
//!
//! One typed error per failure class the engine surfaces to callers.
//! Pure transforms raise their own small error types; the enclosing
//! component translates them into [`EngineError`] at the API boundary.

use crate::record::ValidationIssue;

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine API
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed record, illegal access level, oversize field
    #[error("validation failed: {}", format_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// Unknown record id or unknown user profile
    #[error("not found: {0}")]
    NotFound(String),

    /// Authorization refused; includes the reason and what would be required
    #[error("permission denied: {reason}")]
    PermissionDenied {
        /// Human-readable refusal reason
        reason: String,
        /// Permission level or action that would allow the operation
        required: String,
        /// Risk flags raised during assessment
        flags: Vec<String>,
    },

    /// Backpressure: too many in-flight batches or per-user queue full; retryable
    #[error("busy: {0}")]
    RateLimited(String),

    /// Batch exceeds a configured ceiling; retryable after splitting
    #[error("batch too large: {got} exceeds limit {limit}")]
    BatchTooLarge {
        /// Items in the rejected request
        got: usize,
        /// The ceiling that was exceeded
        limit: usize,
    },

    /// Concurrent update would violate an invariant; the later writer retries
    #[error("conflict: {0}")]
    Conflict(String),

    /// Vector or full-text strategy disabled or failing
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    /// The authoritative tier for a record cannot be reached
    #[error("tier unavailable: {0}")]
    TierUnavailable(String),

    /// Audit sink failure; fatal for mutations
    #[error("audit unavailable: {0}")]
    AuditUnavailable(String),

    /// Underlying storage failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Operation deadline expired before completion
    #[error("deadline exceeded after {0} ms")]
    DeadlineExceeded(u64),
}

impl EngineError {
    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::RateLimited(_) | EngineError::Conflict(_)
        )
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Storage-layer error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error (cold shards, data directory)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Record not found in any tier
    #[error("record not found: {0}")]
    NotFound(String),
    /// Shard or row contents failed to decode
    #[error("corrupt data: {0}")]
    Corrupt(String),
    /// Initialization error
    #[error("initialization error: {0}")]
    Init(String),
    /// A tier is unreachable
    #[error("tier unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// Outcome status for batched calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Every item succeeded
    Success,
    /// Some items succeeded, some failed
    Partial,
    /// No item succeeded
    Failed,
}

impl Status {
    /// Derive a status from success/failure counts
    pub fn from_counts(ok: usize, failed: usize) -> Self {
        match (ok, failed) {
            (_, 0) => Status::Success,
            (0, _) => Status::Failed,
            _ => Status::Partial,
        }
    }
}
