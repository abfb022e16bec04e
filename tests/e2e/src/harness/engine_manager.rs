//! Isolated engine instances for tests
//!
//! Each test gets its own in-memory database and a temporary directory
//! for cold shards; everything is deleted when the harness drops.

use imprint_core::{
    BatchResult, Database, Engine, EngineConfig, HashProjectionEmbedder, OperationContext,
    PermissionLevel, PermissionProfile, RawRecord, Result,
};
use std::sync::Arc;
use tempfile::TempDir;

/// An isolated engine plus the state backing it
pub struct TestEngine {
    /// The engine under test
    pub engine: Arc<Engine>,
    /// Temp directory holding cold shards (kept alive for the test)
    _temp_dir: TempDir,
}

impl TestEngine {
    /// Engine with default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Engine with custom configuration
    pub fn with_config(config: EngineConfig) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let db = Arc::new(Database::open_in_memory().expect("open database"));
        let engine = Engine::with_parts(
            config,
            db,
            &temp_dir.path().join("cold"),
            Arc::new(HashProjectionEmbedder::default()),
        )
        .expect("build engine");
        Self {
            engine: Arc::new(engine),
            _temp_dir: temp_dir,
        }
    }

    /// Submit one batch for a user
    pub async fn submit(
        &self,
        app_id: &str,
        user_id: &str,
        records: Vec<RawRecord>,
    ) -> Result<BatchResult> {
        self.engine
            .submit_batch(app_id, user_id, records, None)
            .await
    }

    /// Grant a user full write permissions (most governed-write journeys
    /// exercise bulk operations that the default limited profile denies)
    pub fn grant_write_full(&self, user_id: &str) {
        let mut profile = PermissionProfile::default_for(user_id, 1000, 1000);
        profile.level = PermissionLevel::WriteFull;
        self.engine
            .authorizer()
            .save_profile(&profile)
            .expect("save permission profile");
    }

    /// Grant a user admin with a 2FA requirement
    pub fn grant_admin(&self, user_id: &str, require_2fa: bool) {
        let mut profile = PermissionProfile::default_for(user_id, 1000, 1000);
        profile.level = PermissionLevel::Admin;
        profile.require_2fa = require_2fa;
        self.engine
            .authorizer()
            .save_profile(&profile)
            .expect("save permission profile");
    }

    /// An operation context for a plain session
    pub fn context(&self) -> OperationContext {
        OperationContext {
            source_app: "test_app".into(),
            session_id: "session-1".into(),
            ip: "127.0.0.1".into(),
            two_factor_verified: false,
        }
    }

    /// An operation context for a 2FA-verified session
    pub fn verified_context(&self) -> OperationContext {
        OperationContext {
            two_factor_verified: true,
            ..self.context()
        }
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}
