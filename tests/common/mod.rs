#![allow(dead_code)]

use std::sync::Arc;

use bridge_audit::api::{self, issue_token, AppState};
use bridge_audit::audit::{AuditLogger, NewEvent, Secp256k1Signer, SignatureVerifier, Signer};
use bridge_audit::config::AppConfig;
use bridge_audit::database::Database;
use bridge_audit::{AuditError, AuditResult};

pub const TEST_JWT_SECRET: &str = "integration-test-secret";

/// Audit logger over a fresh in-memory store, plus the key it signs with
pub struct TestLog {
    pub logger: AuditLogger,
    pub signer: Arc<Secp256k1Signer>,
}

pub async fn setup_test_db() -> Database {
    let db = Database::new_in_memory()
        .await
        .expect("Failed to create test database");
    db.run_migrations().await.expect("Failed to run migrations");
    db
}

pub async fn setup_test_log() -> TestLog {
    let signer = Arc::new(Secp256k1Signer::generate());
    let dyn_signer: Arc<dyn Signer> = signer.clone();
    TestLog {
        logger: AuditLogger::new(setup_test_db().await, dyn_signer),
        signer,
    }
}

/// A banking event with every optional field populated.
pub fn full_event(n: usize) -> NewEvent {
    NewEvent::new("ledger", "post_transfer", "transaction")
        .with_actor(format!("teller-{}", n))
        .with_resource_id(format!("tx-{}", n))
        .with_detail("amount", serde_json::json!(100 + n))
        .with_detail("currency", serde_json::json!("EUR"))
        .with_provenance(
            Some(format!("10.0.0.{}", n)),
            Some("teller-ui/2.1".to_string()),
        )
}

/// Rewrite stored rows behind the logger's back, as an attacker with store
/// access would.
pub async fn tamper(db: &Database, sql: &str) {
    sqlx::raw_sql("DROP TRIGGER IF EXISTS audit_log_no_update")
        .execute(db.pool())
        .await
        .expect("Failed to drop update guard");
    sqlx::raw_sql(sql)
        .execute(db.pool())
        .await
        .expect("Tampering statement failed");
}

/// Signing authority that is always down
pub struct FailingSigner;

impl SignatureVerifier for FailingSigner {
    fn verify(&self, _digest: &str, _signature: &str) -> bool {
        false
    }
}

impl Signer for FailingSigner {
    fn sign(&self, _digest: &str) -> AuditResult<String> {
        Err(AuditError::SigningUnavailable("HSM unreachable".to_string()))
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = TEST_JWT_SECRET.to_string();
    config
}

pub async fn test_app() -> (axum::Router, TestLog) {
    let log = setup_test_log().await;
    let app = api::router(AppState::new(test_config(), log.logger.clone()));
    (app, log)
}

pub fn token_for(sub: &str, role: &str) -> String {
    issue_token(TEST_JWT_SECRET, sub, role, 3600).expect("Failed to issue token")
}
