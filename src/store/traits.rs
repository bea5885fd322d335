//! Async store traits — the engine's only view of persistence.
//!
//! Five narrow traits instead of one wide `Database`: the engine borrows
//! each collaborator separately, so tests can swap in a failing audit sink
//! without touching the config store, and an ops deployment can back the
//! trust store with a different service than the config tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::types::{
    ActionTemplate, ConfidenceRule, ConfidenceSignal, ExpectedField, OpenAction, ThresholdBand,
};
use crate::error::StoreError;

// ── Row types ───────────────────────────────────────────────────────

/// Accumulated trust statistics for one sender domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainTrust {
    pub domain: String,
    pub total_emails: i64,
    pub correct_extractions: i64,
    /// Trust in [0.0, 1.0].
    pub trust_score: f64,
}

/// Hit statistics for one detection pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternStats {
    pub pattern_id: String,
    pub document_type: String,
    pub hit_count: i64,
    pub false_positive_count: i64,
}

/// Write-once snapshot of a confidence evaluation.
///
/// Appended per call; never read back by the engine. Retention and
/// rotation belong to whoever owns the audit table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub document_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<String>,
    pub signals: Vec<ConfidenceSignal>,
    pub overall_score: f64,
    pub recommendation: String,
    pub created_at: DateTime<Utc>,
}

// ── Store traits ────────────────────────────────────────────────────

/// Read side of the persistent config store. Loaded wholesale into a
/// snapshot by the config cache; never queried per document.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_rules(&self) -> Result<Vec<ConfidenceRule>, StoreError>;

    async fn load_expected_fields(&self) -> Result<Vec<ExpectedField>, StoreError>;

    /// Bands in any order; the cache sorts them descending by `min_score`.
    async fn load_thresholds(&self) -> Result<Vec<ThresholdBand>, StoreError>;

    async fn load_templates(&self) -> Result<Vec<ActionTemplate>, StoreError>;
}

/// Sender-domain trust lookups.
#[async_trait]
pub trait SenderTrustStore: Send + Sync {
    /// Trust stats for a domain, `None` if the domain has never been seen.
    async fn domain_trust(&self, domain: &str) -> Result<Option<DomainTrust>, StoreError>;
}

/// Detection-pattern statistics lookups.
#[async_trait]
pub trait PatternRegistry: Send + Sync {
    /// Stats for a pattern id, `None` for unknown patterns.
    async fn pattern_stats(&self, pattern_id: &str) -> Result<Option<PatternStats>, StoreError>;
}

/// Append-only audit sink. Write failures are logged and swallowed by
/// the caller — an audit row is explanatory, not decision-critical.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError>;
}

/// Per-shipment open-action reads and the one-way completion write.
#[async_trait]
pub trait OpenActionStore: Send + Sync {
    /// All not-yet-completed actions for a shipment.
    async fn open_actions(&self, shipment_id: &str) -> Result<Vec<OpenAction>, StoreError>;

    /// Persist a newly opened action (callers create these; the engine
    /// itself only completes them).
    async fn insert_action(&self, action: &OpenAction) -> Result<(), StoreError>;

    /// Mark an action completed and append `note` to its description.
    ///
    /// Must be a no-op on rows that are already completed — the guard is
    /// what makes concurrent auto-resolve runs safe.
    async fn complete_action(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
        note: &str,
    ) -> Result<(), StoreError>;
}
