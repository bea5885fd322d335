//! libSQL backend — one connection implementing every store trait.
//!
//! Supports local file and in-memory databases. The config tables are
//! read wholesale by the cache, trust/pattern lookups are point queries,
//! the audit log is append-only, and open actions get the one-way
//! completion update.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::types::{
    ActionTemplate, ConfidenceRule, DeadlinePolicy, ExpectedField, OpenAction, ThresholdBand,
};
use crate::error::StoreError;
use crate::store::migrations;
use crate::store::traits::{
    AuditRecord, AuditSink, ConfigStore, DomainTrust, OpenActionStore, PatternRegistry,
    PatternStats, SenderTrustStore,
};

/// libSQL database backend.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Pool(format!("Failed to create database directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to open libSQL database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    // ── Seeding / ops helpers ───────────────────────────────────────

    pub async fn upsert_rule(&self, rule: &ConfidenceRule) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO confidence_rules (name, weight, enabled) VALUES (?1, ?2, ?3)",
                params![rule.name.as_str(), rule.weight, rule.enabled as i64],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn upsert_expected_field(&self, field: &ExpectedField) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO expected_fields (document_type, field_name, required, weight)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    field.document_type.as_str(),
                    field.field_name.as_str(),
                    field.required as i64,
                    field.weight
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn insert_threshold(&self, band: &ThresholdBand) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO thresholds (min_score, max_score, action) VALUES (?1, ?2, ?3)",
                params![band.min_score, band.max_score, band.action.as_str()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn insert_template(&self, template: &ActionTemplate) -> Result<(), StoreError> {
        let deadline_policy = template
            .deadline_policy
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO action_templates
                 (document_type, from_party, direction, action_type, action_verb, template,
                  default_owner, deadline_policy, base_priority, boost_keywords, boost_amount,
                  auto_resolve_on, auto_resolve_keywords)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    template.document_type.as_str(),
                    template.from_party.as_str(),
                    template.direction.as_str(),
                    template.action_type.as_str(),
                    template.action_verb.as_str(),
                    template.template.as_str(),
                    template.default_owner.as_str(),
                    deadline_policy,
                    template.base_priority as i64,
                    to_json(&template.boost_keywords)?,
                    template.boost_amount as i64,
                    to_json(&template.auto_resolve_on)?,
                    to_json(&template.auto_resolve_keywords)?,
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn upsert_domain_trust(&self, trust: &DomainTrust) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sender_trust
                 (domain, total_emails, correct_extractions, trust_score)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    trust.domain.as_str(),
                    trust.total_emails,
                    trust.correct_extractions,
                    trust.trust_score
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn upsert_pattern_stats(&self, stats: &PatternStats) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO patterns
                 (pattern_id, document_type, hit_count, false_positive_count)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    stats.pattern_id.as_str(),
                    stats.document_type.as_str(),
                    stats.hit_count,
                    stats.false_positive_count
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn query_err(e: libsql::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn row_to_template(row: &libsql::Row) -> Result<ActionTemplate, libsql::Error> {
    let deadline_policy: Option<DeadlinePolicy> = row
        .get::<String>(7)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok());
    Ok(ActionTemplate {
        document_type: row.get(0)?,
        from_party: row.get(1)?,
        direction: row.get(2)?,
        action_type: row.get(3)?,
        action_verb: row.get(4)?,
        template: row.get(5)?,
        default_owner: row.get(6)?,
        deadline_policy,
        base_priority: row.get::<i64>(8)?.clamp(0, 100) as u8,
        boost_keywords: json_list(&row.get::<String>(9)?),
        boost_amount: row.get::<i64>(10)?.clamp(0, 100) as u8,
        auto_resolve_on: json_list(&row.get::<String>(11)?),
        auto_resolve_keywords: json_list(&row.get::<String>(12)?),
    })
}

fn row_to_open_action(row: &libsql::Row) -> Result<Option<OpenAction>, libsql::Error> {
    let id_str: String = row.get(0)?;
    let Ok(id) = Uuid::parse_str(&id_str) else {
        // Completing a nil id would target nothing; drop the row instead.
        warn!(id = %id_str, "Skipping open action with unparseable id");
        return Ok(None);
    };
    let created_str: String = row.get(4)?;
    let completed_str: Option<String> = row.get(5).ok();
    Ok(Some(OpenAction {
        id,
        shipment_id: row.get(1)?,
        document_type: row.get(2)?,
        description: row.get(3)?,
        created_at: parse_datetime(&created_str),
        completed_at: completed_str.map(|s| parse_datetime(&s)),
    }))
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl ConfigStore for LibSqlBackend {
    async fn load_rules(&self) -> Result<Vec<ConfidenceRule>, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT name, weight, enabled FROM confidence_rules", ())
            .await
            .map_err(query_err)?;
        let mut rules = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            rules.push(ConfidenceRule {
                name: row.get(0).map_err(query_err)?,
                weight: row.get(1).map_err(query_err)?,
                enabled: row.get::<i64>(2).map_err(query_err)? != 0,
            });
        }
        Ok(rules)
    }

    async fn load_expected_fields(&self) -> Result<Vec<ExpectedField>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT document_type, field_name, required, weight FROM expected_fields",
                (),
            )
            .await
            .map_err(query_err)?;
        let mut fields = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            fields.push(ExpectedField {
                document_type: row.get(0).map_err(query_err)?,
                field_name: row.get(1).map_err(query_err)?,
                required: row.get::<i64>(2).map_err(query_err)? != 0,
                weight: row.get(3).map_err(query_err)?,
            });
        }
        Ok(fields)
    }

    async fn load_thresholds(&self) -> Result<Vec<ThresholdBand>, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT min_score, max_score, action FROM thresholds", ())
            .await
            .map_err(query_err)?;
        let mut bands = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            bands.push(ThresholdBand {
                min_score: row.get(0).map_err(query_err)?,
                max_score: row.get(1).map_err(query_err)?,
                action: row.get(2).map_err(query_err)?,
            });
        }
        Ok(bands)
    }

    async fn load_templates(&self) -> Result<Vec<ActionTemplate>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT document_type, from_party, direction, action_type, action_verb, template,
                        default_owner, deadline_policy, base_priority, boost_keywords,
                        boost_amount, auto_resolve_on, auto_resolve_keywords
                 FROM action_templates",
                (),
            )
            .await
            .map_err(query_err)?;
        let mut templates = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            templates.push(row_to_template(&row).map_err(query_err)?);
        }
        Ok(templates)
    }
}

#[async_trait]
impl SenderTrustStore for LibSqlBackend {
    async fn domain_trust(&self, domain: &str) -> Result<Option<DomainTrust>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT domain, total_emails, correct_extractions, trust_score
                 FROM sender_trust WHERE domain = ?1",
                params![domain],
            )
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(DomainTrust {
                domain: row.get(0).map_err(query_err)?,
                total_emails: row.get(1).map_err(query_err)?,
                correct_extractions: row.get(2).map_err(query_err)?,
                trust_score: row.get(3).map_err(query_err)?,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PatternRegistry for LibSqlBackend {
    async fn pattern_stats(&self, pattern_id: &str) -> Result<Option<PatternStats>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT pattern_id, document_type, hit_count, false_positive_count
                 FROM patterns WHERE pattern_id = ?1",
                params![pattern_id],
            )
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(PatternStats {
                pattern_id: row.get(0).map_err(query_err)?,
                document_type: row.get(1).map_err(query_err)?,
                hit_count: row.get(2).map_err(query_err)?,
                false_positive_count: row.get(3).map_err(query_err)?,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AuditSink for LibSqlBackend {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO audit_log
                 (id, document_type, shipment_id, signals, overall_score, recommendation, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id.to_string(),
                    record.document_type.as_str(),
                    record.shipment_id.as_deref(),
                    to_json(&record.signals)?,
                    record.overall_score,
                    record.recommendation.as_str(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}

#[async_trait]
impl OpenActionStore for LibSqlBackend {
    async fn open_actions(&self, shipment_id: &str) -> Result<Vec<OpenAction>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, shipment_id, document_type, description, created_at, completed_at
                 FROM open_actions
                 WHERE shipment_id = ?1 AND completed_at IS NULL
                 ORDER BY created_at",
                params![shipment_id],
            )
            .await
            .map_err(query_err)?;
        let mut actions = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            if let Some(action) = row_to_open_action(&row).map_err(query_err)? {
                actions.push(action);
            }
        }
        Ok(actions)
    }

    async fn insert_action(&self, action: &OpenAction) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO open_actions
                 (id, shipment_id, document_type, description, created_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    action.id.to_string(),
                    action.shipment_id.as_str(),
                    action.document_type.as_str(),
                    action.description.as_str(),
                    action.created_at.to_rfc3339(),
                    action.completed_at.map(|dt| dt.to_rfc3339()),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn complete_action(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
        note: &str,
    ) -> Result<(), StoreError> {
        // The completed_at IS NULL guard makes this a one-way, idempotent
        // transition even under concurrent matcher runs.
        self.conn
            .execute(
                "UPDATE open_actions
                 SET completed_at = ?1, description = description || ' ' || ?2
                 WHERE id = ?3 AND completed_at IS NULL",
                params![completed_at.to_rfc3339(), note, id.to_string()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}
