//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::StoreError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "scoring_config",
        sql: r#"
            CREATE TABLE IF NOT EXISTS confidence_rules (
                name TEXT PRIMARY KEY,
                weight REAL NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS expected_fields (
                document_type TEXT NOT NULL,
                field_name TEXT NOT NULL,
                required INTEGER NOT NULL DEFAULT 0,
                weight REAL NOT NULL DEFAULT 1.0,
                PRIMARY KEY (document_type, field_name)
            );
            CREATE INDEX IF NOT EXISTS idx_expected_fields_type
                ON expected_fields(document_type);

            CREATE TABLE IF NOT EXISTS thresholds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                min_score REAL NOT NULL,
                max_score REAL NOT NULL,
                action TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS action_templates (
                document_type TEXT NOT NULL,
                from_party TEXT NOT NULL,
                direction TEXT NOT NULL DEFAULT 'inbound',
                action_type TEXT NOT NULL,
                action_verb TEXT NOT NULL,
                template TEXT NOT NULL,
                default_owner TEXT NOT NULL,
                deadline_policy TEXT,
                base_priority INTEGER NOT NULL DEFAULT 50,
                boost_keywords TEXT NOT NULL DEFAULT '[]',
                boost_amount INTEGER NOT NULL DEFAULT 0,
                auto_resolve_on TEXT NOT NULL DEFAULT '[]',
                auto_resolve_keywords TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (document_type, from_party, direction)
            );
        "#,
    },
    Migration {
        version: 2,
        name: "trust_and_patterns",
        sql: r#"
            CREATE TABLE IF NOT EXISTS sender_trust (
                domain TEXT PRIMARY KEY,
                total_emails INTEGER NOT NULL DEFAULT 0,
                correct_extractions INTEGER NOT NULL DEFAULT 0,
                trust_score REAL NOT NULL DEFAULT 0.5
            );

            CREATE TABLE IF NOT EXISTS patterns (
                pattern_id TEXT PRIMARY KEY,
                document_type TEXT NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0,
                false_positive_count INTEGER NOT NULL DEFAULT 0
            );
        "#,
    },
    Migration {
        version: 3,
        name: "audit_and_open_actions",
        sql: r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id TEXT PRIMARY KEY,
                document_type TEXT NOT NULL,
                shipment_id TEXT,
                signals TEXT NOT NULL,
                overall_score REAL NOT NULL,
                recommendation TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_log_created ON audit_log(created_at);

            CREATE TABLE IF NOT EXISTS open_actions (
                id TEXT PRIMARY KEY,
                shipment_id TEXT NOT NULL,
                document_type TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_open_actions_shipment
                ON open_actions(shipment_id, completed_at);
        "#,
    },
];

/// Apply all migrations newer than the database's current version.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )
    .await
    .map_err(|e| StoreError::Migration(format!("creating _migrations table: {e}")))?;

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| StoreError::Migration(format!("reading migration version: {e}")))?;
    let current: i64 = match rows
        .next()
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?
    {
        Some(row) => row
            .get(0)
            .map_err(|e| StoreError::Migration(e.to_string()))?,
        None => 0,
    };

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql)
            .await
            .map_err(|e| {
                StoreError::Migration(format!(
                    "applying {} (v{}): {e}",
                    migration.name, migration.version
                ))
            })?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            (migration.version, migration.name),
        )
        .await
        .map_err(|e| StoreError::Migration(format!("recording v{}: {e}", migration.version)))?;
        tracing::info!(version = migration.version, name = migration.name, "Migration applied");
    }

    Ok(())
}
