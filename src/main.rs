use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use freight_triage::config::EngineConfig;
use freight_triage::engine::DecisionEngine;
use freight_triage::engine::types::{ClassifiedDocument, ShipmentContext};
use freight_triage::store::LibSqlBackend;
use serde::Deserialize;

/// One triage request: the classified document plus whatever email and
/// shipment context the caller has.
#[derive(Deserialize)]
struct TriageInput {
    document: ClassifiedDocument,
    #[serde(default)]
    context: Option<ShipmentContext>,
    #[serde(default)]
    from_party: Option<String>,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    email_date: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let input_path = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: freight-triage <input.json>");
        eprintln!("  input.json: {{\"document\": {{...}}, \"context\": {{...}}, \"subject\": \"...\", ...}}");
        std::process::exit(1);
    });

    let db_path = std::env::var("FREIGHT_TRIAGE_DB_PATH")
        .unwrap_or_else(|_| "./data/freight-triage.db".to_string());

    eprintln!("📦 Freight Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", db_path);

    let engine_config = EngineConfig::from_env()?;

    // ── Database ─────────────────────────────────────────────────────────
    let backend = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .with_context(|| format!("Failed to open database at {db_path}"))?,
    );

    // ── Engine ───────────────────────────────────────────────────────────
    let engine = DecisionEngine::new(
        engine_config,
        Arc::clone(&backend) as _,
        Arc::clone(&backend) as _,
        Arc::clone(&backend) as _,
        Arc::clone(&backend) as _,
        Arc::clone(&backend) as _,
    );
    engine
        .load_initial_config()
        .await
        .context("Initial config load failed")?;

    // ── Triage ───────────────────────────────────────────────────────────
    let raw = std::fs::read_to_string(&input_path)
        .with_context(|| format!("Failed to read {input_path}"))?;
    let input: TriageInput =
        serde_json::from_str(&raw).with_context(|| format!("Invalid input in {input_path}"))?;

    let email_date = input.email_date.unwrap_or_else(Utc::now);
    let from_party = input.from_party.as_deref().unwrap_or("other");

    let confidence = engine
        .calculate_confidence(&input.document, input.context.as_ref())
        .await;
    let action = engine
        .recommend_action(
            &input.document.document_type,
            from_party,
            &input.subject,
            &input.body,
            email_date,
            input.context.as_ref(),
        )
        .await;

    let mut output = serde_json::json!({
        "confidence": confidence,
        "action": action,
    });

    if let Some(shipment_id) = input.document.shipment_id.as_deref() {
        let resolved = engine
            .check_auto_resolve(
                shipment_id,
                &input.document.document_type,
                &input.subject,
                &input.body,
            )
            .await
            .context("Auto-resolve check failed")?;
        output["auto_resolve"] = serde_json::to_value(&resolved)?;
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
