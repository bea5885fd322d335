//! TTL-keyed config snapshot cache.
//!
//! Scoring rules, expected-field tables, threshold bands, and action
//! templates are read-mostly. The cache loads them wholesale into an
//! immutable [`ConfigSnapshot`] and replaces the whole `Arc` on refresh,
//! so an in-flight evaluation keeps the snapshot it already obtained and
//! never observes a half-updated configuration.
//!
//! Failure mode is stale-but-available: a failed reload logs and keeps
//! the previous snapshot. Only the strict startup load is fatal.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::engine::types::{ActionTemplate, ConfidenceRule, ExpectedField, ThresholdBand};
use crate::error::ConfigError;
use crate::store::traits::ConfigStore;

/// Composite template lookup key.
///
/// A proper tuple key, not a delimiter-joined string — party names with
/// underscores can never collide with a document type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub document_type: String,
    pub from_party: String,
    pub direction: String,
}

impl TemplateKey {
    /// Key for an inbound document from a given party.
    pub fn inbound(document_type: impl Into<String>, from_party: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            from_party: from_party.into(),
            direction: "inbound".into(),
        }
    }
}

/// One immutable, atomically-replaced view of the scoring configuration.
#[derive(Debug, Default)]
pub struct ConfigSnapshot {
    /// Signal rules by name.
    pub rules: HashMap<String, ConfidenceRule>,
    /// Expected fields grouped by document type.
    pub expected_fields: HashMap<String, Vec<ExpectedField>>,
    /// Bands sorted descending by `min_score`; first containing band wins.
    pub thresholds: Vec<ThresholdBand>,
    /// Templates by composite key.
    pub templates: HashMap<TemplateKey, ActionTemplate>,
}

impl ConfigSnapshot {
    /// Build a snapshot from freshly loaded tables, sorting bands and
    /// grouping expected fields.
    pub fn assemble(
        rules: Vec<ConfidenceRule>,
        fields: Vec<ExpectedField>,
        mut thresholds: Vec<ThresholdBand>,
        templates: Vec<ActionTemplate>,
    ) -> Self {
        thresholds.sort_by(|a, b| {
            b.min_score
                .partial_cmp(&a.min_score)
                .unwrap_or(Ordering::Equal)
        });

        let mut expected_fields: HashMap<String, Vec<ExpectedField>> = HashMap::new();
        for field in fields {
            expected_fields
                .entry(field.document_type.clone())
                .or_default()
                .push(field);
        }

        let rules = rules.into_iter().map(|r| (r.name.clone(), r)).collect();
        let templates = templates
            .into_iter()
            .map(|t| {
                (
                    TemplateKey {
                        document_type: t.document_type.clone(),
                        from_party: t.from_party.clone(),
                        direction: t.direction.clone(),
                    },
                    t,
                )
            })
            .collect();

        Self {
            rules,
            expected_fields,
            thresholds,
            templates,
        }
    }

    /// Effective weight for a signal: the configured weight when the rule
    /// is enabled, 0.0 when disabled or absent.
    pub fn signal_weight(&self, name: &str) -> f64 {
        self.rules
            .get(name)
            .filter(|r| r.enabled)
            .map(|r| r.weight)
            .unwrap_or(0.0)
    }

    /// Expected fields for a document type, empty slice when unconfigured.
    pub fn expected_fields_for(&self, document_type: &str) -> &[ExpectedField] {
        self.expected_fields
            .get(document_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All templates whose key document type matches, regardless of party.
    /// Used by the auto-resolve matcher, which only records the type.
    pub fn templates_for_document(&self, document_type: &str) -> Vec<&ActionTemplate> {
        self.templates
            .values()
            .filter(|t| t.document_type == document_type)
            .collect()
    }

    /// Reject snapshots the engine cannot score with.
    fn validate(&self) -> Result<(), String> {
        for rule in self.rules.values() {
            if rule.weight < 0.0 || !rule.weight.is_finite() {
                return Err(format!("rule {} has invalid weight {}", rule.name, rule.weight));
            }
        }
        for fields in self.expected_fields.values() {
            for field in fields {
                if field.weight < 0.0 || !field.weight.is_finite() {
                    return Err(format!(
                        "expected field {}.{} has invalid weight {}",
                        field.document_type, field.field_name, field.weight
                    ));
                }
            }
        }
        for band in &self.thresholds {
            if band.min_score > band.max_score {
                return Err(format!(
                    "threshold band {} has min {} > max {}",
                    band.action, band.min_score, band.max_score
                ));
            }
        }
        Ok(())
    }
}

struct CacheState {
    snapshot: Arc<ConfigSnapshot>,
    /// `None` until the first successful load, and again after `invalidate`.
    loaded_at: Option<Instant>,
}

/// TTL-refreshed owner of the current [`ConfigSnapshot`].
pub struct ConfigCache {
    store: Arc<dyn ConfigStore>,
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl ConfigCache {
    pub fn new(store: Arc<dyn ConfigStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            state: RwLock::new(CacheState {
                snapshot: Arc::new(ConfigSnapshot::default()),
                loaded_at: None,
            }),
        }
    }

    /// Strict startup load. An unreachable store or a corrupt snapshot is
    /// a fatal configuration error here, not a request-time degrade.
    pub async fn load_initial(&self) -> Result<(), ConfigError> {
        let snapshot = self.load_snapshot().await.map_err(|e| match e {
            LoadError::Store(e) => ConfigError::InitialLoad(e),
            LoadError::Invalid(msg) => ConfigError::InvalidSnapshot(msg),
        })?;

        let mut state = self.state.write().await;
        state.snapshot = Arc::new(snapshot);
        state.loaded_at = Some(Instant::now());
        info!(
            rules = state.snapshot.rules.len(),
            templates = state.snapshot.templates.len(),
            bands = state.snapshot.thresholds.len(),
            "Config snapshot loaded"
        );
        Ok(())
    }

    /// Current snapshot, reloading first if the TTL has expired or the
    /// cache was invalidated. Never fails: a failed reload keeps the
    /// previous snapshot, and a never-loaded cache yields an empty one
    /// (every rule weight 0 → neutral scoring downstream).
    pub async fn ensure_loaded(&self) -> Arc<ConfigSnapshot> {
        {
            let state = self.state.read().await;
            if let Some(loaded_at) = state.loaded_at {
                if loaded_at.elapsed() < self.ttl {
                    return Arc::clone(&state.snapshot);
                }
            }
        }

        let mut state = self.state.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(loaded_at) = state.loaded_at {
            if loaded_at.elapsed() < self.ttl {
                return Arc::clone(&state.snapshot);
            }
        }

        match self.load_snapshot().await {
            Ok(snapshot) => {
                state.snapshot = Arc::new(snapshot);
                state.loaded_at = Some(Instant::now());
                debug!(
                    rules = state.snapshot.rules.len(),
                    templates = state.snapshot.templates.len(),
                    "Config snapshot refreshed"
                );
            }
            Err(e) => {
                warn!(error = %e, "Config reload failed, keeping previous snapshot");
                // Push the retry out a full TTL so a flapping store isn't
                // hammered on every evaluation.
                state.loaded_at = Some(Instant::now());
            }
        }
        Arc::clone(&state.snapshot)
    }

    /// Force the next `ensure_loaded` to reload regardless of TTL.
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.loaded_at = None;
        debug!("Config cache invalidated");
    }

    async fn load_snapshot(&self) -> Result<ConfigSnapshot, LoadError> {
        let rules = self.store.load_rules().await?;
        let fields = self.store.load_expected_fields().await?;
        let thresholds = self.store.load_thresholds().await?;
        let templates = self.store.load_templates().await?;

        let snapshot = ConfigSnapshot::assemble(rules, fields, thresholds, templates);
        snapshot.validate().map_err(LoadError::Invalid)?;
        Ok(snapshot)
    }
}

#[derive(Debug, thiserror::Error)]
enum LoadError {
    #[error("{0}")]
    Store(#[from] crate::error::StoreError),
    #[error("invalid snapshot: {0}")]
    Invalid(String),
}
