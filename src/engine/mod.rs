//! Document decision engine.
//!
//! Two independent decisions per classified document, plus a follow-up:
//! 1. How much to trust the extraction (five weighted signals → banded
//!    recommendation, audited).
//! 2. What operational action it implies (template or fallback → owner,
//!    priority, deadline).
//! 3. Which previously opened actions the new document satisfies.
//!
//! Every evaluation is a short-lived computation over one config snapshot;
//! arbitrarily many may run concurrently.

pub mod autoresolve;
pub mod cache;
pub mod confidence;
pub mod deadline;
pub mod priority;
pub mod signals;
pub mod template;
pub mod types;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{ConfigError, StoreError};
use crate::store::traits::{
    AuditSink, ConfigStore, OpenActionStore, PatternRegistry, SenderTrustStore,
};
use autoresolve::AutoResolveMatcher;
use cache::ConfigCache;
use confidence::ConfidenceAggregator;
use signals::SignalEvaluators;
use template::{ActionTemplateResolver, TEMPLATE_CONFIDENCE, render_description};
use types::{
    ActionRecommendation, AutoResolveOutcome, ClassifiedDocument, ConfidenceResult,
    RecommendationSource, ShipmentContext,
};

/// The decision layer: confidence scoring, action recommendation, and
/// auto-resolution over one shared config cache.
pub struct DecisionEngine {
    cache: Arc<ConfigCache>,
    evaluators: SignalEvaluators,
    aggregator: ConfidenceAggregator,
    matcher: AutoResolveMatcher,
}

impl DecisionEngine {
    pub fn new(
        config: EngineConfig,
        config_store: Arc<dyn ConfigStore>,
        trust: Arc<dyn SenderTrustStore>,
        patterns: Arc<dyn PatternRegistry>,
        audit: Arc<dyn AuditSink>,
        actions: Arc<dyn OpenActionStore>,
    ) -> Self {
        let cache = Arc::new(ConfigCache::new(config_store, config.cache_ttl));
        Self {
            evaluators: SignalEvaluators::new(trust, patterns, config),
            aggregator: ConfidenceAggregator::new(audit),
            matcher: AutoResolveMatcher::new(Arc::clone(&cache), actions),
            cache,
        }
    }

    /// Strict config load for startup. After this, request-time refreshes
    /// degrade to the previous snapshot instead of failing.
    pub async fn load_initial_config(&self) -> Result<(), ConfigError> {
        self.cache.load_initial().await
    }

    /// Force a config reload on the next evaluation (call after edits).
    pub async fn invalidate_config(&self) {
        self.cache.invalidate().await;
    }

    /// Score how much to trust one classifier extraction.
    ///
    /// Never fails: unavailable collaborators degrade individual signals,
    /// and a failed audit write only costs the `audit_id`.
    pub async fn calculate_confidence(
        &self,
        doc: &ClassifiedDocument,
        context: Option<&ShipmentContext>,
    ) -> ConfidenceResult {
        let snapshot = self.cache.ensure_loaded().await;

        // Trust and pattern lookups hit stores; run them concurrently.
        let (pattern, sender) = tokio::join!(
            self.evaluators.pattern_match(&snapshot, doc),
            self.evaluators.sender_trust(&snapshot, doc),
        );

        let signals = vec![
            self.evaluators.completeness(&snapshot, doc),
            pattern,
            sender,
            self.evaluators.flow_validation(&snapshot, doc, context),
            self.evaluators.field_consistency(&snapshot, doc),
        ];

        self.aggregator.aggregate(&snapshot, doc, signals).await
    }

    /// Derive the operational action a document implies.
    ///
    /// Template hit → rendered description, boosted priority, policy
    /// deadline. No template → conservative fallback heuristics.
    pub async fn recommend_action(
        &self,
        document_type: &str,
        from_party: &str,
        subject: &str,
        body: &str,
        email_date: DateTime<Utc>,
        context: Option<&ShipmentContext>,
    ) -> ActionRecommendation {
        let snapshot = self.cache.ensure_loaded().await;

        let Some(tpl) = ActionTemplateResolver::lookup(&snapshot, document_type, from_party)
        else {
            return ActionTemplateResolver::fallback(document_type, from_party);
        };

        let (priority, priority_label) =
            priority::calculate_priority(tpl, subject, body, email_date, context);
        let deadline =
            deadline::calculate_deadline(tpl.deadline_policy.as_ref(), email_date, context);
        let description = render_description(&tpl.template, document_type, from_party, context);

        info!(
            document_type,
            from_party,
            priority,
            action_type = %tpl.action_type,
            "Action recommended from template"
        );

        ActionRecommendation {
            has_action: true,
            action_type: Some(tpl.action_type.clone()),
            action_verb: Some(tpl.action_verb.clone()),
            description: Some(description),
            owner: Some(tpl.default_owner.clone()),
            priority,
            priority_label,
            deadline: deadline.as_ref().map(|d| d.due),
            deadline_source: deadline.map(|d| d.source),
            auto_resolve_on: tpl.auto_resolve_on.clone(),
            auto_resolve_keywords: tpl.auto_resolve_keywords.clone(),
            confidence: TEMPLATE_CONFIDENCE,
            source: RecommendationSource::Template,
        }
    }

    /// Close any open actions on the shipment that the incoming document
    /// satisfies. Safe to call concurrently; completion is one-way.
    pub async fn check_auto_resolve(
        &self,
        shipment_id: &str,
        incoming_document_type: &str,
        subject: &str,
        body: &str,
    ) -> Result<AutoResolveOutcome, StoreError> {
        self.matcher
            .check_auto_resolve(shipment_id, incoming_document_type, subject, body)
            .await
    }
}
