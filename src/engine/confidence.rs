//! Confidence aggregation — weighted mean, threshold banding, reasoning,
//! and the write-once audit record.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::cache::ConfigSnapshot;
use crate::engine::signals;
use crate::engine::types::{ClassifiedDocument, ConfidenceResult, ConfidenceSignal, HUMAN_REVIEW};
use crate::store::traits::{AuditRecord, AuditSink};

/// Overall score when no signal carries positive weight. Neutral, not
/// zero: an unconfigured system must not look like a confident rejection.
const NEUTRAL_SCORE: f64 = 50.0;

/// Signal scores below these marks generate a reasoning line.
const COMPLETENESS_CONCERN: f64 = 60.0;
const SENDER_CONCERN: f64 = 60.0;
const FLOW_CONCERN: f64 = 50.0;

/// Combines weighted signals into one score, maps it to a recommendation
/// band, and appends the audit record.
pub struct ConfidenceAggregator {
    audit: Arc<dyn AuditSink>,
}

impl ConfidenceAggregator {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }

    /// Aggregate the five signals into a [`ConfidenceResult`].
    ///
    /// The audit write happens here, as part of the call; if it fails the
    /// result is still returned, just without an `audit_id`.
    pub async fn aggregate(
        &self,
        snapshot: &ConfigSnapshot,
        doc: &ClassifiedDocument,
        signals: Vec<ConfidenceSignal>,
    ) -> ConfidenceResult {
        let overall_score = weighted_overall(&signals);
        let recommendation = recommend(snapshot, overall_score);
        let reasoning = build_reasoning(&signals);

        let record = AuditRecord {
            id: Uuid::new_v4(),
            document_type: doc.document_type.clone(),
            shipment_id: doc.shipment_id.clone(),
            signals: signals.clone(),
            overall_score,
            recommendation: recommendation.clone(),
            created_at: Utc::now(),
        };

        let audit_id = match self.audit.append(&record).await {
            Ok(()) => Some(record.id),
            Err(e) => {
                warn!(error = %e, document_type = %doc.document_type, "Audit write failed");
                None
            }
        };

        debug!(
            document_type = %doc.document_type,
            overall = overall_score,
            recommendation = %recommendation,
            "Confidence evaluated"
        );

        ConfidenceResult {
            overall_score,
            signals,
            recommendation,
            reasoning,
            audit_id,
        }
    }
}

/// Weighted mean over signals with positive weight, rounded to the
/// nearest integer. Neutral 50 when nothing carries weight.
pub fn weighted_overall(signals: &[ConfidenceSignal]) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for signal in signals {
        if signal.weight > 0.0 {
            weighted_sum += signal.score * signal.weight;
            total_weight += signal.weight;
        }
    }
    if total_weight <= 0.0 {
        return NEUTRAL_SCORE;
    }
    (weighted_sum / total_weight).round().clamp(0.0, 100.0)
}

/// First descending threshold band containing the score wins; universal
/// fallback is `human_review`.
pub fn recommend(snapshot: &ConfigSnapshot, score: f64) -> String {
    snapshot
        .thresholds
        .iter()
        .find(|band| band.contains(score))
        .map(|band| band.action.clone())
        .unwrap_or_else(|| HUMAN_REVIEW.to_string())
}

/// Deterministic reasoning lines, one per concerning signal, in fixed
/// evaluator order.
fn build_reasoning(sigs: &[ConfidenceSignal]) -> Vec<String> {
    let mut reasons = Vec::new();

    for signal in sigs {
        match signal.name.as_str() {
            signals::COMPLETENESS if signal.score < COMPLETENESS_CONCERN => {
                let missing = string_list(&signal.details["missing_required"]);
                if missing.is_empty() {
                    reasons.push(format!("Completeness low (score {})", signal.score.round()));
                } else {
                    reasons.push(format!(
                        "Completeness low (score {}): missing required fields: {}",
                        signal.score.round(),
                        missing.join(", ")
                    ));
                }
            }
            signals::PATTERN_MATCH if signal.score == 0.0 => {
                reasons.push("AI-only classification: no detection pattern fired".to_string());
            }
            signals::SENDER_TRUST => {
                let domain = signal.details["domain"].as_str().unwrap_or("unknown");
                let new_sender = signal.details["new_sender"].as_bool().unwrap_or(false);
                if new_sender {
                    reasons.push(format!("Sender domain {domain} has little history"));
                } else if signal.score < SENDER_CONCERN {
                    reasons.push(format!(
                        "Low trust in sender domain {domain} (score {})",
                        signal.score.round()
                    ));
                }
            }
            signals::FLOW_VALIDATION if signal.score < FLOW_CONCERN => {
                let stage = signal.details["stage"].as_str().unwrap_or("unknown");
                let doc_type = signal.details["document_type"].as_str().unwrap_or("document");
                reasons.push(format!("{doc_type} is unexpected at shipment stage {stage}"));
            }
            signals::FIELD_CONSISTENCY => {
                let issues = string_list(&signal.details["issues"]);
                if !issues.is_empty() {
                    reasons.push(format!("Field consistency issues: {}", issues.join("; ")));
                }
            }
            _ => {}
        }
    }

    reasons
}

fn string_list(value: &Value) -> Vec<&str> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}
