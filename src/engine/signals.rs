//! The five confidence signal evaluators.
//!
//! Each evaluator produces one [`ConfidenceSignal`]: a 0–100 score, the
//! weight configured for its rule (0 when disabled), and a details payload
//! for explainability. Evaluators never fail — missing or unavailable
//! dependent data degrades to a documented mid-range default with a note
//! in the details, and the aggregator carries on.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Value, json};
use tracing::warn;

use crate::config::EngineConfig;
use crate::engine::cache::ConfigSnapshot;
use crate::engine::types::{ClassifiedDocument, ConfidenceSignal, ShipmentContext};
use crate::store::traits::{PatternRegistry, SenderTrustStore};

// Rule names, shared with the config store.
pub const COMPLETENESS: &str = "completeness";
pub const PATTERN_MATCH: &str = "pattern_match";
pub const SENDER_TRUST: &str = "sender_trust";
pub const FLOW_VALIDATION: &str = "flow_validation";
pub const FIELD_CONSISTENCY: &str = "field_consistency";

/// Score when a dependent lookup is unavailable or a stage is unknown.
const NEUTRAL_FLOW_SCORE: f64 = 75.0;
/// Reliability assumed for patterns with no hit history.
const DEFAULT_PATTERN_RELIABILITY: f64 = 80.0;
/// Fixed low score for sender addresses we cannot parse a domain from.
const UNPARSEABLE_SENDER_SCORE: f64 = 30.0;

/// Runs the five evaluators against one classified document.
pub struct SignalEvaluators {
    trust: Arc<dyn SenderTrustStore>,
    patterns: Arc<dyn PatternRegistry>,
    config: EngineConfig,
}

impl SignalEvaluators {
    pub fn new(
        trust: Arc<dyn SenderTrustStore>,
        patterns: Arc<dyn PatternRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            trust,
            patterns,
            config,
        }
    }

    /// Completeness: how many of the document type's expected fields the
    /// extractor actually produced.
    ///
    /// Penalty per missing field is its configured weight, doubled for
    /// required fields, normalized so "everything missing" scores 0.
    pub fn completeness(
        &self,
        snapshot: &ConfigSnapshot,
        doc: &ClassifiedDocument,
    ) -> ConfidenceSignal {
        let weight = snapshot.signal_weight(COMPLETENESS);
        let expected = snapshot.expected_fields_for(&doc.document_type);

        if expected.is_empty() {
            return ConfidenceSignal {
                name: COMPLETENESS.into(),
                score: 75.0,
                weight,
                details: json!({
                    "note": format!("no expected fields configured for {}", doc.document_type),
                }),
            };
        }

        let mut missing_required: Vec<String> = Vec::new();
        let mut missing_optional: Vec<String> = Vec::new();
        let mut penalty = 0.0;
        let mut max_penalty = 0.0;

        for field in expected {
            let field_penalty = if field.required {
                field.weight * 2.0
            } else {
                field.weight
            };
            max_penalty += field_penalty;

            if !field_present(doc, &field.field_name) {
                penalty += field_penalty;
                if field.required {
                    missing_required.push(field.field_name.clone());
                } else {
                    missing_optional.push(field.field_name.clone());
                }
            }
        }

        let score = if max_penalty > 0.0 {
            (100.0 * (1.0 - penalty / max_penalty)).clamp(0.0, 100.0)
        } else {
            // Fields configured but all zero-weight: nothing to penalize.
            100.0
        };

        ConfidenceSignal {
            name: COMPLETENESS.into(),
            score,
            weight,
            details: json!({
                "expected": expected.len(),
                "missing_required": missing_required,
                "missing_optional": missing_optional,
            }),
        }
    }

    /// Pattern match: score 0 when no detection pattern fired (absence is
    /// itself informative), otherwise the mean of the pattern's own
    /// confidence and its historical reliability.
    pub async fn pattern_match(
        &self,
        snapshot: &ConfigSnapshot,
        doc: &ClassifiedDocument,
    ) -> ConfidenceSignal {
        let weight = snapshot.signal_weight(PATTERN_MATCH);

        let Some(pattern_id) = doc.pattern_id.as_deref() else {
            return ConfidenceSignal {
                name: PATTERN_MATCH.into(),
                score: 0.0,
                weight,
                details: json!({ "note": "classified by extractor only" }),
            };
        };

        let confidence = doc
            .pattern_confidence
            .unwrap_or(DEFAULT_PATTERN_RELIABILITY)
            .clamp(0.0, 100.0);

        let (reliability, detail) = match self.patterns.pattern_stats(pattern_id).await {
            Ok(Some(stats)) if stats.hit_count > 0 => {
                let fp_rate = stats.false_positive_count as f64 / stats.hit_count as f64;
                (
                    (100.0 * (1.0 - fp_rate)).clamp(0.0, 100.0),
                    json!({
                        "pattern_id": pattern_id,
                        "hit_count": stats.hit_count,
                        "false_positive_count": stats.false_positive_count,
                    }),
                )
            }
            Ok(Some(_)) => (
                DEFAULT_PATTERN_RELIABILITY,
                json!({ "pattern_id": pattern_id, "note": "no hit history yet" }),
            ),
            Ok(None) => (
                DEFAULT_PATTERN_RELIABILITY,
                json!({ "pattern_id": pattern_id, "note": "pattern not in registry" }),
            ),
            Err(e) => {
                warn!(pattern_id, error = %e, "Pattern registry lookup failed");
                return ConfidenceSignal {
                    name: PATTERN_MATCH.into(),
                    score: 75.0,
                    weight,
                    details: json!({
                        "pattern_id": pattern_id,
                        "note": "pattern registry unavailable",
                    }),
                };
            }
        };

        ConfidenceSignal {
            name: PATTERN_MATCH.into(),
            score: ((confidence + reliability) / 2.0).round(),
            weight,
            details: detail,
        }
    }

    /// Sender trust: the domain's historical extraction accuracy.
    pub async fn sender_trust(
        &self,
        snapshot: &ConfigSnapshot,
        doc: &ClassifiedDocument,
    ) -> ConfidenceSignal {
        let weight = snapshot.signal_weight(SENDER_TRUST);

        let Some(domain) = sender_domain(&doc.sender_email) else {
            return ConfidenceSignal {
                name: SENDER_TRUST.into(),
                score: UNPARSEABLE_SENDER_SCORE,
                weight,
                details: json!({
                    "note": "unparseable sender address",
                    "sender": doc.sender_email,
                }),
            };
        };

        match self.trust.domain_trust(&domain).await {
            Ok(Some(trust)) => {
                let new_sender = trust.total_emails < self.config.new_sender_threshold;
                ConfidenceSignal {
                    name: SENDER_TRUST.into(),
                    score: (trust.trust_score * 100.0).round().clamp(0.0, 100.0),
                    weight,
                    details: json!({
                        "domain": domain,
                        "total_emails": trust.total_emails,
                        "new_sender": new_sender,
                    }),
                }
            }
            Ok(None) => ConfidenceSignal {
                name: SENDER_TRUST.into(),
                score: self.config.default_sender_trust,
                weight,
                details: json!({
                    "domain": domain,
                    "new_sender": true,
                    "note": "unknown sender domain",
                }),
            },
            Err(e) => {
                warn!(domain, error = %e, "Sender trust lookup failed");
                ConfidenceSignal {
                    name: SENDER_TRUST.into(),
                    score: self.config.default_sender_trust,
                    weight,
                    details: json!({ "domain": domain, "note": "trust store unavailable" }),
                }
            }
        }
    }

    /// Flow validation: does this document type make sense at the
    /// shipment's current stage?
    pub fn flow_validation(
        &self,
        snapshot: &ConfigSnapshot,
        doc: &ClassifiedDocument,
        context: Option<&ShipmentContext>,
    ) -> ConfidenceSignal {
        let weight = snapshot.signal_weight(FLOW_VALIDATION);

        let Some(stage) = context.and_then(|c| c.stage.as_deref()) else {
            return ConfidenceSignal {
                name: FLOW_VALIDATION.into(),
                score: NEUTRAL_FLOW_SCORE,
                weight,
                details: json!({ "note": "no shipment context supplied" }),
            };
        };

        let (score, fit) = match stage_fit(stage, &doc.document_type) {
            StageFit::Expected => (95.0, "expected"),
            StageFit::Unusual => (55.0, "unusual"),
            StageFit::Impossible => (15.0, "impossible"),
            StageFit::UnknownStage => (NEUTRAL_FLOW_SCORE, "unknown_stage"),
        };

        ConfidenceSignal {
            name: FLOW_VALIDATION.into(),
            score,
            weight,
            details: json!({
                "stage": stage,
                "document_type": doc.document_type,
                "fit": fit,
            }),
        }
    }

    /// Field consistency: cross-field sanity checks over the extraction.
    pub fn field_consistency(
        &self,
        snapshot: &ConfigSnapshot,
        doc: &ClassifiedDocument,
    ) -> ConfidenceSignal {
        let weight = snapshot.signal_weight(FIELD_CONSISTENCY);
        let mut issues: Vec<String> = Vec::new();

        // ETD must not be after ETA.
        if let (Some(etd), Some(eta)) = (
            field_date(doc, "etd"),
            field_date(doc, "eta"),
        ) {
            if etd > eta {
                issues.push(format!("ETD {etd} is after ETA {eta}"));
            }
        }

        // Declared container count vs. listed container numbers.
        if let (Some(count), Some(numbers)) = (
            field_integer(doc, "container_count"),
            doc.extracted_fields
                .get("container_numbers")
                .and_then(Value::as_array),
        ) {
            if count != numbers.len() as i64 {
                issues.push(format!(
                    "container_count {} does not match {} listed container numbers",
                    count,
                    numbers.len()
                ));
            }
        }

        // Identifier lengths outside the plausible range.
        for key in ["booking_number", "bl_number"] {
            if let Some(id) = doc.extracted_fields.get(key).and_then(Value::as_str) {
                let len = id.trim().len();
                if len > 0 && !(5..=30).contains(&len) {
                    issues.push(format!("{key} length {len} outside plausible range 5-30"));
                }
            }
        }

        let score = (100.0 - 15.0 * issues.len() as f64).max(40.0);
        ConfidenceSignal {
            name: FIELD_CONSISTENCY.into(),
            score,
            weight,
            details: json!({ "issues": issues }),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// A field counts as present when it exists and is neither null nor an
/// empty string.
fn field_present(doc: &ClassifiedDocument, name: &str) -> bool {
    match doc.extracted_fields.get(name) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

/// Lowercased domain part of a sender address, `None` when unparseable.
fn sender_domain(sender: &str) -> Option<String> {
    let domain = sender.trim().trim_end_matches('>').rsplit('@').next()?;
    if domain.is_empty() || !sender.contains('@') {
        return None;
    }
    Some(domain.to_lowercase())
}

/// Parse a date-ish extracted field (RFC 3339 or plain `YYYY-MM-DD`).
fn field_date(doc: &ClassifiedDocument, name: &str) -> Option<DateTime<Utc>> {
    let raw = doc.extracted_fields.get(name)?.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Integer field that may arrive as a number or a numeric string.
fn field_integer(doc: &ClassifiedDocument, name: &str) -> Option<i64> {
    match doc.extracted_fields.get(name)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

enum StageFit {
    Expected,
    Unusual,
    Impossible,
    UnknownStage,
}

/// Static shipment-flow table: which document types are expected next at
/// each stage, and which are logically impossible.
fn stage_fit(stage: &str, document_type: &str) -> StageFit {
    let (expected, impossible): (&[&str], &[&str]) = match stage {
        "quotation" => (
            &["booking_request", "quotation_response", "schedule_update"],
            &["proof_of_delivery", "delivery_order", "container_release", "arrival_notice"],
        ),
        "booking_requested" => (
            &["booking_confirmation", "schedule_update"],
            &["proof_of_delivery", "delivery_order", "container_release"],
        ),
        "booking_confirmed" => (
            &["shipping_instruction", "vgm_declaration", "si_confirmation", "cargo_receipt"],
            &["proof_of_delivery"],
        ),
        "si_submitted" => (
            &["si_confirmation", "vgm_declaration", "bill_of_lading"],
            &["proof_of_delivery"],
        ),
        "in_transit" => (
            &["tracking_update", "schedule_update", "arrival_notice", "bill_of_lading"],
            &["booking_request"],
        ),
        "arrived" => (
            &["arrival_notice", "customs_clearance", "container_release", "delivery_order"],
            &["booking_request"],
        ),
        "delivered" => (
            &["proof_of_delivery", "invoice"],
            &["booking_request", "shipping_instruction"],
        ),
        _ => return StageFit::UnknownStage,
    };

    if expected.contains(&document_type) {
        StageFit::Expected
    } else if impossible.contains(&document_type) {
        StageFit::Impossible
    } else {
        StageFit::Unusual
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::engine::types::{ConfidenceRule, ExpectedField};
    use crate::error::StoreError;
    use crate::store::traits::{DomainTrust, PatternStats};

    struct StubTrust {
        trust: Option<DomainTrust>,
        fail: bool,
    }

    #[async_trait]
    impl SenderTrustStore for StubTrust {
        async fn domain_trust(&self, _domain: &str) -> Result<Option<DomainTrust>, StoreError> {
            if self.fail {
                return Err(StoreError::Query("down".into()));
            }
            Ok(self.trust.clone())
        }
    }

    struct StubPatterns {
        stats: Option<PatternStats>,
        fail: bool,
    }

    #[async_trait]
    impl PatternRegistry for StubPatterns {
        async fn pattern_stats(
            &self,
            _pattern_id: &str,
        ) -> Result<Option<PatternStats>, StoreError> {
            if self.fail {
                return Err(StoreError::Query("down".into()));
            }
            Ok(self.stats.clone())
        }
    }

    fn evaluators(trust: StubTrust, patterns: StubPatterns) -> SignalEvaluators {
        SignalEvaluators::new(
            Arc::new(trust),
            Arc::new(patterns),
            EngineConfig::default(),
        )
    }

    fn bare_evaluators() -> SignalEvaluators {
        evaluators(
            StubTrust {
                trust: None,
                fail: false,
            },
            StubPatterns {
                stats: None,
                fail: false,
            },
        )
    }

    fn doc(document_type: &str, fields: serde_json::Value) -> ClassifiedDocument {
        ClassifiedDocument {
            document_type: document_type.into(),
            extracted_fields: fields.as_object().cloned().unwrap_or_default(),
            sender_email: "ops@carrier.com".into(),
            pattern_id: None,
            pattern_confidence: None,
            shipment_id: None,
        }
    }

    fn snapshot_with_rules() -> ConfigSnapshot {
        let rules = [
            COMPLETENESS,
            PATTERN_MATCH,
            SENDER_TRUST,
            FLOW_VALIDATION,
            FIELD_CONSISTENCY,
        ]
        .iter()
        .map(|name| ConfidenceRule {
            name: (*name).into(),
            weight: 1.0,
            enabled: true,
        })
        .collect();
        ConfigSnapshot::assemble(rules, Vec::new(), Vec::new(), Vec::new())
    }

    fn expected(document_type: &str, field: &str, required: bool, weight: f64) -> ExpectedField {
        ExpectedField {
            document_type: document_type.into(),
            field_name: field.into(),
            required,
            weight,
        }
    }

    // ── Completeness ────────────────────────────────────────────────

    #[test]
    fn completeness_full_extraction_scores_100() {
        let snapshot = ConfigSnapshot::assemble(
            vec![ConfidenceRule {
                name: COMPLETENESS.into(),
                weight: 2.0,
                enabled: true,
            }],
            vec![
                expected("arrival_notice", "vessel", true, 1.0),
                expected("arrival_notice", "eta", false, 1.0),
            ],
            Vec::new(),
            Vec::new(),
        );
        let doc = doc(
            "arrival_notice",
            serde_json::json!({"vessel": "MV Ever Given", "eta": "2026-02-01"}),
        );
        let signal = bare_evaluators().completeness(&snapshot, &doc);
        assert_eq!(signal.score, 100.0);
        assert_eq!(signal.weight, 2.0);
    }

    #[test]
    fn completeness_missing_required_penalized_double() {
        // One required, one optional, equal weights. Missing the required
        // field costs 2/3 of the penalty budget.
        let snapshot = ConfigSnapshot::assemble(
            vec![ConfidenceRule {
                name: COMPLETENESS.into(),
                weight: 1.0,
                enabled: true,
            }],
            vec![
                expected("arrival_notice", "vessel", true, 1.0),
                expected("arrival_notice", "eta", false, 1.0),
            ],
            Vec::new(),
            Vec::new(),
        );
        let missing_required = doc("arrival_notice", serde_json::json!({"eta": "2026-02-01"}));
        let signal = bare_evaluators().completeness(&snapshot, &missing_required);
        assert!((signal.score - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(
            signal.details["missing_required"],
            serde_json::json!(["vessel"])
        );

        let missing_optional = doc("arrival_notice", serde_json::json!({"vessel": "MV X"}));
        let signal = bare_evaluators().completeness(&snapshot, &missing_optional);
        assert!((signal.score - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn completeness_all_missing_scores_zero() {
        let snapshot = ConfigSnapshot::assemble(
            vec![ConfidenceRule {
                name: COMPLETENESS.into(),
                weight: 1.0,
                enabled: true,
            }],
            vec![
                expected("invoice", "amount", true, 2.0),
                expected("invoice", "currency", false, 1.0),
            ],
            Vec::new(),
            Vec::new(),
        );
        let signal = bare_evaluators().completeness(&snapshot, &doc("invoice", serde_json::json!({})));
        assert_eq!(signal.score, 0.0);
    }

    #[test]
    fn completeness_empty_string_counts_as_missing() {
        let snapshot = ConfigSnapshot::assemble(
            Vec::new(),
            vec![expected("invoice", "amount", true, 1.0)],
            Vec::new(),
            Vec::new(),
        );
        let signal = bare_evaluators()
            .completeness(&snapshot, &doc("invoice", serde_json::json!({"amount": "  "})));
        assert_eq!(signal.score, 0.0);
    }

    #[test]
    fn completeness_unconfigured_type_degrades_to_75() {
        let signal = bare_evaluators().completeness(
            &ConfigSnapshot::default(),
            &doc("mystery_doc", serde_json::json!({})),
        );
        assert_eq!(signal.score, 75.0);
        assert!(signal.details["note"].as_str().unwrap().contains("mystery_doc"));
    }

    // ── Pattern match ───────────────────────────────────────────────

    #[tokio::test]
    async fn pattern_absent_scores_exactly_zero() {
        let mut d = doc("arrival_notice", serde_json::json!({}));
        // Supplied confidence must not matter without a pattern id.
        d.pattern_confidence = Some(99.0);
        let signal = bare_evaluators()
            .pattern_match(&snapshot_with_rules(), &d)
            .await;
        assert_eq!(signal.score, 0.0);
        assert_eq!(signal.details["note"], "classified by extractor only");
    }

    #[tokio::test]
    async fn pattern_reliability_from_hit_history() {
        let ev = evaluators(
            StubTrust {
                trust: None,
                fail: false,
            },
            StubPatterns {
                stats: Some(PatternStats {
                    pattern_id: "p1".into(),
                    document_type: "arrival_notice".into(),
                    hit_count: 100,
                    false_positive_count: 10,
                }),
                fail: false,
            },
        );
        let mut d = doc("arrival_notice", serde_json::json!({}));
        d.pattern_id = Some("p1".into());
        d.pattern_confidence = Some(70.0);
        let signal = ev.pattern_match(&snapshot_with_rules(), &d).await;
        // reliability = 100 * (1 - 10/100) = 90; (70 + 90) / 2 = 80
        assert_eq!(signal.score, 80.0);
    }

    #[tokio::test]
    async fn pattern_zero_hits_defaults_reliability_80() {
        let ev = evaluators(
            StubTrust {
                trust: None,
                fail: false,
            },
            StubPatterns {
                stats: Some(PatternStats {
                    pattern_id: "p2".into(),
                    document_type: "invoice".into(),
                    hit_count: 0,
                    false_positive_count: 0,
                }),
                fail: false,
            },
        );
        let mut d = doc("invoice", serde_json::json!({}));
        d.pattern_id = Some("p2".into());
        d.pattern_confidence = Some(60.0);
        let signal = ev.pattern_match(&snapshot_with_rules(), &d).await;
        assert_eq!(signal.score, 70.0); // (60 + 80) / 2
    }

    #[tokio::test]
    async fn pattern_registry_error_degrades_to_75() {
        let ev = evaluators(
            StubTrust {
                trust: None,
                fail: false,
            },
            StubPatterns {
                stats: None,
                fail: true,
            },
        );
        let mut d = doc("invoice", serde_json::json!({}));
        d.pattern_id = Some("p3".into());
        let signal = ev.pattern_match(&snapshot_with_rules(), &d).await;
        assert_eq!(signal.score, 75.0);
    }

    // ── Sender trust ────────────────────────────────────────────────

    #[tokio::test]
    async fn sender_trust_known_domain() {
        let ev = evaluators(
            StubTrust {
                trust: Some(DomainTrust {
                    domain: "carrier.com".into(),
                    total_emails: 250,
                    correct_extractions: 230,
                    trust_score: 0.92,
                }),
                fail: false,
            },
            StubPatterns {
                stats: None,
                fail: false,
            },
        );
        let signal = ev
            .sender_trust(&snapshot_with_rules(), &doc("x", serde_json::json!({})))
            .await;
        assert_eq!(signal.score, 92.0);
        assert_eq!(signal.details["new_sender"], false);
    }

    #[tokio::test]
    async fn sender_trust_flags_new_sender() {
        let ev = evaluators(
            StubTrust {
                trust: Some(DomainTrust {
                    domain: "carrier.com".into(),
                    total_emails: 3,
                    correct_extractions: 3,
                    trust_score: 0.7,
                }),
                fail: false,
            },
            StubPatterns {
                stats: None,
                fail: false,
            },
        );
        let signal = ev
            .sender_trust(&snapshot_with_rules(), &doc("x", serde_json::json!({})))
            .await;
        assert_eq!(signal.details["new_sender"], true);
    }

    #[tokio::test]
    async fn sender_trust_unknown_domain_defaults_50() {
        let signal = bare_evaluators()
            .sender_trust(&snapshot_with_rules(), &doc("x", serde_json::json!({})))
            .await;
        assert_eq!(signal.score, 50.0);
    }

    #[tokio::test]
    async fn sender_trust_unparseable_address_scores_30() {
        let mut d = doc("x", serde_json::json!({}));
        d.sender_email = "not-an-address".into();
        let signal = bare_evaluators()
            .sender_trust(&snapshot_with_rules(), &d)
            .await;
        assert_eq!(signal.score, UNPARSEABLE_SENDER_SCORE);
    }

    #[tokio::test]
    async fn sender_trust_store_error_defaults_50() {
        let ev = evaluators(
            StubTrust {
                trust: None,
                fail: true,
            },
            StubPatterns {
                stats: None,
                fail: false,
            },
        );
        let signal = ev
            .sender_trust(&snapshot_with_rules(), &doc("x", serde_json::json!({})))
            .await;
        assert_eq!(signal.score, 50.0);
        assert_eq!(signal.details["note"], "trust store unavailable");
    }

    // ── Flow validation ─────────────────────────────────────────────

    #[test]
    fn flow_expected_document_scores_high() {
        let ctx = ShipmentContext {
            stage: Some("in_transit".into()),
            ..Default::default()
        };
        let signal = bare_evaluators().flow_validation(
            &snapshot_with_rules(),
            &doc("arrival_notice", serde_json::json!({})),
            Some(&ctx),
        );
        assert_eq!(signal.score, 95.0);
    }

    #[test]
    fn flow_impossible_document_scores_low() {
        let ctx = ShipmentContext {
            stage: Some("booking_requested".into()),
            ..Default::default()
        };
        let signal = bare_evaluators().flow_validation(
            &snapshot_with_rules(),
            &doc("proof_of_delivery", serde_json::json!({})),
            Some(&ctx),
        );
        assert_eq!(signal.score, 15.0);
    }

    #[test]
    fn flow_unusual_document_scores_middling() {
        let ctx = ShipmentContext {
            stage: Some("in_transit".into()),
            ..Default::default()
        };
        let signal = bare_evaluators().flow_validation(
            &snapshot_with_rules(),
            &doc("invoice", serde_json::json!({})),
            Some(&ctx),
        );
        assert_eq!(signal.score, 55.0);
    }

    #[test]
    fn flow_no_context_defaults_75() {
        let signal = bare_evaluators().flow_validation(
            &snapshot_with_rules(),
            &doc("arrival_notice", serde_json::json!({})),
            None,
        );
        assert_eq!(signal.score, 75.0);
    }

    #[test]
    fn flow_unknown_stage_defaults_75() {
        let ctx = ShipmentContext {
            stage: Some("teleporting".into()),
            ..Default::default()
        };
        let signal = bare_evaluators().flow_validation(
            &snapshot_with_rules(),
            &doc("arrival_notice", serde_json::json!({})),
            Some(&ctx),
        );
        assert_eq!(signal.score, 75.0);
    }

    // ── Field consistency ───────────────────────────────────────────

    #[test]
    fn consistency_clean_extraction_scores_100() {
        let d = doc(
            "booking_confirmation",
            serde_json::json!({
                "etd": "2026-01-05",
                "eta": "2026-02-01",
                "container_count": 2,
                "container_numbers": ["MSKU1234567", "MSKU7654321"],
                "booking_number": "BK12345678",
            }),
        );
        let signal = bare_evaluators().field_consistency(&snapshot_with_rules(), &d);
        assert_eq!(signal.score, 100.0);
        assert_eq!(signal.details["issues"], serde_json::json!([]));
    }

    #[test]
    fn consistency_etd_after_eta_flagged() {
        let d = doc(
            "booking_confirmation",
            serde_json::json!({"etd": "2026-02-10", "eta": "2026-02-01"}),
        );
        let signal = bare_evaluators().field_consistency(&snapshot_with_rules(), &d);
        assert_eq!(signal.score, 85.0);
    }

    #[test]
    fn consistency_container_count_mismatch_flagged() {
        let d = doc(
            "booking_confirmation",
            serde_json::json!({"container_count": 3, "container_numbers": ["MSKU1234567"]}),
        );
        let signal = bare_evaluators().field_consistency(&snapshot_with_rules(), &d);
        assert_eq!(signal.score, 85.0);
    }

    #[test]
    fn consistency_short_identifier_flagged() {
        let d = doc("booking_confirmation", serde_json::json!({"booking_number": "BK1"}));
        let signal = bare_evaluators().field_consistency(&snapshot_with_rules(), &d);
        assert_eq!(signal.score, 85.0);
    }

    #[test]
    fn consistency_floor_is_40() {
        // All four checks fail: 100 - 60 lands exactly on the floor.
        let d = doc(
            "booking_confirmation",
            serde_json::json!({
                "etd": "2026-03-01",
                "eta": "2026-02-01",
                "container_count": 9,
                "container_numbers": ["A"],
                "booking_number": "B",
                "bl_number": "C",
            }),
        );
        let signal = bare_evaluators().field_consistency(&snapshot_with_rules(), &d);
        assert_eq!(signal.score, 40.0);
    }

    // ── Helpers ─────────────────────────────────────────────────────

    #[test]
    fn sender_domain_parsing() {
        assert_eq!(sender_domain("ops@Carrier.COM"), Some("carrier.com".into()));
        assert_eq!(
            sender_domain("Ops Desk <ops@carrier.com>"),
            Some("carrier.com".into())
        );
        assert_eq!(sender_domain("nonsense"), None);
        assert_eq!(sender_domain("trailing@"), None);
    }
}
