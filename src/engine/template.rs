//! Action template resolution and description rendering.
//!
//! A template is looked up by its composite (document type, party,
//! direction) key. When none exists, a three-way heuristic decides
//! between "no action needed" and a generic review action — the engine
//! always answers, it never shrugs.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::engine::cache::{ConfigSnapshot, TemplateKey};
use crate::engine::types::{
    ActionRecommendation, ActionTemplate, PriorityLabel, RecommendationSource, ShipmentContext,
};

/// Recommendation confidence by provenance.
pub const TEMPLATE_CONFIDENCE: f64 = 0.9;
pub const FALLBACK_NO_ACTION_CONFIDENCE: f64 = 0.8;
pub const FALLBACK_REVIEW_CONFIDENCE: f64 = 0.5;

/// Document types that are purely informational: nothing for anyone to do.
const INFORMATIONAL_TYPES: &[&str] = &[
    "tracking_update",
    "schedule_update",
    "acknowledgement",
    "notification",
    "proof_of_delivery",
];

/// Resolves a template for an inbound document, or falls back to
/// heuristics.
pub struct ActionTemplateResolver;

impl ActionTemplateResolver {
    /// Configured template for (document type, party, inbound), if any.
    pub fn lookup<'a>(
        snapshot: &'a ConfigSnapshot,
        document_type: &str,
        from_party: &str,
    ) -> Option<&'a ActionTemplate> {
        snapshot
            .templates
            .get(&TemplateKey::inbound(document_type, from_party))
    }

    /// Heuristic recommendation when no template matches.
    ///
    /// - Informational document types carry no action.
    /// - A confirmation that did not come from the customer means the
    ///   task it confirms is already done — no action either.
    /// - Everything else gets a generic medium-priority review.
    pub fn fallback(document_type: &str, from_party: &str) -> ActionRecommendation {
        if INFORMATIONAL_TYPES.contains(&document_type) {
            debug!(document_type, "Fallback: informational document, no action");
            return ActionRecommendation::none(FALLBACK_NO_ACTION_CONFIDENCE);
        }

        let is_confirmation =
            document_type == "confirmation" || document_type.ends_with("_confirmation");
        if is_confirmation && from_party != "customer" {
            debug!(
                document_type,
                from_party, "Fallback: confirmation received, task already complete"
            );
            return ActionRecommendation::none(FALLBACK_NO_ACTION_CONFIDENCE);
        }

        debug!(document_type, "Fallback: generic review action");
        ActionRecommendation {
            has_action: true,
            action_type: Some("review".into()),
            action_verb: Some("Review".into()),
            description: Some(format!("Review {document_type} received from {from_party}")),
            owner: Some("ops".into()),
            priority: 50,
            priority_label: PriorityLabel::Medium,
            deadline: None,
            deadline_source: None,
            auto_resolve_on: Vec::new(),
            auto_resolve_keywords: Vec::new(),
            confidence: FALLBACK_REVIEW_CONFIDENCE,
            source: RecommendationSource::Fallback,
        }
    }
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder regex"));

/// Render a template's description string.
///
/// Fixed-slot substitution over a whitelist of four placeholders; anything
/// else renders as the empty string. Inputs are free-text business data,
/// so there is deliberately no expression evaluation of any kind.
pub fn render_description(
    template: &str,
    document_type: &str,
    from_party: &str,
    context: Option<&ShipmentContext>,
) -> String {
    let customer_name = context
        .and_then(|c| c.customer_name.as_deref())
        .unwrap_or("the customer");
    let booking_number = context
        .and_then(|c| c.booking_number.as_deref())
        .unwrap_or("");

    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "document_type" => document_type,
            "from_party" => from_party,
            "customer_name" => customer_name,
            "booking_number" => booking_number,
            _ => "",
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::DeadlinePolicy;

    fn template(document_type: &str, from_party: &str) -> ActionTemplate {
        ActionTemplate {
            document_type: document_type.into(),
            from_party: from_party.into(),
            direction: "inbound".into(),
            action_type: "task".into(),
            action_verb: "Arrange".into(),
            template: "Arrange pickup for {customer_name} ({booking_number})".into(),
            default_owner: "import_ops".into(),
            deadline_policy: Some(DeadlinePolicy::FixedDays { days: 2 }),
            base_priority: 60,
            boost_keywords: vec!["urgent".into()],
            boost_amount: 20,
            auto_resolve_on: vec!["container_release".into()],
            auto_resolve_keywords: Vec::new(),
        }
    }

    fn snapshot_with(t: ActionTemplate) -> ConfigSnapshot {
        ConfigSnapshot::assemble(Vec::new(), Vec::new(), Vec::new(), vec![t])
    }

    #[test]
    fn lookup_matches_composite_key() {
        let snapshot = snapshot_with(template("arrival_notice", "ocean_carrier"));
        assert!(
            ActionTemplateResolver::lookup(&snapshot, "arrival_notice", "ocean_carrier").is_some()
        );
        assert!(ActionTemplateResolver::lookup(&snapshot, "arrival_notice", "customer").is_none());
        assert!(
            ActionTemplateResolver::lookup(&snapshot, "booking_confirmation", "ocean_carrier")
                .is_none()
        );
    }

    #[test]
    fn fallback_informational_types_have_no_action() {
        for doc_type in ["tracking_update", "schedule_update", "proof_of_delivery"] {
            let rec = ActionTemplateResolver::fallback(doc_type, "ocean_carrier");
            assert!(!rec.has_action, "{doc_type} should carry no action");
            assert_eq!(rec.priority, 0);
            assert_eq!(rec.source, RecommendationSource::Fallback);
        }
    }

    #[test]
    fn fallback_confirmation_not_from_customer_has_no_action() {
        let rec = ActionTemplateResolver::fallback("booking_confirmation", "ocean_carrier");
        assert!(!rec.has_action);
        assert_eq!(rec.confidence, FALLBACK_NO_ACTION_CONFIDENCE);
    }

    #[test]
    fn fallback_bare_confirmation_type_has_no_action() {
        let rec = ActionTemplateResolver::fallback("confirmation", "ocean_carrier");
        assert!(!rec.has_action);
        assert_eq!(rec.confidence, FALLBACK_NO_ACTION_CONFIDENCE);
    }

    #[test]
    fn fallback_confirmation_from_customer_gets_review() {
        let rec = ActionTemplateResolver::fallback("booking_confirmation", "customer");
        assert!(rec.has_action);
        assert_eq!(rec.priority, 50);
        assert_eq!(rec.priority_label, PriorityLabel::Medium);
        assert_eq!(rec.confidence, FALLBACK_REVIEW_CONFIDENCE);
    }

    #[test]
    fn fallback_unknown_type_gets_review() {
        let rec = ActionTemplateResolver::fallback("customs_query", "customs_broker");
        assert!(rec.has_action);
        assert_eq!(rec.action_type.as_deref(), Some("review"));
        assert!(rec.description.as_deref().unwrap().contains("customs_query"));
        assert!(rec.auto_resolve_on.is_empty());
    }

    #[test]
    fn render_substitutes_whitelisted_placeholders() {
        let ctx = ShipmentContext {
            customer_name: Some("Acme Trading".into()),
            booking_number: Some("BK12345678".into()),
            ..Default::default()
        };
        let rendered = render_description(
            "Notify {customer_name} about {document_type} for {booking_number}",
            "arrival_notice",
            "ocean_carrier",
            Some(&ctx),
        );
        assert_eq!(
            rendered,
            "Notify Acme Trading about arrival_notice for BK12345678"
        );
    }

    #[test]
    fn render_unknown_placeholder_becomes_empty() {
        let rendered = render_description(
            "Check {vessel_name} then {document_type}",
            "arrival_notice",
            "ocean_carrier",
            None,
        );
        assert_eq!(rendered, "Check  then arrival_notice");
    }

    #[test]
    fn render_defaults_when_no_context() {
        let rendered = render_description(
            "Confirm with {customer_name} ref {booking_number}",
            "arrival_notice",
            "ocean_carrier",
            None,
        );
        assert_eq!(rendered, "Confirm with the customer ref ");
    }
}
