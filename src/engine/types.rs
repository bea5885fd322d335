//! Shared types for the document decision engine.
//!
//! The upstream classifier converts raw freight-forwarding emails into a
//! [`ClassifiedDocument`]. This module defines that boundary input plus
//! everything the engine produces from it: confidence signals and results,
//! action recommendations, and open-action records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ── Classifier boundary input ───────────────────────────────────────

/// Output of the external classifier for one email document.
///
/// This is the sole input to confidence scoring. The engine never sees
/// the raw email — only the extracted structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedDocument {
    /// Detected document type, e.g. "arrival_notice", "booking_confirmation".
    pub document_type: String,
    /// Structured fields the extractor pulled out of the email.
    #[serde(default)]
    pub extracted_fields: Map<String, Value>,
    /// Raw sender address as it appeared on the email.
    pub sender_email: String,
    /// Detection pattern that fired, if any. Absence means the document
    /// was classified by the extractor alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
    /// The firing pattern's own confidence (0–100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_confidence: Option<f64>,
    /// Shipment this document was matched to, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<String>,
}

/// Caller-supplied shipment context. Everything is optional — the engine
/// degrades to neutral defaults for whatever is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipmentContext {
    /// Current lifecycle stage, e.g. "booking_confirmed", "in_transit".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_number: Option<String>,
    /// Shipping-instruction cutoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub si_cutoff: Option<DateTime<Utc>>,
    /// Verified-gross-mass cutoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vgm_cutoff: Option<DateTime<Utc>>,
    /// Cargo delivery cutoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cargo_cutoff: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<DateTime<Utc>>,
}

// ── Confidence scoring ──────────────────────────────────────────────

/// One independently computed confidence indicator.
///
/// Immutable once produced: the aggregator reads it, the audit record
/// snapshots it, nothing mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceSignal {
    /// Rule name, e.g. "completeness", "sender_trust".
    pub name: String,
    /// Score in [0, 100].
    pub score: f64,
    /// Configured weight, 0.0 when the rule is disabled or absent.
    pub weight: f64,
    /// Evaluator-specific explainability payload.
    pub details: Value,
}

/// Result of one confidence evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceResult {
    /// Weighted mean of the positive-weight signals, rounded. 50 when no
    /// signal carries weight.
    pub overall_score: f64,
    /// All five signals, in evaluation order.
    pub signals: Vec<ConfidenceSignal>,
    /// Threshold-band action, `human_review` when no band matches.
    pub recommendation: String,
    /// Human-readable explanations for every concerning signal.
    pub reasoning: Vec<String>,
    /// Id of the written audit record; absent when the audit write failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<Uuid>,
}

/// Universal fallback recommendation when no threshold band matches.
pub const HUMAN_REVIEW: &str = "human_review";

// ── Config-store entities ───────────────────────────────────────────

/// Governs whether and how strongly one signal contributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceRule {
    pub name: String,
    pub weight: f64,
    pub enabled: bool,
}

/// Defines what "complete" means for one document type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedField {
    pub document_type: String,
    pub field_name: String,
    pub required: bool,
    pub weight: f64,
}

/// One contiguous score range mapped to a recommended action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdBand {
    pub min_score: f64,
    pub max_score: f64,
    pub action: String,
}

impl ThresholdBand {
    /// Whether a score falls inside this band (inclusive on both ends).
    pub fn contains(&self, score: f64) -> bool {
        score >= self.min_score && score <= self.max_score
    }
}

// ── Action templates ────────────────────────────────────────────────

/// Which cutoff a relative deadline anchors to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutoffKind {
    Si,
    Vgm,
    Cargo,
}

impl CutoffKind {
    /// Display label used in deadline sources.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Si => "SI",
            Self::Vgm => "VGM",
            Self::Cargo => "cargo",
        }
    }
}

/// How a template's deadline is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DeadlinePolicy {
    /// Email date + N calendar days.
    FixedDays { days: i64 },
    /// A shipment cutoff + a day offset (usually negative).
    CutoffRelative { cutoff: CutoffKind, offset_days: i64 },
    /// Email date + 1 day.
    Urgent,
}

/// Configured action template for a (document type, party, direction) key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub document_type: String,
    pub from_party: String,
    pub direction: String,
    pub action_type: String,
    pub action_verb: String,
    /// Description template with `{placeholder}` slots.
    pub template: String,
    pub default_owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_policy: Option<DeadlinePolicy>,
    pub base_priority: u8,
    #[serde(default)]
    pub boost_keywords: Vec<String>,
    #[serde(default)]
    pub boost_amount: u8,
    /// Document types whose arrival resolves actions created from this template.
    #[serde(default)]
    pub auto_resolve_on: Vec<String>,
    /// Keywords whose appearance resolves actions created from this template.
    #[serde(default)]
    pub auto_resolve_keywords: Vec<String>,
}

// ── Action recommendation ───────────────────────────────────────────

/// Urgency label derived from the numeric priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriorityLabel {
    Urgent,
    High,
    Medium,
    Low,
}

impl PriorityLabel {
    /// Exact boundaries: ≥85 URGENT, ≥70 HIGH, ≥50 MEDIUM, else LOW.
    pub fn from_priority(priority: u8) -> Self {
        match priority {
            85..=u8::MAX => Self::Urgent,
            70..=84 => Self::High,
            50..=69 => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Where a recommendation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Template,
    Fallback,
}

/// Operational action implied by one classified document.
///
/// Ephemeral: computed and returned, never persisted by this engine.
/// Callers that open an action should persist `auto_resolve_on` /
/// `auto_resolve_keywords` alongside it so the matcher can close it later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecommendation {
    pub has_action: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_verb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Urgency in [0, 100].
    pub priority: u8,
    pub priority_label: PriorityLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_source: Option<String>,
    #[serde(default)]
    pub auto_resolve_on: Vec<String>,
    #[serde(default)]
    pub auto_resolve_keywords: Vec<String>,
    /// How much to trust this recommendation itself.
    pub confidence: f64,
    pub source: RecommendationSource,
}

impl ActionRecommendation {
    /// A no-action fallback result (informational documents, received
    /// confirmations).
    pub fn none(confidence: f64) -> Self {
        Self {
            has_action: false,
            action_type: None,
            action_verb: None,
            description: None,
            owner: None,
            priority: 0,
            priority_label: PriorityLabel::Low,
            deadline: None,
            deadline_source: None,
            auto_resolve_on: Vec::new(),
            auto_resolve_keywords: Vec::new(),
            confidence,
            source: RecommendationSource::Fallback,
        }
    }
}

// ── Open actions ────────────────────────────────────────────────────

/// A previously opened operational action for a shipment.
///
/// Created externally when a document implies work; the matcher only ever
/// transitions open → completed, never the reverse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAction {
    pub id: Uuid,
    pub shipment_id: String,
    /// Document type that opened this action (keys back to its template).
    pub document_type: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl OpenAction {
    /// Create a new open action for a shipment.
    pub fn new(
        shipment_id: impl Into<String>,
        document_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            shipment_id: shipment_id.into(),
            document_type: document_type.into(),
            description: description.into(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Result of one auto-resolve pass over a shipment's open actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoResolveOutcome {
    pub resolved: bool,
    pub resolved_action_ids: Vec<Uuid>,
}
