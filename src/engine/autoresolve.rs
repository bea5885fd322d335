//! Auto-resolution of open actions when new evidence arrives.
//!
//! When a newly classified document lands for a shipment, every still-open
//! action for that shipment is checked against the template that created
//! it: the action resolves if the incoming document type is in the
//! template's `auto_resolve_on` set, or any of its resolve keywords
//! occurs in the email text.
//!
//! Idempotent by construction: the open-action query filters on
//! `completed_at IS NULL`, so a second run with identical inputs finds
//! nothing left to resolve. Completion is one-way; nothing here ever
//! reopens an action.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::engine::cache::{ConfigCache, ConfigSnapshot};
use crate::engine::types::{AutoResolveOutcome, OpenAction};
use crate::error::StoreError;
use crate::store::traits::OpenActionStore;

/// Closes open actions satisfied by a newly arrived document.
pub struct AutoResolveMatcher {
    cache: Arc<ConfigCache>,
    actions: Arc<dyn OpenActionStore>,
}

impl AutoResolveMatcher {
    pub fn new(cache: Arc<ConfigCache>, actions: Arc<dyn OpenActionStore>) -> Self {
        Self { cache, actions }
    }

    /// Resolve every open action on the shipment that the incoming
    /// document satisfies.
    ///
    /// Failing to read open actions fails the call (caller retries the
    /// whole thing); failing to complete one action is logged and the
    /// remaining actions are still attempted.
    pub async fn check_auto_resolve(
        &self,
        shipment_id: &str,
        incoming_document_type: &str,
        subject: &str,
        body: &str,
    ) -> Result<AutoResolveOutcome, StoreError> {
        let snapshot = self.cache.ensure_loaded().await;
        let open = self.actions.open_actions(shipment_id).await?;

        if open.is_empty() {
            debug!(shipment_id, "No open actions to check");
            return Ok(AutoResolveOutcome::default());
        }

        let text = format!("{subject} {body}").to_lowercase();
        let now = Utc::now();
        let mut resolved_ids = Vec::new();

        for action in &open {
            if !resolves(&snapshot, action, incoming_document_type, &text) {
                continue;
            }
            let note = format!(
                "[auto-resolved by {incoming_document_type} at {}]",
                now.format("%Y-%m-%dT%H:%M:%SZ")
            );
            match self.actions.complete_action(action.id, now, &note).await {
                Ok(()) => {
                    info!(
                        shipment_id,
                        action_id = %action.id,
                        incoming = incoming_document_type,
                        "Auto-resolved open action"
                    );
                    resolved_ids.push(action.id);
                }
                Err(e) => {
                    warn!(action_id = %action.id, error = %e, "Failed to complete action");
                }
            }
        }

        Ok(AutoResolveOutcome {
            resolved: !resolved_ids.is_empty(),
            resolved_action_ids: resolved_ids,
        })
    }
}

/// Whether any template for the action's recorded document type declares
/// the incoming document (or the email text) as resolving evidence.
fn resolves(
    snapshot: &ConfigSnapshot,
    action: &OpenAction,
    incoming_document_type: &str,
    lowercased_text: &str,
) -> bool {
    for template in snapshot.templates_for_document(&action.document_type) {
        if template
            .auto_resolve_on
            .iter()
            .any(|t| t == incoming_document_type)
        {
            return true;
        }
        if template
            .auto_resolve_keywords
            .iter()
            .any(|kw| !kw.is_empty() && lowercased_text.contains(&kw.to_lowercase()))
        {
            return true;
        }
    }
    false
}
