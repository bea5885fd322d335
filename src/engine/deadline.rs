//! Deadline calculation under the three configured policies.

use chrono::{DateTime, Duration, Utc};

use crate::engine::types::{CutoffKind, DeadlinePolicy, ShipmentContext};

/// Computed due date plus a human-readable source description.
#[derive(Debug, Clone, PartialEq)]
pub struct Deadline {
    pub due: DateTime<Utc>,
    pub source: String,
}

/// Compute a deadline for a template's policy.
///
/// `None` when the template has no policy, or when a cutoff-relative
/// policy cannot find its cutoff in the shipment context.
pub fn calculate_deadline(
    policy: Option<&DeadlinePolicy>,
    email_date: DateTime<Utc>,
    context: Option<&ShipmentContext>,
) -> Option<Deadline> {
    match policy? {
        DeadlinePolicy::FixedDays { days } => Some(Deadline {
            due: email_date + Duration::days(*days),
            source: format!("{days} day(s) from receipt"),
        }),
        DeadlinePolicy::CutoffRelative {
            cutoff,
            offset_days,
        } => {
            let anchor = cutoff_date(context?, *cutoff)?;
            let relation = if *offset_days <= 0 { "before" } else { "after" };
            Some(Deadline {
                due: anchor + Duration::days(*offset_days),
                source: format!(
                    "{} day(s) {} {} cutoff",
                    offset_days.abs(),
                    relation,
                    cutoff.label()
                ),
            })
        }
        DeadlinePolicy::Urgent => Some(Deadline {
            due: email_date + Duration::days(1),
            source: "Urgent — within 24 hours".into(),
        }),
    }
}

fn cutoff_date(context: &ShipmentContext, kind: CutoffKind) -> Option<DateTime<Utc>> {
    match kind {
        CutoffKind::Si => context.si_cutoff,
        CutoffKind::Vgm => context.vgm_cutoff,
        CutoffKind::Cargo => context.cargo_cutoff,
    }
}
