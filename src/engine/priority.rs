//! Priority calculation: template base, keyword boosts, cutoff proximity.

use chrono::{DateTime, Utc};

use crate::engine::types::{ActionTemplate, PriorityLabel, ShipmentContext};

/// Derive a 0–100 urgency score for a templated action.
///
/// priority = base
///          + boost when any boost keyword occurs in subject+body
///          + SI-cutoff proximity boost
///          + 10 for investigate-type actions,
/// clamped to [0, 100].
pub fn calculate_priority(
    template: &ActionTemplate,
    subject: &str,
    body: &str,
    email_date: DateTime<Utc>,
    context: Option<&ShipmentContext>,
) -> (u8, PriorityLabel) {
    let mut priority = template.base_priority as i64;

    if contains_any_keyword(subject, body, &template.boost_keywords) {
        priority += template.boost_amount as i64;
    }

    if let Some(si_cutoff) = context.and_then(|c| c.si_cutoff) {
        priority += cutoff_proximity_boost(email_date, si_cutoff);
    }

    if template.action_type == "investigate" {
        priority += 10;
    }

    let priority = priority.clamp(0, 100) as u8;
    (priority, PriorityLabel::from_priority(priority))
}

/// Case-insensitive substring match of any keyword in subject or body.
fn contains_any_keyword(subject: &str, body: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let haystack = format!("{subject} {body}").to_lowercase();
    keywords
        .iter()
        .any(|kw| !kw.is_empty() && haystack.contains(&kw.to_lowercase()))
}

/// Boost by how close the SI cutoff is to the email date. A cutoff that
/// already passed counts as the tightest band.
fn cutoff_proximity_boost(email_date: DateTime<Utc>, cutoff: DateTime<Utc>) -> i64 {
    let days_until = (cutoff - email_date).num_days();
    match days_until {
        d if d <= 1 => 25,
        d if d <= 3 => 15,
        d if d <= 5 => 10,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn template(base: u8, boost: u8, keywords: &[&str]) -> ActionTemplate {
        ActionTemplate {
            document_type: "arrival_notice".into(),
            from_party: "ocean_carrier".into(),
            direction: "inbound".into(),
            action_type: "task".into(),
            action_verb: "Arrange".into(),
            template: "Arrange pickup".into(),
            default_owner: "import_ops".into(),
            deadline_policy: None,
            base_priority: base,
            boost_keywords: keywords.iter().map(|s| s.to_string()).collect(),
            boost_amount: boost,
            auto_resolve_on: Vec::new(),
            auto_resolve_keywords: Vec::new(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn base_priority_without_boosts() {
        let (priority, label) =
            calculate_priority(&template(60, 20, &["urgent"]), "FYI", "nothing here", date(2026, 1, 10), None);
        assert_eq!(priority, 60);
        assert_eq!(label, PriorityLabel::Medium);
    }

    #[test]
    fn keyword_boost_case_insensitive() {
        let (priority, label) = calculate_priority(
            &template(60, 20, &["urgent"]),
            "Arrival notice",
            "URGENT pickup needed",
            date(2026, 1, 10),
            None,
        );
        assert_eq!(priority, 80);
        assert_eq!(label, PriorityLabel::High);
    }

    #[test]
    fn keyword_boost_applies_once_for_multiple_hits() {
        let (priority, _) = calculate_priority(
            &template(60, 20, &["urgent", "asap"]),
            "Urgent",
            "asap please, urgent",
            date(2026, 1, 10),
            None,
        );
        assert_eq!(priority, 80);
    }

    #[test]
    fn cutoff_proximity_bands() {
        let email = date(2026, 1, 10);
        let t = template(40, 0, &[]);

        let ctx = |cutoff: DateTime<Utc>| ShipmentContext {
            si_cutoff: Some(cutoff),
            ..Default::default()
        };

        let (p, _) = calculate_priority(&t, "", "", email, Some(&ctx(date(2026, 1, 11))));
        assert_eq!(p, 65); // ≤1 day → +25

        let (p, _) = calculate_priority(&t, "", "", email, Some(&ctx(date(2026, 1, 13))));
        assert_eq!(p, 55); // ≤3 days → +15

        let (p, _) = calculate_priority(&t, "", "", email, Some(&ctx(date(2026, 1, 15))));
        assert_eq!(p, 50); // ≤5 days → +10

        let (p, _) = calculate_priority(&t, "", "", email, Some(&ctx(date(2026, 1, 25))));
        assert_eq!(p, 40); // far out → no boost
    }

    #[test]
    fn passed_cutoff_gets_tightest_boost() {
        let (p, _) = calculate_priority(
            &template(40, 0, &[]),
            "",
            "",
            date(2026, 1, 10),
            Some(&ShipmentContext {
                si_cutoff: Some(date(2026, 1, 8)),
                ..Default::default()
            }),
        );
        assert_eq!(p, 65);
    }

    #[test]
    fn investigate_actions_get_extra_10() {
        let mut t = template(60, 0, &[]);
        t.action_type = "investigate".into();
        let (p, _) = calculate_priority(&t, "", "", date(2026, 1, 10), None);
        assert_eq!(p, 70);
    }

    #[test]
    fn priority_clamped_to_100() {
        let (p, label) = calculate_priority(
            &template(95, 30, &["urgent"]),
            "urgent",
            "",
            date(2026, 1, 10),
            Some(&ShipmentContext {
                si_cutoff: Some(date(2026, 1, 10)),
                ..Default::default()
            }),
        );
        assert_eq!(p, 100);
        assert_eq!(label, PriorityLabel::Urgent);
    }

    #[test]
    fn label_boundaries_exact() {
        for (base, expected) in [
            (85u8, PriorityLabel::Urgent),
            (84, PriorityLabel::High),
            (70, PriorityLabel::High),
            (69, PriorityLabel::Medium),
            (50, PriorityLabel::Medium),
            (49, PriorityLabel::Low),
        ] {
            let (_, label) =
                calculate_priority(&template(base, 0, &[]), "", "", date(2026, 1, 10), None);
            assert_eq!(label, expected, "base {base}");
        }
    }
}
