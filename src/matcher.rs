//! Subscription matching.
//!
//! The matcher is a pure predicate over one canonical event and one
//! subscription. Every filter dimension is conjunctive: a single failing
//! dimension rejects the event regardless of the others. Within the service
//! dimension any one substring suffices.

use crate::event::{CanonicalEvent, EventKind, ImpactLevel};
use crate::subscription::{EventTypeFilter, Subscription};

/// Why an event was rejected for a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// An exclude keyword appeared in the title or components.
    Excluded {
        /// The keyword as stored on the subscription.
        keyword: String,
    },
    /// The subscriber does not want events of this kind.
    EventType {
        /// The subscriber's filter.
        filter: EventTypeFilter,
        /// The event's kind.
        kind: EventKind,
    },
    /// Incident impact is below the subscriber's floor.
    BelowImpactFloor {
        /// The incident's impact.
        impact: ImpactLevel,
        /// The subscriber's minimum.
        floor: ImpactLevel,
    },
    /// No service filter appears in the title or components.
    NoServiceMatch,
}

/// Verdict of [`evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutput {
    /// Every dimension passed.
    Match,
    /// The first dimension that failed.
    NoMatch(Rejection),
}

impl MatchOutput {
    /// True for [`MatchOutput::Match`].
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

/// Evaluate `subscription` against `event`, reporting the first failing dimension.
#[must_use]
pub fn evaluate(event: &CanonicalEvent, subscription: &Subscription) -> MatchOutput {
    // Only built when a substring dimension is configured.
    let mut haystack: Option<String> = None;

    if !subscription.exclude_keywords.is_empty() {
        let text = haystack.get_or_insert_with(|| event.haystack());
        // Stored lower-cased at the write boundary; lower again for records built by hand.
        if let Some(keyword) = subscription
            .exclude_keywords
            .iter()
            .find(|k| text.contains(k.to_lowercase().as_str()))
        {
            return MatchOutput::NoMatch(Rejection::Excluded {
                keyword: keyword.clone(),
            });
        }
    }

    if !subscription.event_types.admits(event.kind) {
        return MatchOutput::NoMatch(Rejection::EventType {
            filter: subscription.event_types,
            kind: event.kind,
        });
    }

    if event.kind == EventKind::Incident
        && subscription.min_impact != ImpactLevel::None
        && event.impact.rank() < subscription.min_impact.rank()
    {
        return MatchOutput::NoMatch(Rejection::BelowImpactFloor {
            impact: event.impact,
            floor: subscription.min_impact,
        });
    }

    if !subscription.service_filters.is_empty() {
        let text = haystack.get_or_insert_with(|| event.haystack());
        let matched = subscription
            .service_filters
            .iter()
            .any(|service| text.contains(service.to_lowercase().as_str()));
        if !matched {
            return MatchOutput::NoMatch(Rejection::NoServiceMatch);
        }
    }

    MatchOutput::Match
}

/// Whether `event` should be delivered to the owner of `subscription`.
#[must_use]
pub fn matches(event: &CanonicalEvent, subscription: &Subscription) -> bool {
    evaluate(event, subscription).is_match()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::subscription::{FilterCommand, SubscriberId};

    fn open_sub() -> Subscription {
        Subscription::new(SubscriberId::new("s").unwrap(), Utc::now())
    }

    fn incident(impact: ImpactLevel) -> CanonicalEvent {
        CanonicalEvent::new("i", EventKind::Incident, "investigating", "Matchmaking Delays")
            .with_impact(impact)
            .with_components(["Fortnite"])
    }

    fn maintenance() -> CanonicalEvent {
        CanonicalEvent::new("m", EventKind::Maintenance, "scheduled", "Rocket League Downtime")
    }

    #[test]
    fn open_subscription_matches_everything() {
        let sub = open_sub();
        for impact in ImpactLevel::ALL {
            assert!(matches(&incident(impact), &sub));
        }
        assert!(matches(&maintenance(), &sub));
    }

    #[test]
    fn impact_floor_applies_to_incidents_only() {
        let mut sub = open_sub();
        sub.min_impact = ImpactLevel::Major;
        assert_eq!(
            evaluate(&incident(ImpactLevel::Minor), &sub),
            MatchOutput::NoMatch(Rejection::BelowImpactFloor {
                impact: ImpactLevel::Minor,
                floor: ImpactLevel::Major,
            })
        );
        assert!(matches(&incident(ImpactLevel::Major), &sub));
        assert!(matches(&incident(ImpactLevel::Critical), &sub));
        assert!(matches(&maintenance(), &sub));

        sub.min_impact = ImpactLevel::Minor;
        assert!(matches(&incident(ImpactLevel::Minor), &sub));
        assert!(!matches(&incident(ImpactLevel::None), &sub));
    }

    #[test]
    fn event_type_filter_rejects_other_kind() {
        let mut sub = open_sub();
        sub.event_types = EventTypeFilter::IncidentsOnly;
        assert!(!matches(&maintenance(), &sub));
        assert!(matches(&incident(ImpactLevel::Minor), &sub));

        sub.event_types = EventTypeFilter::MaintenanceOnly;
        assert!(matches(&maintenance(), &sub));
        assert!(!matches(&incident(ImpactLevel::Critical), &sub));
    }

    #[test]
    fn service_filter_matches_title_without_components() {
        let mut sub = open_sub();
        sub.apply(&FilterCommand::AddService { service: "fortnite".into() }, Utc::now())
            .unwrap();
        let ev = CanonicalEvent::new("x", EventKind::Incident, "investigating", "Fortnite Login Issues");
        assert!(ev.affected_components.is_empty());
        assert!(matches(&ev, &sub));
    }

    #[test]
    fn service_filter_is_disjunctive_and_case_insensitive() {
        let mut sub = open_sub();
        let now = Utc::now();
        sub.apply(&FilterCommand::AddService { service: "Epic Games Store".into() }, now)
            .unwrap();
        sub.apply(&FilterCommand::AddService { service: "FORTNITE".into() }, now)
            .unwrap();
        assert!(matches(&incident(ImpactLevel::Minor), &sub));
        assert_eq!(
            evaluate(&maintenance(), &sub),
            MatchOutput::NoMatch(Rejection::NoServiceMatch)
        );
    }

    #[test]
    fn any_failing_dimension_rejects() {
        let now = Utc::now();
        let ev = incident(ImpactLevel::Critical);

        let mut by_type = open_sub();
        by_type.event_types = EventTypeFilter::MaintenanceOnly;
        let mut by_impact = open_sub();
        by_impact.min_impact = ImpactLevel::Critical;
        by_impact.apply(&FilterCommand::AddService { service: "valorant".into() }, now)
            .unwrap();
        let mut by_exclude = open_sub();
        by_exclude.apply(&FilterCommand::AddExclude { keyword: "matchmaking".into() }, now)
            .unwrap();

        assert!(!matches(&ev, &by_type));
        assert!(!matches(&ev, &by_impact));
        assert!(!matches(&ev, &by_exclude));
    }

    #[test]
    fn deserialized_filters_match_case_insensitively() {
        let sub: Subscription = serde_json::from_value(serde_json::json!({
            "subscriber_id": "7",
            "service_filters": ["FORTNITE"],
            "exclude_keywords": ["LEGO"],
            "created_at": "2026-10-17T12:00:00Z",
            "updated_at": "2026-10-17T12:00:00Z"
        }))
        .unwrap();

        let lego = CanonicalEvent::new("l", EventKind::Incident, "investigating", "LEGO Fortnite outage");
        assert_eq!(
            evaluate(&lego, &sub),
            MatchOutput::NoMatch(Rejection::Excluded {
                keyword: "LEGO".to_string(),
            })
        );

        let plain = CanonicalEvent::new("f", EventKind::Incident, "investigating", "Fortnite login outage");
        assert!(matches(&plain, &sub));
    }
}
