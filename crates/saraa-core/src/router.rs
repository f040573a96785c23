//! Router: maps classified intents to responders
//!
//! The capability table is validated once at construction; `route` is a pure
//! lookup over it.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::types::{Capability, Classification, Intent, IntentKind, RouteEntry, RoutingDecision};

pub struct Router {
    /// Per intent, sorted by ascending priority
    table: HashMap<IntentKind, Vec<Capability>>,
}

impl Router {
    /// Build a router, rejecting ambiguous or invalid capability tables
    pub fn new(capabilities: Vec<Capability>) -> Result<Self, ConfigError> {
        let mut table: HashMap<IntentKind, Vec<Capability>> = HashMap::new();

        for capability in capabilities {
            if capability.responder_id.trim().is_empty() {
                return Err(ConfigError::InvalidCapability {
                    responder: capability.responder_id,
                    reason: "responder id is empty".to_string(),
                });
            }
            if !capability.intent.is_dispatchable() {
                return Err(ConfigError::InvalidCapability {
                    responder: capability.responder_id,
                    reason: format!("{} is a tag, not a dispatch target", capability.intent),
                });
            }

            let claims = table.entry(capability.intent).or_default();
            if let Some(existing) = claims.iter().find(|c| c.priority == capability.priority) {
                return Err(ConfigError::AmbiguousRouting {
                    intent: capability.intent,
                    priority: capability.priority,
                    first: existing.responder_id.clone(),
                    second: capability.responder_id,
                });
            }
            claims.push(capability);
        }

        for claims in table.values_mut() {
            claims.sort_by_key(|c| c.priority);
        }

        Ok(Self { table })
    }

    /// All capabilities claiming `intent`, best first
    pub fn capabilities_for(&self, intent: IntentKind) -> &[Capability] {
        self.table.get(&intent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The capability that wins for `intent`, if any
    pub fn select(&self, intent: IntentKind) -> Option<&Capability> {
        self.capabilities_for(intent).first()
    }

    /// Detectable intents no responder claims
    pub fn uncovered_intents(&self) -> Vec<IntentKind> {
        IntentKind::DETECTABLE
            .iter()
            .copied()
            .filter(|kind| self.select(*kind).is_none())
            .collect()
    }

    /// Distinct responder ids named by the table
    pub fn responder_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .table
            .values()
            .flatten()
            .map(|c| c.responder_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn has_fallback(&self) -> bool {
        self.select(IntentKind::Unrecognized).is_some()
    }

    /// Build the dispatch plan for a classification.
    ///
    /// Entries keep the classification's detection order. Intents nobody
    /// claims are listed in `unrouted`; if nothing could be routed the query
    /// is treated as unrecognized.
    pub fn route(&self, classification: &Classification) -> RoutingDecision {
        let mut decision = RoutingDecision::default();

        for intent in &classification.intents {
            if intent.kind == IntentKind::Unrecognized {
                continue;
            }
            match self.select(intent.kind) {
                Some(capability) => decision.entries.push(entry(intent.clone(), capability)),
                None => {
                    warn!("No responder claims {}", intent.kind);
                    decision.unrouted.push(intent.kind);
                }
            }
        }

        if decision.entries.is_empty() {
            if let Some(fallback) = self.select(IntentKind::Unrecognized) {
                let intent = Intent {
                    kind: IntentKind::Unrecognized,
                    confidence: 0.0,
                    entities: classification
                        .intents
                        .iter()
                        .flat_map(|i| i.entities.iter().cloned())
                        .collect(),
                };
                decision.entries.push(entry(intent, fallback));
            }
        }

        debug!("Routing decision: {:?}", decision.pairs());
        decision
    }
}

fn entry(intent: Intent, capability: &Capability) -> RouteEntry {
    RouteEntry {
        intent,
        responder_id: capability.responder_id.clone(),
        required_slots: capability.required_slots.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SlotKind;

    fn demo_table() -> Vec<Capability> {
        vec![
            Capability::new("course-advisor", IntentKind::FindCourse, &[SlotKind::Subject], 0),
            Capability::new("library", IntentKind::SearchLibrary, &[], 0),
            Capability::new("events", IntentKind::FindEvents, &[], 0),
            Capability::new("profile", IntentKind::ProfileQuery, &[], 0),
            Capability::new("clarifier", IntentKind::Unrecognized, &[], 0),
        ]
    }

    fn classification(kinds: &[IntentKind]) -> Classification {
        Classification {
            tag: if kinds.len() > 1 { IntentKind::MultiIntent } else { kinds[0] },
            intents: kinds
                .iter()
                .map(|kind| Intent {
                    kind: *kind,
                    confidence: 0.5,
                    entities: vec![],
                })
                .collect(),
            text: "query".to_string(),
        }
    }

    #[test]
    fn test_equal_priority_is_ambiguous() {
        let mut table = demo_table();
        table.push(Capability::new("archive", IntentKind::SearchLibrary, &[], 0));
        let err = Router::new(table).err().unwrap();
        match err {
            ConfigError::AmbiguousRouting { intent, priority, first, second } => {
                assert_eq!(intent, IntentKind::SearchLibrary);
                assert_eq!(priority, 0);
                assert_eq!(first, "library");
                assert_eq!(second, "archive");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_multi_intent_capability_rejected() {
        let table = vec![Capability::new("both", IntentKind::MultiIntent, &[], 0)];
        assert!(matches!(
            Router::new(table),
            Err(ConfigError::InvalidCapability { .. })
        ));
    }

    #[test]
    fn test_lower_priority_wins() {
        let mut table = demo_table();
        table.push(Capability::new("archive", IntentKind::SearchLibrary, &[], 5));
        table.push(Capability::new("fast-library", IntentKind::SearchLibrary, &[], 1));
        let router = Router::new(table).unwrap();

        let ids: Vec<&str> = router
            .capabilities_for(IntentKind::SearchLibrary)
            .iter()
            .map(|c| c.responder_id.as_str())
            .collect();
        assert_eq!(ids, vec!["library", "fast-library", "archive"]);
        assert_eq!(router.select(IntentKind::SearchLibrary).unwrap().responder_id, "library");
    }

    #[test]
    fn test_route_preserves_detection_order() {
        let router = Router::new(demo_table()).unwrap();
        let decision = router.route(&classification(&[
            IntentKind::SearchLibrary,
            IntentKind::FindEvents,
        ]));
        assert_eq!(
            decision.pairs(),
            vec![
                (IntentKind::SearchLibrary, "library"),
                (IntentKind::FindEvents, "events"),
            ]
        );

        let decision = router.route(&classification(&[
            IntentKind::FindEvents,
            IntentKind::SearchLibrary,
        ]));
        assert_eq!(decision.pairs()[0].1, "events");
    }

    #[test]
    fn test_required_slots_travel_with_entry() {
        let router = Router::new(demo_table()).unwrap();
        let decision = router.route(&classification(&[IntentKind::FindCourse]));
        assert_eq!(decision.entries[0].required_slots, vec![SlotKind::Subject]);
    }

    #[test]
    fn test_unrecognized_goes_to_fallback() {
        let router = Router::new(demo_table()).unwrap();
        let decision = router.route(&classification(&[IntentKind::Unrecognized]));
        assert_eq!(decision.pairs(), vec![(IntentKind::Unrecognized, "clarifier")]);
    }

    #[test]
    fn test_unrecognized_without_fallback_is_empty() {
        let table: Vec<Capability> = demo_table()
            .into_iter()
            .filter(|c| c.intent != IntentKind::Unrecognized)
            .collect();
        let router = Router::new(table).unwrap();
        assert!(!router.has_fallback());
        assert!(router.route(&classification(&[IntentKind::Unrecognized])).is_empty());
    }

    #[test]
    fn test_uncovered_intent_is_unrouted() {
        let table = vec![Capability::new("library", IntentKind::SearchLibrary, &[], 0)];
        let router = Router::new(table).unwrap();
        assert_eq!(
            router.uncovered_intents(),
            vec![IntentKind::FindCourse, IntentKind::FindEvents, IntentKind::ProfileQuery]
        );

        let decision = router.route(&classification(&[
            IntentKind::FindCourse,
            IntentKind::SearchLibrary,
        ]));
        assert_eq!(decision.pairs(), vec![(IntentKind::SearchLibrary, "library")]);
        assert_eq!(decision.unrouted, vec![IntentKind::FindCourse]);
    }

    #[test]
    fn test_nothing_routable_falls_back() {
        let table = vec![
            Capability::new("library", IntentKind::SearchLibrary, &[], 0),
            Capability::new("clarifier", IntentKind::Unrecognized, &[], 0),
        ];
        let router = Router::new(table).unwrap();
        let decision = router.route(&classification(&[IntentKind::ProfileQuery]));
        assert_eq!(decision.pairs(), vec![(IntentKind::Unrecognized, "clarifier")]);
        assert_eq!(decision.unrouted, vec![IntentKind::ProfileQuery]);
    }

    #[test]
    fn test_responder_ids_are_distinct() {
        let mut table = demo_table();
        table.push(Capability::new("library", IntentKind::ProfileQuery, &[], 3));
        let router = Router::new(table).unwrap();
        assert_eq!(
            router.responder_ids(),
            vec!["clarifier", "course-advisor", "events", "library", "profile"]
        );
    }
}
