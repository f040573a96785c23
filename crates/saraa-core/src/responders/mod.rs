//! Responder contract and registry

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::context::ConversationContext;
use crate::error::ResponderError;
use crate::types::{Capability, Intent, IntentKind, Query, SlotKind};

pub mod clarifier;
pub mod courses;
pub mod events;
pub mod library;
pub mod profile;

pub use clarifier::ClarifierResponder;
pub use courses::CourseAdvisor;
pub use events::EventsResponder;
pub use library::LibraryResponder;
pub use profile::{ProfileResponder, StudentProfile};

/// What a responder receives for one routing entry
#[derive(Debug, Clone)]
pub struct ResponderRequest {
    pub query: Query,
    pub intent: Intent,
    /// Read-only snapshot taken before dispatch
    pub context: Arc<ConversationContext>,
}

impl ResponderRequest {
    /// Values of every entity of `slot`, in extraction order
    pub fn values(&self, slot: SlotKind) -> Vec<&str> {
        self.intent
            .entities
            .iter()
            .filter(|e| e.slot == slot)
            .map(|e| e.value.as_str())
            .collect()
    }

    pub fn has_slot(&self, slot: SlotKind) -> bool {
        self.intent.has_slot(slot)
    }

    /// Values of `slot` split by negation, without the `not-` prefix
    pub fn preferences(&self, slot: SlotKind) -> Preferences<'_> {
        let mut prefs = Preferences::default();
        for entity in self.intent.entities.iter().filter(|e| e.slot == slot) {
            if entity.is_negated() {
                prefs.avoided.push(entity.base_value());
            } else {
                prefs.wanted.push(entity.base_value());
            }
        }
        prefs
    }
}

/// What a query asks for and what it rules out, for one slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preferences<'a> {
    pub wanted: Vec<&'a str>,
    pub avoided: Vec<&'a str>,
}

impl<'a> Preferences<'a> {
    pub fn new(wanted: &[&'a str], avoided: &[&'a str]) -> Self {
        Self {
            wanted: wanted.to_vec(),
            avoided: avoided.to_vec(),
        }
    }

    pub fn is_avoided(&self, value: &str) -> bool {
        self.avoided.iter().any(|a| a.eq_ignore_ascii_case(value))
    }
}

/// A capability-specific handler.
///
/// Must be safe to call concurrently and must tolerate being aborted at any
/// await point.
#[async_trait]
pub trait Responder: Send + Sync {
    fn id(&self) -> &str;
    async fn handle(&self, request: &ResponderRequest) -> Result<String, ResponderError>;
}

/// Registry of available responders
pub struct ResponderRegistry {
    responders: HashMap<String, Arc<dyn Responder>>,
}

impl ResponderRegistry {
    pub fn new() -> Self {
        Self {
            responders: HashMap::new(),
        }
    }

    /// Register a responder under its own id
    pub fn register(&mut self, responder: Arc<dyn Responder>) {
        let id = responder.id().to_string();
        debug!("Registering responder: {}", id);
        self.responders.insert(id, responder);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Responder>> {
        self.responders.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.responders.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.responders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responders.is_empty()
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.responders.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for ResponderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with every demo responder
pub fn demo_registry() -> ResponderRegistry {
    let mut registry = ResponderRegistry::new();
    registry.register(Arc::new(CourseAdvisor::new()));
    registry.register(Arc::new(LibraryResponder::new()));
    registry.register(Arc::new(EventsResponder::new()));
    registry.register(Arc::new(ProfileResponder::new()));
    registry.register(Arc::new(ClarifierResponder));
    registry
}

/// Capability table matching `demo_registry`
pub fn demo_capabilities() -> Vec<Capability> {
    vec![
        Capability::new(courses::ID, IntentKind::FindCourse, &[SlotKind::Subject], 0),
        Capability::new(library::ID, IntentKind::SearchLibrary, &[], 0),
        Capability::new(events::ID, IntentKind::FindEvents, &[], 0),
        Capability::new(profile::ID, IntentKind::ProfileQuery, &[], 0),
        Capability::new(clarifier::ID, IntentKind::Unrecognized, &[], 0),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers shared by responder and dispatcher tests

    use super::*;
    use crate::types::{Entity, Span};

    /// Request whose entities all come from `text`
    pub fn request(kind: IntentKind, text: &str, entities: &[(SlotKind, &str)]) -> ResponderRequest {
        ResponderRequest {
            query: Query::new("test", text),
            intent: Intent {
                kind,
                confidence: 1.0,
                entities: entities
                    .iter()
                    .map(|(slot, value)| {
                        Entity::new(*slot, *value, Some(Span { start: 0, end: text.len() }))
                    })
                    .collect(),
            },
            context: Arc::new(ConversationContext::new("test", 5)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Responder for Echo {
        fn id(&self) -> &str {
            "echo"
        }

        async fn handle(&self, request: &ResponderRequest) -> Result<String, ResponderError> {
            Ok(request.query.text.clone())
        }
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = ResponderRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(Echo));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("echo"));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_registered_responder_is_callable() {
        let mut registry = ResponderRegistry::new();
        registry.register(Arc::new(Echo));
        let responder = registry.get("echo").unwrap();
        let request = testing::request(IntentKind::FindCourse, "hello", &[]);
        assert_eq!(responder.handle(&request).await.unwrap(), "hello");
    }

    #[test]
    fn test_demo_table_matches_registry() {
        let registry = demo_registry();
        for capability in demo_capabilities() {
            assert!(
                registry.contains(&capability.responder_id),
                "{} not registered",
                capability.responder_id
            );
        }
        assert_eq!(
            registry.ids(),
            vec!["clarifier", "course-advisor", "events", "library", "profile"]
        );
    }

    #[test]
    fn test_request_values() {
        let request = testing::request(
            IntentKind::FindCourse,
            "q",
            &[
                (SlotKind::Subject, "AI"),
                (SlotKind::TimeConstraint, "not-morning"),
                (SlotKind::Subject, "physics"),
            ],
        );
        assert_eq!(request.values(SlotKind::Subject), vec!["AI", "physics"]);
        assert!(request.has_slot(SlotKind::TimeConstraint));
        assert!(!request.has_slot(SlotKind::Author));
    }

    #[test]
    fn test_request_preferences() {
        let request = testing::request(
            IntentKind::FindCourse,
            "q",
            &[
                (SlotKind::TimeConstraint, "evening"),
                (SlotKind::TimeConstraint, "not-morning"),
                (SlotKind::TimeConstraint, "not-friday"),
            ],
        );
        let times = request.preferences(SlotKind::TimeConstraint);
        assert_eq!(times, Preferences::new(&["evening"], &["morning", "friday"]));
        assert!(times.is_avoided("Morning"));
        assert!(!times.is_avoided("evening"));
        assert_eq!(request.preferences(SlotKind::Subject), Preferences::default());
    }
}
