//! Engine: wires the pipeline together and runs turns
//!
//! text -> extract -> classify (with context) -> route -> dispatch ->
//! synthesize -> context update. A turn never fails; configuration problems
//! are caught by `EngineBuilder::build`.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::classifier::{ClassifierConfig, IntentClassifier};
use crate::context::{ContextConfig, ContextStore, ConversationContext};
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::error::ConfigError;
use crate::extractor::extract;
use crate::lexicon::{Lexicon, LexiconHandle};
use crate::responders::{Responder, ResponderRegistry, demo_capabilities, demo_registry};
use crate::router::Router;
use crate::synthesizer::synthesize;
use crate::types::{Capability, Classification, Entity, IntentKind, Query, RoutingDecision, SynthesizedResponse};

/// Configuration for every engine component
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub dispatcher: DispatcherConfig,
    pub context: ContextConfig,
}

/// How a query was understood and where it would be sent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Understanding {
    pub entities: Vec<Entity>,
    pub classification: Classification,
    pub decision: RoutingDecision,
}

pub struct EngineBuilder {
    lexicon: Option<LexiconHandle>,
    capabilities: Vec<Capability>,
    registry: ResponderRegistry,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            lexicon: None,
            capabilities: Vec::new(),
            registry: ResponderRegistry::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = Some(LexiconHandle::new(lexicon));
        self
    }

    /// Share a handle, e.g. one kept current by a file watcher
    pub fn lexicon_handle(mut self, handle: LexiconHandle) -> Self {
        self.lexicon = Some(handle);
        self
    }

    pub fn capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn registry(mut self, registry: ResponderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register one responder, replacing any with the same id
    pub fn responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.registry.register(responder);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the lexicon, capability table and registry together
    pub fn build(self) -> Result<Engine, ConfigError> {
        self.config.classifier.validate()?;
        let lexicon = self
            .lexicon
            .unwrap_or_else(|| LexiconHandle::new(Lexicon::builtin()));
        lexicon.snapshot().validate()?;

        let router = Router::new(self.capabilities)?;
        for id in router.responder_ids() {
            if !self.registry.contains(&id) {
                return Err(ConfigError::UnknownResponder(id));
            }
        }
        for intent in router.uncovered_intents() {
            warn!("No responder handles {}; such queries will be unrouted", intent);
        }
        if !router.has_fallback() {
            warn!("No fallback responder; unrecognized queries get a clarification only");
        }

        info!(
            "Engine ready with {} responder(s): {}",
            self.registry.len(),
            self.registry.ids().join(", ")
        );

        Ok(Engine {
            lexicon,
            classifier: IntentClassifier::new(self.config.classifier),
            router,
            dispatcher: Dispatcher::new(Arc::new(self.registry), self.config.dispatcher),
            contexts: Arc::new(ContextStore::new(self.config.context)),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Engine {
    lexicon: LexiconHandle,
    classifier: IntentClassifier,
    router: Router,
    dispatcher: Dispatcher,
    contexts: Arc<ContextStore>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Built-in lexicon with the demo responders
    pub fn demo(config: EngineConfig) -> Result<Self, ConfigError> {
        EngineBuilder::new()
            .registry(demo_registry())
            .capabilities(demo_capabilities())
            .config(config)
            .build()
    }

    pub fn lexicon(&self) -> &LexiconHandle {
        &self.lexicon
    }

    pub fn contexts(&self) -> &Arc<ContextStore> {
        &self.contexts
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Extract, classify and route without dispatching
    fn understand(&self, text: &str, context: &ConversationContext) -> Understanding {
        let lexicon = self.lexicon.snapshot();
        let entities = extract(&lexicon, text);
        let classification = self
            .classifier
            .classify_with_context(&lexicon, text, &entities, context);
        let decision = self.router.route(&classification);
        Understanding {
            entities,
            classification,
            decision,
        }
    }

    /// Show how a query would be handled, using the session's context
    pub async fn explain(&self, session_id: &str, text: &str) -> Understanding {
        let context = match self.contexts.get(session_id).await {
            Ok(context) => context,
            Err(e) => {
                warn!("{}; explaining without history", e);
                self.contexts.fresh(session_id)
            }
        };
        self.understand(text, &context)
    }

    /// Run one turn. Always produces a reply.
    pub async fn process_turn(&self, session_id: &str, text: &str) -> SynthesizedResponse {
        let started = Instant::now();
        let query = Query::new(session_id, text);

        // held for the whole turn so same-session turns serialize
        let mut session = match self.contexts.acquire(session_id).await {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!("{}; continuing without history for query {}", e, query.id);
                None
            }
        };
        let snapshot = Arc::new(match &session {
            Some(guard) => (**guard).clone(),
            None => self.contexts.fresh(session_id),
        });

        let understanding = self.understand(&query.text, &snapshot);
        debug!(
            "Query {} classified as {} {:?}",
            query.id,
            understanding.classification.tag,
            understanding.classification.kinds()
        );

        let results = self
            .dispatcher
            .dispatch(&query, &understanding.decision, Arc::clone(&snapshot))
            .await;
        let response = synthesize(&results, &snapshot);

        if let Some(guard) = session.as_mut() {
            guard.record_turn(
                &query,
                &understanding.classification,
                &understanding.entities,
                &results,
            );
        }

        info!(
            "Turn {} session={} intents={:?} status={} in {:?}",
            query.id,
            session_id,
            understanding
                .decision
                .entries
                .iter()
                .map(|e| e.intent.kind)
                .collect::<Vec<IntentKind>>(),
            response.status,
            started.elapsed()
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::ResponderError;
    use crate::responders::ResponderRequest;
    use crate::types::{FailureKind, ResponseStatus, SlotKind, Span};

    const END_TO_END: &str = "Find me a book about machine learning and tell me about AI events";

    /// Stands in for a responder id and never answers in time
    struct Hung(&'static str);

    #[async_trait]
    impl Responder for Hung {
        fn id(&self) -> &str {
            self.0
        }

        async fn handle(&self, _request: &ResponderRequest) -> Result<String, ResponderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }
    }

    struct Broken(&'static str);

    #[async_trait]
    impl Responder for Broken {
        fn id(&self) -> &str {
            self.0
        }

        async fn handle(&self, _request: &ResponderRequest) -> Result<String, ResponderError> {
            Err(ResponderError::Failed("upstream returned 503".to_string()))
        }
    }

    fn demo() -> Engine {
        Engine::demo(EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_multi_intent() {
        let engine = demo();

        let understanding = engine.explain("s1", END_TO_END).await;
        assert!(understanding.entities.contains(&Entity::new(
            SlotKind::Subject,
            "machine-learning",
            Some(Span { start: 21, end: 37 })
        )));
        assert!(
            understanding
                .entities
                .iter()
                .any(|e| e.slot == SlotKind::Category && e.value == "AI")
        );
        assert_eq!(understanding.classification.tag, IntentKind::MultiIntent);
        assert_eq!(
            understanding.decision.pairs(),
            vec![
                (IntentKind::SearchLibrary, "library"),
                (IntentKind::FindEvents, "events"),
            ]
        );

        let response = engine.process_turn("s1", END_TO_END).await;
        assert_eq!(response.status, ResponseStatus::Complete);
        let order: Vec<(IntentKind, &str)> = response
            .fragments
            .iter()
            .map(|f| (f.intent, f.responder_id.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (IntentKind::SearchLibrary, "library"),
                (IntentKind::FindEvents, "events"),
            ]
        );
        let text = response.render();
        assert!(text.contains("Artificial Intelligence: A Modern Approach"));
        assert!(text.contains("Machine Learning Research Symposium"));
    }

    #[tokio::test]
    async fn test_negated_time_reaches_course_advisor() {
        let engine = demo();
        let response = engine
            .process_turn("s1", "AI electives with no morning classes")
            .await;
        assert_eq!(response.status, ResponseStatus::Complete);
        assert_eq!(response.fragments.len(), 1);
        let body = &response.fragments[0].body;
        assert!(body.contains("CS301"));
        assert!(!body.contains("CS305"));
    }

    #[tokio::test]
    async fn test_negated_category_keeps_events_out() {
        let engine = demo();
        let response = engine.process_turn("s1", "any events with no AI").await;
        assert_eq!(response.status, ResponseStatus::Complete);
        assert_eq!(response.fragments.len(), 1);
        let body = &response.fragments[0].body;
        assert!(body.contains("Programming Workshop"), "{}", body);
        assert!(body.contains("Varsity Soccer Match"));
        assert!(!body.contains("AI in Healthcare"));
        assert!(!body.contains("Machine Learning Research Symposium"));
    }

    #[tokio::test]
    async fn test_event_date_range_narrows_listing() {
        let engine = demo();
        let body = engine
            .process_turn("s1", "any events this week")
            .await
            .render();
        assert!(body.contains("Upcoming events (1):"), "{}", body);
        assert!(body.contains("Programming Workshop"));
    }

    #[tokio::test]
    async fn test_title_lookup_after_course_question() {
        let engine = demo();
        engine.process_turn("s1", "Any AI courses?").await;
        let response = engine
            .process_turn("s1", "Is the book Clean Code available?")
            .await;
        assert_eq!(response.fragments.len(), 1);
        let body = &response.fragments[0].body;
        assert!(body.starts_with("Found 1 item(s):"), "{}", body);
        assert!(body.contains("Clean Code"));
    }

    #[tokio::test]
    async fn test_profile_interests_persist_across_turns() {
        let engine = demo();
        let first = engine
            .process_turn("s1", "update my interests: physics")
            .await
            .render();
        assert!(first.contains("Added to your interests: physics"), "{}", first);

        let second = engine.process_turn("s1", "show my profile").await.render();
        assert!(second.contains("programming, physics"), "{}", second);
        assert!(!second.contains("Added to your interests"));

        // other sessions keep the demo profile
        let other = engine.process_turn("s2", "show my profile").await.render();
        assert!(!other.contains("physics"));
    }

    #[tokio::test]
    async fn test_one_failure_gives_partial() {
        let engine = EngineBuilder::new()
            .registry(demo_registry())
            .responder(Arc::new(Broken("events")))
            .capabilities(demo_capabilities())
            .build()
            .unwrap();
        let response = engine.process_turn("s1", END_TO_END).await;
        assert_eq!(response.status, ResponseStatus::Partial);
        assert!(response.fragments[0].failure.is_none());
        assert_eq!(response.fragments[1].failure, Some(FailureKind::ResponderError));
        assert!(!response.render().contains("503"));
    }

    #[tokio::test]
    async fn test_hung_responder_is_bounded() {
        let engine = EngineBuilder::new()
            .registry(demo_registry())
            .responder(Arc::new(Hung("library")))
            .capabilities(demo_capabilities())
            .config(EngineConfig {
                dispatcher: DispatcherConfig {
                    call_timeout: Duration::from_millis(100),
                    turn_overhead: Duration::from_millis(50),
                },
                ..Default::default()
            })
            .build()
            .unwrap();

        let started = std::time::Instant::now();
        let response = engine.process_turn("s1", END_TO_END).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(response.status, ResponseStatus::Partial);
        assert_eq!(response.fragments[0].failure, Some(FailureKind::Timeout));
        assert!(response.fragments[1].failure.is_none());
    }

    #[tokio::test]
    async fn test_unrecognized_goes_to_clarifier() {
        let engine = demo();
        let response = engine.process_turn("s1", "hello there").await;
        assert_eq!(response.status, ResponseStatus::Complete);
        assert_eq!(response.fragments[0].intent, IntentKind::Unrecognized);
        assert!(response.render().contains("\"hello there\""));
    }

    #[tokio::test]
    async fn test_unrecognized_without_fallback_is_empty() {
        let capabilities: Vec<Capability> = demo_capabilities()
            .into_iter()
            .filter(|c| c.intent != IntentKind::Unrecognized)
            .collect();
        let engine = EngineBuilder::new()
            .registry(demo_registry())
            .capabilities(capabilities)
            .build()
            .unwrap();
        let response = engine.process_turn("s1", "hello there").await;
        assert_eq!(response.status, ResponseStatus::Empty);
        assert!(response.fragments.is_empty());
        assert!(response.clarification.is_some());
    }

    #[tokio::test]
    async fn test_follow_up_carries_subject() {
        let engine = demo();

        // without history the subject is missing
        let cold = engine.process_turn("other", "and what about morning classes?").await;
        assert_eq!(cold.status, ResponseStatus::Empty);
        assert_eq!(cold.fragments[0].failure, Some(FailureKind::InvalidEntities));

        engine.process_turn("s1", "Any AI courses?").await;
        let warm = engine.process_turn("s1", "and what about morning classes?").await;
        assert_eq!(warm.status, ResponseStatus::Complete);
        assert!(warm.fragments[0].body.contains("CS305"));
    }

    #[tokio::test]
    async fn test_context_updated_once_per_turn() {
        let engine = demo();
        engine.process_turn("s1", "Any AI courses?").await;
        engine.process_turn("s1", "hello there").await;
        let context = engine.contexts().get("s1").await.unwrap();
        assert_eq!(context.turn_count, 2);
        assert_eq!(context.turns.len(), 2);
        assert_eq!(context.last_results.len(), 1);
        assert_eq!(context.last_turn().unwrap().intents, vec![IntentKind::Unrecognized]);
    }

    #[tokio::test]
    async fn test_same_session_turns_serialize() {
        let engine = Arc::new(demo());
        let a = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.process_turn("s1", "Any AI courses?").await })
        };
        let b = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.process_turn("s1", END_TO_END).await })
        };
        a.await.unwrap();
        b.await.unwrap();
        let context = engine.contexts().get("s1").await.unwrap();
        assert_eq!(context.turn_count, 2);
    }

    #[tokio::test]
    async fn test_unavailable_context_still_answers() {
        let engine = Engine::demo(EngineConfig {
            context: ContextConfig {
                lock_timeout: Duration::from_millis(20),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();

        let held = engine.contexts().acquire("s1").await.unwrap();
        let response = engine.process_turn("s1", "Any AI courses?").await;
        assert_eq!(response.status, ResponseStatus::Complete);
        drop(held);

        // the turn did not write back
        let context = engine.contexts().get("s1").await.unwrap();
        assert_eq!(context.turn_count, 0);
    }

    #[tokio::test]
    async fn test_lexicon_swap_applies_to_next_turn() {
        let engine = demo();
        assert_eq!(
            engine.explain("s1", "any robotics courses?").await.entities.len(),
            0
        );

        let mut lexicon = Lexicon::builtin();
        if let Some(table) = lexicon.slots.iter_mut().find(|t| t.slot == SlotKind::Subject) {
            table.values.push(crate::lexicon::SlotValue {
                value: "robotics".into(),
                phrases: vec!["robotics".into()],
            });
        }
        engine.lexicon().replace(lexicon).unwrap();

        let understanding = engine.explain("s1", "any robotics courses?").await;
        assert_eq!(understanding.entities[0].value, "robotics");
    }

    #[test]
    fn test_build_rejects_ambiguous_table() {
        let mut capabilities = demo_capabilities();
        capabilities.push(Capability::new("profile", IntentKind::SearchLibrary, &[], 0));
        let result = EngineBuilder::new()
            .registry(demo_registry())
            .capabilities(capabilities)
            .build();
        assert!(matches!(result, Err(ConfigError::AmbiguousRouting { .. })));
    }

    #[test]
    fn test_build_rejects_unknown_responder() {
        let result = EngineBuilder::new()
            .registry(demo_registry())
            .capability(Capability::new("ghost", IntentKind::FindCourse, &[], 0))
            .build();
        assert!(matches!(result, Err(ConfigError::UnknownResponder(id)) if id == "ghost"));
    }

    #[test]
    fn test_build_rejects_out_of_range_classifier() {
        let result = Engine::demo(EngineConfig {
            classifier: ClassifierConfig {
                trigger_saturation: 0.0,
                ..Default::default()
            },
            ..Default::default()
        });
        assert!(matches!(result, Err(ConfigError::InvalidSetting(msg)) if msg.contains("trigger_saturation")));
    }

    #[test]
    fn test_build_rejects_malformed_lexicon() {
        let mut lexicon = Lexicon::builtin();
        lexicon.intents[0].triggers.clear();
        let result = EngineBuilder::new()
            .lexicon(lexicon)
            .registry(demo_registry())
            .capabilities(demo_capabilities())
            .build();
        assert!(matches!(result, Err(ConfigError::MalformedLexicon(_))));
    }
}
