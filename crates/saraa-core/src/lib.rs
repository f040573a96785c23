//! saraa-core: query understanding and multi-responder dispatch
//!
//! A user turn flows through entity extraction, intent classification,
//! capability routing, concurrent dispatch to responders and response
//! synthesis, with per-session conversation context carried between turns.

pub mod classifier;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod lexicon;
pub mod responders;
pub mod router;
pub mod synthesizer;
pub mod types;

pub use classifier::{ClassifierConfig, IntentClassifier};
pub use context::{ContextConfig, ContextStore, ConversationContext, SessionGuard, TurnRecord};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use engine::{Engine, EngineBuilder, EngineConfig, Understanding};
pub use error::{ConfigError, ContextError, ResponderError};
pub use extractor::extract;
pub use lexicon::{Lexicon, LexiconHandle, spawn_watcher};
pub use responders::{
    Preferences, ProfileResponder, Responder, ResponderRegistry, ResponderRequest, StudentProfile,
    demo_capabilities, demo_registry,
};
pub use router::Router;
pub use synthesizer::synthesize;
pub use types::*;
