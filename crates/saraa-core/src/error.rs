//! Error types for saraa-core
//!
//! Configuration errors halt startup. Responder and context errors never
//! leave a turn: the dispatcher and engine turn them into data.

use thiserror::Error;

use crate::types::IntentKind;

/// Startup-time configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two responders claim the same intent at the same priority
    #[error(
        "ambiguous routing: responders '{first}' and '{second}' both claim {intent} at priority {priority}"
    )]
    AmbiguousRouting {
        intent: IntentKind,
        priority: u32,
        first: String,
        second: String,
    },

    #[error("invalid capability for responder '{responder}': {reason}")]
    InvalidCapability { responder: String, reason: String },

    /// A capability names a responder that is not registered
    #[error("capability refers to unknown responder '{0}'")]
    UnknownResponder(String),

    #[error("malformed lexicon: {0}")]
    MalformedLexicon(String),

    /// A tuning value is out of range
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

/// Error returned by a responder's `handle`
#[derive(Debug, Error)]
pub enum ResponderError {
    /// The request lacks entities the responder needs
    #[error("invalid entities: {0}")]
    InvalidEntities(String),

    #[error("{0}")]
    Failed(String),
}

impl From<anyhow::Error> for ResponderError {
    fn from(e: anyhow::Error) -> Self {
        Self::Failed(format!("{:#}", e))
    }
}

/// Conversation context could not be reached for a turn
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("context unavailable for session '{session_id}': {reason}")]
    Unavailable { session_id: String, reason: String },
}
