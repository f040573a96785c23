//! Shared types for saraa-core

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix marking a negated slot value, e.g. `not-morning`
pub const NEGATION_PREFIX: &str = "not-";

/// A single user request, immutable once built
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub session_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Query {
    pub fn new(session_id: &str, text: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Kind of slot an entity fills. Closed set; new vocabulary goes into the lexicon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlotKind {
    Subject,
    CourseType,
    TimeConstraint,
    Title,
    Author,
    Category,
    DateRange,
}

impl SlotKind {
    /// All slot kinds in declaration order
    pub const ALL: [SlotKind; 7] = [
        Self::Subject,
        Self::CourseType,
        Self::TimeConstraint,
        Self::Title,
        Self::Author,
        Self::Category,
        Self::DateRange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::CourseType => "course-type",
            Self::TimeConstraint => "time-constraint",
            Self::Title => "title",
            Self::Author => "author",
            Self::Category => "category",
            Self::DateRange => "date-range",
        }
    }
}

impl std::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Byte range of a match within the original query text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A typed fragment of meaning extracted from text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub slot: SlotKind,
    pub value: String,
    /// `None` when the entity was carried forward from an earlier turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Entity {
    pub fn new(slot: SlotKind, value: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            slot,
            value: value.into(),
            span,
        }
    }

    pub fn is_negated(&self) -> bool {
        self.value.starts_with(NEGATION_PREFIX)
    }

    /// The value without its negation prefix
    pub fn base_value(&self) -> &str {
        self.value
            .strip_prefix(NEGATION_PREFIX)
            .unwrap_or(&self.value)
    }

    pub fn is_carried(&self) -> bool {
        self.span.is_none()
    }
}

/// Classified purpose of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    FindCourse,
    SearchLibrary,
    FindEvents,
    ProfileQuery,
    /// Metadata tag for a classification with two or more intents; never dispatched
    MultiIntent,
    Unrecognized,
}

impl IntentKind {
    /// Intents that can be detected from triggers, in declaration order
    pub const DETECTABLE: [IntentKind; 4] = [
        Self::FindCourse,
        Self::SearchLibrary,
        Self::FindEvents,
        Self::ProfileQuery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FindCourse => "find_course",
            Self::SearchLibrary => "search_library",
            Self::FindEvents => "find_events",
            Self::ProfileQuery => "profile_query",
            Self::MultiIntent => "multi_intent",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// Whether a responder may claim this intent
    pub fn is_dispatchable(&self) -> bool {
        !matches!(self, Self::MultiIntent)
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A detected intent with its confidence and the entities relevant to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub confidence: f64,
    pub entities: Vec<Entity>,
}

impl Intent {
    pub fn has_slot(&self, slot: SlotKind) -> bool {
        self.entities.iter().any(|e| e.slot == slot)
    }
}

/// Output of the intent classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// `MultiIntent` when two or more intents cleared the threshold,
    /// otherwise the kind of the single intent (possibly `Unrecognized`)
    pub tag: IntentKind,
    /// Ordered by descending confidence, ties by declaration order
    pub intents: Vec<Intent>,
    /// Raw query text, kept for fallback responders
    pub text: String,
}

impl Classification {
    pub fn is_multi_intent(&self) -> bool {
        self.tag == IntentKind::MultiIntent
    }

    pub fn is_unrecognized(&self) -> bool {
        self.tag == IntentKind::Unrecognized
    }

    pub fn kinds(&self) -> Vec<IntentKind> {
        self.intents.iter().map(|i| i.kind).collect()
    }
}

/// What a responder can do, registered at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub responder_id: String,
    pub intent: IntentKind,
    #[serde(default)]
    pub required_slots: Vec<SlotKind>,
    /// Lower value wins when several responders claim the same intent
    #[serde(default)]
    pub priority: u32,
}

impl Capability {
    pub fn new(responder_id: &str, intent: IntentKind, required_slots: &[SlotKind], priority: u32) -> Self {
        Self {
            responder_id: responder_id.to_string(),
            intent,
            required_slots: required_slots.to_vec(),
            priority,
        }
    }
}

/// One (intent, responder) pair of a routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub intent: Intent,
    pub responder_id: String,
    pub required_slots: Vec<SlotKind>,
}

/// Ordered dispatch plan for one query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub entries: Vec<RouteEntry>,
    /// Detected intents that no responder claims
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unrouted: Vec<IntentKind>,
}

impl RoutingDecision {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn pairs(&self) -> Vec<(IntentKind, &str)> {
        self.entries
            .iter()
            .map(|e| (e.intent.kind, e.responder_id.as_str()))
            .collect()
    }
}

/// Why a responder invocation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ResponderError,
    InvalidEntities,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::ResponderError => write!(f, "responder_error"),
            Self::InvalidEntities => write!(f, "invalid_entities"),
        }
    }
}

/// Payload or failure of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponderOutcome {
    Success { payload: String },
    /// `reason` is internal detail for logs, never shown to the user
    Failure { kind: FailureKind, reason: String },
}

/// Result of dispatching one routing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponderResult {
    pub responder_id: String,
    pub intent: IntentKind,
    pub outcome: ResponderOutcome,
    pub latency: Duration,
}

impl ResponderResult {
    pub fn success(responder_id: &str, intent: IntentKind, payload: String, latency: Duration) -> Self {
        Self {
            responder_id: responder_id.to_string(),
            intent,
            outcome: ResponderOutcome::Success { payload },
            latency,
        }
    }

    pub fn failure(
        responder_id: &str,
        intent: IntentKind,
        kind: FailureKind,
        reason: impl Into<String>,
        latency: Duration,
    ) -> Self {
        Self {
            responder_id: responder_id.to_string(),
            intent,
            outcome: ResponderOutcome::Failure {
                kind,
                reason: reason.into(),
            },
            latency,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ResponderOutcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            ResponderOutcome::Failure { kind, .. } => Some(*kind),
            ResponderOutcome::Success { .. } => None,
        }
    }
}

/// Top-level status of a synthesized reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Complete,
    Partial,
    Empty,
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Partial => write!(f, "partial"),
            Self::Empty => write!(f, "empty"),
        }
    }
}

/// One section of the reply, produced from one responder result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFragment {
    pub intent: IntentKind,
    pub responder_id: String,
    pub heading: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

/// The merged reply for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedResponse {
    pub status: ResponseStatus,
    pub fragments: Vec<ResponseFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification: Option<String>,
}
