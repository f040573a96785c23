//! Response synthesis: merges responder results into one reply
//!
//! Fragments keep the dispatcher's order. Failures become user-facing
//! notes; internal reasons stay in the logs.

use tracing::debug;

use crate::context::ConversationContext;
use crate::types::{
    FailureKind, IntentKind, ResponderOutcome, ResponderResult, ResponseFragment, ResponseStatus,
    SynthesizedResponse,
};

const LEAD: &str = "Here's what I found:";
const CLOSING: &str = "Is there anything specific you'd like me to elaborate on?";

pub fn heading(intent: IntentKind) -> &'static str {
    match intent {
        IntentKind::FindCourse => "Course Information",
        IntentKind::SearchLibrary => "Library Resources",
        IntentKind::FindEvents => "Campus Events",
        IntentKind::ProfileQuery => "Your Profile",
        IntentKind::MultiIntent | IntentKind::Unrecognized => "Assistant",
    }
}

/// How a topic is named in user-facing text
pub fn topic_name(kind: IntentKind) -> &'static str {
    match kind {
        IntentKind::FindCourse => "courses",
        IntentKind::SearchLibrary => "the library",
        IntentKind::FindEvents => "campus events",
        IntentKind::ProfileQuery => "your profile",
        IntentKind::MultiIntent | IntentKind::Unrecognized => "your last question",
    }
}

/// What to tell the user when a responder failed
fn failure_message(intent: IntentKind, kind: FailureKind) -> String {
    match kind {
        FailureKind::Timeout => format!(
            "Information about {} is taking too long right now. Please try again in a moment.",
            topic_name(intent)
        ),
        FailureKind::ResponderError => format!(
            "I couldn't get information about {} right now.",
            topic_name(intent)
        ),
        FailureKind::InvalidEntities => match intent {
            IntentKind::FindCourse => {
                "Which subject are you interested in? For example: \"AI courses\" or \"mathematics classes\"."
                    .to_string()
            }
            IntentKind::SearchLibrary => {
                "Which book are you looking for? A title, author or topic helps.".to_string()
            }
            IntentKind::FindEvents => {
                "What kind of event are you looking for? For example: career, workshop or sports.".to_string()
            }
            _ => "Could you give me a bit more detail?".to_string(),
        },
    }
}

fn clarification(context: &ConversationContext) -> String {
    match context.last_topic() {
        Some(topic) => format!(
            "I'm not sure what you'd like to know. Are you still asking about {}? \
             I can help with courses, library resources, campus events and your profile.",
            topic_name(topic)
        ),
        None => "I'm not sure what you'd like to know. I can help with courses, library \
                 resources, campus events and your profile. Could you rephrase your question?"
            .to_string(),
    }
}

/// Merge dispatch results into a reply.
///
/// `complete` when every result succeeded, `partial` when some did, `empty`
/// when none did or there was nothing to dispatch.
pub fn synthesize(results: &[ResponderResult], context: &ConversationContext) -> SynthesizedResponse {
    let fragments: Vec<ResponseFragment> = results
        .iter()
        .map(|result| match &result.outcome {
            ResponderOutcome::Success { payload } => ResponseFragment {
                intent: result.intent,
                responder_id: result.responder_id.clone(),
                heading: heading(result.intent).to_string(),
                body: payload.clone(),
                failure: None,
            },
            ResponderOutcome::Failure { kind, .. } => ResponseFragment {
                intent: result.intent,
                responder_id: result.responder_id.clone(),
                heading: heading(result.intent).to_string(),
                body: failure_message(result.intent, *kind),
                failure: Some(*kind),
            },
        })
        .collect();

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let status = if succeeded == 0 {
        ResponseStatus::Empty
    } else if succeeded == results.len() {
        ResponseStatus::Complete
    } else {
        ResponseStatus::Partial
    };

    let clarification = (status == ResponseStatus::Empty).then(|| clarification(context));

    debug!(
        "Synthesized {} fragment(s), status {}",
        fragments.len(),
        status
    );

    SynthesizedResponse {
        status,
        fragments,
        clarification,
    }
}

impl SynthesizedResponse {
    /// Plain-text rendering for a chat surface
    pub fn render(&self) -> String {
        let mut out = match self.fragments.as_slice() {
            [] => String::new(),
            [only] => only.body.clone(),
            many => {
                let mut out = String::from(LEAD);
                for fragment in many {
                    out.push_str(&format!("\n\n**{}:**\n{}", fragment.heading, fragment.body));
                }
                out.push_str("\n\n");
                out.push_str(CLOSING);
                out
            }
        };

        if let Some(clarification) = &self.clarification {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(clarification);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::{Classification, Intent, Query};

    fn ok(id: &str, intent: IntentKind, body: &str) -> ResponderResult {
        ResponderResult::success(id, intent, body.to_string(), Duration::from_millis(5))
    }

    fn failed(id: &str, intent: IntentKind, kind: FailureKind) -> ResponderResult {
        ResponderResult::failure(id, intent, kind, "connection refused at 10.0.0.7:5432", Duration::ZERO)
    }

    fn fresh() -> ConversationContext {
        ConversationContext::new("s", 5)
    }

    #[test]
    fn test_all_success_is_complete() {
        let results = vec![
            ok("library", IntentKind::SearchLibrary, "books"),
            ok("events", IntentKind::FindEvents, "events"),
        ];
        let response = synthesize(&results, &fresh());
        assert_eq!(response.status, ResponseStatus::Complete);
        let headings: Vec<&str> = response.fragments.iter().map(|f| f.heading.as_str()).collect();
        assert_eq!(headings, vec!["Library Resources", "Campus Events"]);
        assert!(response.clarification.is_none());
    }

    #[test]
    fn test_some_failed_is_partial_without_leaking_reason() {
        let results = vec![
            failed("library", IntentKind::SearchLibrary, FailureKind::Timeout),
            ok("events", IntentKind::FindEvents, "events"),
        ];
        let response = synthesize(&results, &fresh());
        assert_eq!(response.status, ResponseStatus::Partial);
        assert_eq!(response.fragments.len(), 2);
        assert_eq!(response.fragments[0].failure, Some(FailureKind::Timeout));
        assert!(response.fragments[0].body.contains("taking too long"));
        assert!(!response.render().contains("10.0.0.7"));
    }

    #[test]
    fn test_all_failed_is_empty_with_clarification() {
        let results = vec![failed("course-advisor", IntentKind::FindCourse, FailureKind::InvalidEntities)];
        let response = synthesize(&results, &fresh());
        assert_eq!(response.status, ResponseStatus::Empty);
        assert!(response.fragments[0].body.contains("Which subject"));
        assert!(response.clarification.is_some());
    }

    #[test]
    fn test_empty_decision_mentions_last_topic() {
        let mut context = fresh();
        let classification = Classification {
            tag: IntentKind::FindEvents,
            intents: vec![Intent {
                kind: IntentKind::FindEvents,
                confidence: 0.6,
                entities: vec![],
            }],
            text: "events".into(),
        };
        context.record_turn(&Query::new("s", "events"), &classification, &[], &[]);

        let response = synthesize(&[], &context);
        assert_eq!(response.status, ResponseStatus::Empty);
        assert!(response.fragments.is_empty());
        let text = response.render();
        assert!(text.contains("still asking about campus events"), "{}", text);
    }

    #[test]
    fn test_render_single_fragment_is_body() {
        let response = synthesize(&[ok("library", IntentKind::SearchLibrary, "Clean Code")], &fresh());
        assert_eq!(response.render(), "Clean Code");
    }

    #[test]
    fn test_render_multiple_fragments_in_order() {
        let results = vec![
            ok("library", IntentKind::SearchLibrary, "books"),
            ok("events", IntentKind::FindEvents, "events"),
        ];
        let text = synthesize(&results, &fresh()).render();
        assert!(text.starts_with(LEAD));
        assert!(text.ends_with(CLOSING));
        let library = text.find("**Library Resources:**").unwrap();
        let events = text.find("**Campus Events:**").unwrap();
        assert!(library < events);
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let results = vec![
            ok("events", IntentKind::FindEvents, "events"),
            failed("library", IntentKind::SearchLibrary, FailureKind::ResponderError),
        ];
        assert_eq!(synthesize(&results, &fresh()), synthesize(&results, &fresh()));
    }
}
