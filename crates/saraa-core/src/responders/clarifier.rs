//! Fallback for queries no capability understood

use async_trait::async_trait;

use super::{Responder, ResponderRequest};
use crate::error::ResponderError;
use crate::synthesizer::topic_name;
use crate::types::IntentKind;

pub const ID: &str = "clarifier";

const HELP: &str = "I can help you with:\n\
- Finding courses (e.g. \"AI electives with no morning classes\")\n\
- Searching the library (e.g. \"Is Clean Code in the library?\")\n\
- Campus events (e.g. \"What workshops are on this week?\")\n\
- Your profile and recommendations (e.g. \"Recommend something for my interests\")";

pub struct ClarifierResponder;

#[async_trait]
impl Responder for ClarifierResponder {
    fn id(&self) -> &str {
        ID
    }

    async fn handle(&self, request: &ResponderRequest) -> Result<String, ResponderError> {
        let text = request.query.text.trim();
        let mut out = if text.is_empty() {
            "I didn't catch a question there.".to_string()
        } else {
            format!("I'm not sure how to help with \"{}\".", text)
        };

        let follow_up = request
            .context
            .last_topic()
            .filter(|kind| *kind != IntentKind::Unrecognized);
        if let Some(topic) = follow_up {
            out.push_str(&format!(
                " Were you asking a follow-up about {}?",
                topic_name(topic)
            ));
        }
        out.push_str("\n\n");
        out.push_str(HELP);
        Ok(out)
    }
}
