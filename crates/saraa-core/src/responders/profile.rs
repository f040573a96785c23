//! In-memory student profiles with interest-based recommendations

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Preferences, Responder, ResponderRequest, courses, events};
use crate::error::ResponderError;
use crate::types::SlotKind;

pub const ID: &str = "profile";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub name: String,
    pub major: String,
    #[serde(default)]
    pub minor: Option<String>,
    pub year: u8,
    #[serde(default)]
    pub gpa: Option<f32>,
    #[serde(default)]
    pub completed_courses: Vec<String>,
    #[serde(default)]
    pub current_courses: Vec<String>,
    /// Canonical subject or category values
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub career_goals: Vec<String>,
}

impl StudentProfile {
    /// Profile shown to sessions that have none of their own
    pub fn demo() -> Self {
        Self {
            name: "Alex Johnson".to_string(),
            major: "Computer Science".to_string(),
            minor: Some("Mathematics".to_string()),
            year: 3,
            gpa: Some(3.7),
            completed_courses: vec!["CS101".into(), "CS201".into(), "MATH201".into()],
            current_courses: vec!["CS301".into(), "CS350".into()],
            interests: vec!["AI".into(), "machine-learning".into(), "programming".into()],
            career_goals: vec!["software engineer".into(), "research scientist".into()],
        }
    }

    fn has_taken(&self, course_id: &str) -> bool {
        self.completed_courses.iter().any(|c| c == course_id)
            || self.current_courses.iter().any(|c| c == course_id)
    }
}

/// Courses and events suggested for a set of interests
#[derive(Debug, Default, PartialEq)]
pub struct Recommendations {
    pub courses: Vec<&'static str>,
    pub events: Vec<&'static str>,
}

/// Courses not yet taken that cover an interest, plus matching events
pub fn recommend(profile: &StudentProfile, interests: &[&str]) -> Recommendations {
    let courses = courses::catalog()
        .iter()
        .filter(|c| !profile.has_taken(c.id))
        .filter(|c| {
            interests
                .iter()
                .any(|i| c.subjects.iter().any(|s| s.eq_ignore_ascii_case(i)))
        })
        .map(|c| c.id)
        .collect();
    let events = if interests.is_empty() {
        Vec::new()
    } else {
        let window = events::DateWindow::upcoming(events::demo_today());
        events::search(events::events(), &Preferences::new(interests, &[]), &window)
            .into_iter()
            .map(|e| e.id)
            .collect()
    };
    Recommendations { courses, events }
}

pub struct ProfileResponder {
    profiles: RwLock<HashMap<String, StudentProfile>>,
}

impl ProfileResponder {
    pub fn new() -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
        }
    }

    /// Store a profile for a session
    pub async fn set_profile(&self, session_id: &str, profile: StudentProfile) {
        info!("Profile set for session '{}'", session_id);
        self.profiles
            .write()
            .await
            .insert(session_id.to_string(), profile);
    }

    /// Append interests, skipping ones already present. Returns those added.
    pub async fn add_interests(&self, session_id: &str, interests: &[&str]) -> Vec<String> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .entry(session_id.to_string())
            .or_insert_with(StudentProfile::demo);
        let mut added = Vec::new();
        for interest in interests {
            if !profile.interests.iter().any(|i| i.eq_ignore_ascii_case(interest)) {
                profile.interests.push(interest.to_string());
                added.push(interest.to_string());
            }
        }
        if !added.is_empty() {
            debug!("Session '{}' interests += {:?}", session_id, added);
        }
        added
    }

    pub async fn profile_for(&self, session_id: &str) -> StudentProfile {
        self.profiles
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_else(StudentProfile::demo)
    }
}

impl Default for ProfileResponder {
    fn default() -> Self {
        Self::new()
    }
}

fn render(profile: &StudentProfile, recs: &Recommendations) -> String {
    let mut out = format!("**Profile for {}**\n\n", profile.name);
    out.push_str(&format!("- Major: {}", profile.major));
    if let Some(minor) = &profile.minor {
        out.push_str(&format!(" (minor: {})", minor));
    }
    out.push_str(&format!("\n- Year: {}", profile.year));
    if let Some(gpa) = profile.gpa {
        out.push_str(&format!(", GPA: {:.1}", gpa));
    }
    out.push('\n');
    if !profile.completed_courses.is_empty() {
        out.push_str(&format!("- Completed: {}\n", profile.completed_courses.join(", ")));
    }
    if !profile.current_courses.is_empty() {
        out.push_str(&format!("- Current: {}\n", profile.current_courses.join(", ")));
    }
    if !profile.interests.is_empty() {
        out.push_str(&format!("- Interests: {}\n", profile.interests.join(", ")));
    }
    if !profile.career_goals.is_empty() {
        out.push_str(&format!("- Career goals: {}\n", profile.career_goals.join(", ")));
    }

    if !recs.courses.is_empty() {
        out.push_str(&format!("\nRecommended courses: {}\n", recs.courses.join(", ")));
    }
    if !recs.events.is_empty() {
        out.push_str(&format!("Events you might like: {}\n", recs.events.join(", ")));
    }
    out.trim_end().to_string()
}

#[async_trait]
impl Responder for ProfileResponder {
    fn id(&self) -> &str {
        ID
    }

    async fn handle(&self, request: &ResponderRequest) -> Result<String, ResponderError> {
        let session_id = &request.query.session_id;

        // topics named in this turn become interests; carried ones do not
        let named: Vec<&str> = request
            .intent
            .entities
            .iter()
            .filter(|e| matches!(e.slot, SlotKind::Subject | SlotKind::Category))
            .filter(|e| !e.is_negated() && !e.is_carried())
            .map(|e| e.base_value())
            .collect();
        let added = if named.is_empty() {
            Vec::new()
        } else {
            self.add_interests(session_id, &named).await
        };
        let profile = self.profile_for(session_id).await;

        // topics named in the query take precedence over stored interests
        let mut asked: Vec<&str> = Vec::new();
        let subjects = request.preferences(SlotKind::Subject).wanted;
        for topic in subjects.into_iter().chain(request.preferences(SlotKind::Category).wanted) {
            if !asked.iter().any(|a| a.eq_ignore_ascii_case(topic)) {
                asked.push(topic);
            }
        }
        let interests: Vec<&str> = if asked.is_empty() {
            profile.interests.iter().map(String::as_str).collect()
        } else {
            asked
        };

        let recs = recommend(&profile, &interests);
        debug!(
            "Profile recommendations for {:?}: {} course(s), {} event(s)",
            interests,
            recs.courses.len(),
            recs.events.len()
        );
        let mut out = render(&profile, &recs);
        if !added.is_empty() {
            out.push_str(&format!("\n\nAdded to your interests: {}", added.join(", ")));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responders::testing::request;
    use crate::types::IntentKind;

    #[test]
    fn test_recommend_skips_taken_courses() {
        let profile = StudentProfile::demo();
        let recs = recommend(&profile, &["AI", "machine-learning"]);
        assert_eq!(recs.courses, vec!["CS305", "CS401", "CS510", "STAT301"]);
        assert_eq!(recs.events, vec!["EVT002", "EVT007"]);
    }

    #[test]
    fn test_recommend_without_interests_is_empty() {
        let recs = recommend(&StudentProfile::demo(), &[]);
        assert_eq!(recs, Recommendations::default());
    }

    #[tokio::test]
    async fn test_unknown_session_gets_demo_profile() {
        let responder = ProfileResponder::new();
        assert_eq!(responder.profile_for("anyone").await, StudentProfile::demo());
    }

    #[tokio::test]
    async fn test_add_interests_dedupes() {
        let responder = ProfileResponder::new();
        assert_eq!(responder.add_interests("s1", &["physics", "ai"]).await, vec!["physics"]);
        let profile = responder.profile_for("s1").await;
        assert!(profile.interests.contains(&"physics".to_string()));
        // other sessions are untouched
        assert!(!responder.profile_for("s2").await.interests.contains(&"physics".to_string()));
    }

    #[tokio::test]
    async fn test_handle_uses_query_topics() {
        let responder = ProfileResponder::new();
        let req = request(
            IntentKind::ProfileQuery,
            "recommend physics courses for my profile",
            &[(SlotKind::Subject, "physics")],
        );
        let out = responder.handle(&req).await.unwrap();
        assert!(out.starts_with("**Profile for Alex Johnson**"));
        assert!(out.contains("Recommended courses: PHYS101"));
        assert!(!out.contains("Events you might like"));
        assert!(out.ends_with("Added to your interests: physics"));
    }

    #[tokio::test]
    async fn test_handle_records_named_topics() {
        let responder = ProfileResponder::new();
        let req = request(
            IntentKind::ProfileQuery,
            "recommend physics courses but no sports for my profile",
            &[(SlotKind::Subject, "physics"), (SlotKind::Category, "not-sports")],
        );
        responder.handle(&req).await.unwrap();

        let interests = responder.profile_for("test").await.interests;
        assert!(interests.contains(&"physics".to_string()));
        assert!(!interests.iter().any(|i| i.contains("sports")));

        // naming it again adds nothing
        let out = responder.handle(&req).await.unwrap();
        assert!(!out.contains("Added to your interests"));
        assert!(out.contains("- Interests: AI, machine-learning, programming, physics\n"));
    }

    #[tokio::test]
    async fn test_carried_topics_are_not_recorded() {
        let responder = ProfileResponder::new();
        let mut req = request(IntentKind::ProfileQuery, "and for my profile?", &[]);
        req.intent.entities.push(crate::types::Entity::new(SlotKind::Subject, "physics", None));
        let out = responder.handle(&req).await.unwrap();
        assert!(!out.contains("Added to your interests"));
        assert_eq!(responder.profile_for("test").await, StudentProfile::demo());
    }

    #[tokio::test]
    async fn test_handle_uses_stored_profile() {
        let responder = ProfileResponder::new();
        responder
            .set_profile(
                "test",
                StudentProfile {
                    name: "Sam Rivera".into(),
                    major: "Biology".into(),
                    minor: None,
                    year: 2,
                    gpa: None,
                    completed_courses: vec![],
                    current_courses: vec![],
                    interests: vec!["biology".into()],
                    career_goals: vec![],
                },
            )
            .await;
        let req = request(IntentKind::ProfileQuery, "show my profile", &[]);
        let out = responder.handle(&req).await.unwrap();
        assert!(out.contains("Sam Rivera"));
        assert!(out.contains("- Major: Biology\n- Year: 2\n"));
    }
}
