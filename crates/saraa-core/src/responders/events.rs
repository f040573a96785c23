//! Campus events listing

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use tracing::{debug, warn};

use super::{Preferences, Responder, ResponderRequest};
use crate::error::ResponderError;
use crate::types::SlotKind;

pub const ID: &str = "events";

const MAX_LISTED: usize = 5;

/// Days ahead covered when no date range is given
const UPCOMING_DAYS: i64 = 30;

#[derive(Debug, Clone)]
pub struct Event {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    /// Canonical category value from the lexicon
    pub category: &'static str,
    /// ISO date
    pub date: &'static str,
    pub start: &'static str,
    pub end: &'static str,
    pub location: &'static str,
    pub registration: Option<&'static str>,
    pub cost: &'static str,
    pub tags: &'static [&'static str],
}

impl Event {
    /// Category or tag match, ignoring case and `-`/space differences
    pub fn is_about(&self, value: &str) -> bool {
        let wanted = value.replace('-', " ");
        self.category.eq_ignore_ascii_case(&wanted)
            || self.tags.iter().any(|t| t.eq_ignore_ascii_case(&wanted))
    }

    pub fn day(&self) -> Option<NaiveDate> {
        self.date.parse().ok()
    }
}

static EVENTS: &[Event] = &[
    Event {
        id: "EVT001",
        title: "Fall Semester Career Fair",
        description: "Meet top employers and explore internship and job opportunities across all majors.",
        category: "career",
        date: "2025-10-15",
        start: "10:00",
        end: "16:00",
        location: "Student Union Ballroom",
        registration: Some("https://university.edu/careerfair-registration"),
        cost: "Free",
        tags: &["career", "networking", "jobs", "internships"],
    },
    Event {
        id: "EVT002",
        title: "Guest Lecture: AI in Healthcare",
        description: "Latest developments in medical AI applications.",
        category: "academic",
        date: "2025-10-18",
        start: "14:00",
        end: "15:30",
        location: "Engineering Auditorium, Room 101",
        registration: None,
        cost: "Free",
        tags: &["ai", "healthcare", "machine learning", "research"],
    },
    Event {
        id: "EVT003",
        title: "Varsity Soccer Match vs. State University",
        description: "Support the Wildcats in this conference match.",
        category: "sports",
        date: "2025-10-20",
        start: "19:00",
        end: "21:00",
        location: "University Stadium",
        registration: None,
        cost: "$5 students, $10 general",
        tags: &["soccer", "sports", "wildcats"],
    },
    Event {
        id: "EVT004",
        title: "Programming Workshop: Introduction to Python",
        description: "Hands-on Python basics for beginners.",
        category: "workshop",
        date: "2025-10-12",
        start: "18:00",
        end: "20:00",
        location: "Science Building, Room 204",
        registration: Some("https://university.edu/python-workshop"),
        cost: "Free",
        tags: &["programming", "python", "coding", "beginners"],
    },
    Event {
        id: "EVT005",
        title: "International Food Festival",
        description: "Cuisines from around the world by international student organizations.",
        category: "cultural",
        date: "2025-10-25",
        start: "17:00",
        end: "21:00",
        location: "University Plaza",
        registration: None,
        cost: "$3-8 per dish",
        tags: &["food", "international", "festival"],
    },
    Event {
        id: "EVT006",
        title: "Chess Club Weekly Meeting",
        description: "All skill levels welcome.",
        category: "club",
        date: "2025-10-08",
        start: "19:00",
        end: "21:00",
        location: "Student Center Room 305",
        registration: None,
        cost: "Free",
        tags: &["chess", "games", "strategy"],
    },
    Event {
        id: "EVT007",
        title: "Machine Learning Research Symposium",
        description: "Graduate students and faculty present current ML research.",
        category: "conference",
        date: "2025-11-08",
        start: "09:00",
        end: "17:00",
        location: "Conference Center",
        registration: Some("https://university.edu/ml-symposium"),
        cost: "Free for students, $50 professionals",
        tags: &["machine learning", "research", "symposium", "ai"],
    },
];

pub fn events() -> &'static [Event] {
    EVENTS
}

/// Reference date of the demo calendar
pub fn demo_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 10).unwrap_or_default()
}

/// Inclusive span of days an event must fall in; `to: None` is open-ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: Option<NaiveDate>,
}

impl DateWindow {
    pub fn upcoming(today: NaiveDate) -> Self {
        Self {
            from: today,
            to: Some(today + Duration::days(UPCOMING_DAYS)),
        }
    }

    /// Window for a canonical date-range value, relative to `today`.
    /// Unknown values fall back to the upcoming window.
    pub fn resolve(range: Option<&str>, today: NaiveDate) -> Self {
        let weekday = today.weekday().num_days_from_monday() as i64;
        let sunday = today + Duration::days(6 - weekday);
        let span = |from: NaiveDate, to: NaiveDate| Self { from, to: Some(to) };
        match range {
            None | Some("upcoming") => Self::upcoming(today),
            Some("today") => span(today, today),
            Some("tomorrow") => {
                let tomorrow = today + Duration::days(1);
                span(tomorrow, tomorrow)
            }
            Some("this-week") => span(today, sunday),
            Some("next-week") => span(sunday + Duration::days(1), sunday + Duration::days(7)),
            Some("this-weekend") => {
                let saturday = sunday - Duration::days(1);
                span(today.max(saturday), sunday)
            }
            Some("this-month") => {
                let (year, month) = match today.month() {
                    12 => (today.year() + 1, 1),
                    m => (today.year(), m + 1),
                };
                let last = NaiveDate::from_ymd_opt(year, month, 1)
                    .and_then(|d| d.pred_opt())
                    .unwrap_or(today);
                span(today, last)
            }
            Some("next-semester") => {
                let start = match today.month() {
                    1..=7 => NaiveDate::from_ymd_opt(today.year(), 8, 1),
                    _ => NaiveDate::from_ymd_opt(today.year() + 1, 1, 1),
                };
                Self {
                    from: start.unwrap_or(today),
                    to: None,
                }
            }
            Some(other) => {
                warn!("Unknown date range '{}', showing upcoming events", other);
                Self::upcoming(today)
            }
        }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.from && self.to.is_none_or(|to| day <= to)
    }
}

/// Events in `window` matching any wanted topic and no avoided one, by date.
/// With no wanted topics every event not avoided is listed.
pub fn search<'a>(
    events: &'a [Event],
    topics: &Preferences<'_>,
    window: &DateWindow,
) -> Vec<&'a Event> {
    let mut found: Vec<&Event> = events
        .iter()
        .filter(|e| e.day().is_some_and(|d| window.contains(d)))
        .filter(|e| topics.wanted.is_empty() || topics.wanted.iter().any(|t| e.is_about(t)))
        .filter(|e| !topics.avoided.iter().any(|t| e.is_about(t)))
        .collect();
    found.sort_by_key(|e| (e.date, e.start));
    found
}

/// Category preferences plus subjects as extra wanted topics.
/// A subject whose category is negated stays out.
fn topics(request: &ResponderRequest) -> Preferences<'_> {
    let mut topics = request.preferences(SlotKind::Category);
    for subject in request.preferences(SlotKind::Subject).wanted {
        let known = topics.wanted.iter().any(|t| t.eq_ignore_ascii_case(subject));
        if !known && !topics.is_avoided(subject) {
            topics.wanted.push(subject);
        }
    }
    topics
}

pub struct EventsResponder {
    events: &'static [Event],
    today: NaiveDate,
}

impl EventsResponder {
    pub fn new() -> Self {
        Self {
            events: events(),
            today: demo_today(),
        }
    }

    /// Resolve date ranges against `today` instead of the demo date
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }
}

impl Default for EventsResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for EventsResponder {
    fn id(&self) -> &str {
        ID
    }

    async fn handle(&self, request: &ResponderRequest) -> Result<String, ResponderError> {
        let topics = topics(request);
        let range = request.values(SlotKind::DateRange).first().copied();
        let window = DateWindow::resolve(range, self.today);

        let found = search(self.events, &topics, &window);
        debug!(
            "Event search {:?} in {:?}: {} match(es)",
            topics,
            window,
            found.len()
        );
        if found.is_empty() {
            return Ok("No upcoming events match that right now.".to_string());
        }

        let mut out = format!("Upcoming events ({}):\n", found.len());
        for event in found.iter().take(MAX_LISTED) {
            out.push_str(&format!(
                "\n**{}**\n- {}\n- When: {} {}-{}\n- Where: {}\n- Cost: {}\n",
                event.title,
                event.description,
                event.date,
                event.start,
                event.end,
                event.location,
                event.cost
            ));
            if let Some(link) = event.registration {
                out.push_str(&format!("- Register: {}\n", link));
            }
        }
        Ok(out.trim_end().to_string())
    }
}
