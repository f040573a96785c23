//! Built-in lexicon for the university assistant domain

use super::{IntentTable, Lexicon, SlotTable, SlotValue, default_negation_markers};
use crate::types::{IntentKind, SlotKind};

fn values(entries: &[(&str, &[&str])]) -> Vec<SlotValue> {
    entries
        .iter()
        .map(|(value, phrases)| SlotValue {
            value: value.to_string(),
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
        })
        .collect()
}

fn intent(
    intent: IntentKind,
    triggers: &[&str],
    relevant_slots: &[SlotKind],
    required_slots: &[SlotKind],
    bonus_slots: &[SlotKind],
) -> IntentTable {
    IntentTable {
        intent,
        triggers: triggers.iter().map(|t| t.to_string()).collect(),
        relevant_slots: relevant_slots.to_vec(),
        required_slots: required_slots.to_vec(),
        bonus_slots: bonus_slots.to_vec(),
    }
}

impl Lexicon {
    /// The default lexicon shipped with the engine
    pub fn builtin() -> Self {
        let slots = vec![
            SlotTable {
                slot: SlotKind::Subject,
                negatable: false,
                values: values(&[
                    ("AI", &["ai", "artificial intelligence"]),
                    ("machine-learning", &["machine learning", "ml", "deep learning"]),
                    ("computer-science", &["computer science", "cs"]),
                    ("programming", &["programming", "coding", "software engineering", "python"]),
                    ("data-structures", &["data structures", "algorithm"]),
                    ("databases", &["database", "distributed systems"]),
                    ("mathematics", &["mathematics", "math", "maths", "calculus"]),
                    ("physics", &["physics"]),
                    ("chemistry", &["chemistry"]),
                    ("biology", &["biology"]),
                    ("history", &["history"]),
                    ("english", &["english", "literature"]),
                    ("psychology", &["psychology"]),
                    ("economics", &["economics"]),
                ]),
            },
            SlotTable {
                slot: SlotKind::CourseType,
                negatable: false,
                values: values(&[
                    ("elective", &["elective"]),
                    ("required", &["required", "core requirement"]),
                    ("prerequisite", &["prerequisite", "prereq"]),
                    ("graduate", &["graduate", "grad"]),
                    ("undergraduate", &["undergraduate", "undergrad"]),
                    ("online", &["online"]),
                    ("lab", &["lab"]),
                ]),
            },
            SlotTable {
                slot: SlotKind::TimeConstraint,
                negatable: true,
                values: values(&[
                    ("morning", &["morning"]),
                    ("afternoon", &["afternoon"]),
                    ("evening", &["evening", "night"]),
                    ("weekend", &["weekend"]),
                    ("monday", &["monday"]),
                    ("tuesday", &["tuesday"]),
                    ("wednesday", &["wednesday"]),
                    ("thursday", &["thursday"]),
                    ("friday", &["friday"]),
                ]),
            },
            SlotTable {
                slot: SlotKind::Title,
                negatable: false,
                values: values(&[
                    ("clean-code", &["clean code"]),
                    ("design-patterns", &["design patterns"]),
                    ("introduction-to-algorithms", &["introduction to algorithms", "clrs"]),
                    (
                        "designing-data-intensive-applications",
                        &["designing data intensive applications", "ddia"],
                    ),
                    ("python-crash-course", &["python crash course"]),
                    (
                        "ai-a-modern-approach",
                        &["artificial intelligence a modern approach", "aima"],
                    ),
                ]),
            },
            SlotTable {
                slot: SlotKind::Author,
                negatable: false,
                values: values(&[
                    ("robert-martin", &["robert martin", "robert c martin", "uncle bob"]),
                    ("gang-of-four", &["gang of four", "erich gamma"]),
                    ("thomas-cormen", &["cormen", "thomas cormen", "thomas h cormen"]),
                    ("martin-kleppmann", &["kleppmann", "martin kleppmann"]),
                    ("eric-matthes", &["eric matthes", "matthes"]),
                    ("stuart-russell", &["stuart russell", "russell"]),
                    ("peter-norvig", &["peter norvig", "norvig"]),
                ]),
            },
            SlotTable {
                slot: SlotKind::Category,
                negatable: true,
                values: values(&[
                    ("AI", &["ai", "artificial intelligence"]),
                    ("career", &["career", "job fair", "internship", "networking"]),
                    ("academic", &["academic", "lecture", "research"]),
                    ("sports", &["sports", "soccer", "basketball", "football"]),
                    ("workshop", &["workshop", "hackathon", "bootcamp"]),
                    ("cultural", &["cultural", "festival", "concert", "food"]),
                    ("club", &["club", "society"]),
                    ("conference", &["conference", "symposium"]),
                ]),
            },
            SlotTable {
                slot: SlotKind::DateRange,
                negatable: false,
                values: values(&[
                    ("today", &["today", "tonight"]),
                    ("tomorrow", &["tomorrow"]),
                    ("this-week", &["this week"]),
                    ("next-week", &["next week"]),
                    ("this-weekend", &["this weekend"]),
                    ("this-month", &["this month"]),
                    ("next-semester", &["next semester", "next term"]),
                    ("upcoming", &["upcoming", "coming up", "soon"]),
                ]),
            },
        ];

        let intents = vec![
            intent(
                IntentKind::FindCourse,
                &[
                    "course",
                    "class",
                    "elective",
                    "prerequisite",
                    "credit",
                    "semester",
                    "professor",
                    "curriculum",
                    "enroll",
                    "register for",
                ],
                &[
                    SlotKind::Subject,
                    SlotKind::CourseType,
                    SlotKind::TimeConstraint,
                    SlotKind::DateRange,
                ],
                &[SlotKind::Subject],
                &[],
            ),
            intent(
                IntentKind::SearchLibrary,
                &[
                    "book",
                    "library",
                    "borrow",
                    "checkout",
                    "check out",
                    "catalog",
                    "journal",
                    "article",
                    "isbn",
                    "textbook",
                    "renew",
                    "publication",
                ],
                &[SlotKind::Title, SlotKind::Author, SlotKind::Subject],
                // a title or author lookup must not inherit an earlier subject
                &[],
                &[SlotKind::Title, SlotKind::Author, SlotKind::Subject],
            ),
            intent(
                IntentKind::FindEvents,
                &[
                    "event",
                    "workshop",
                    "seminar",
                    "conference",
                    "symposium",
                    "concert",
                    "fair",
                    "meetup",
                    "hackathon",
                    "festival",
                    "game",
                    "activity",
                    "activities",
                    "happening",
                ],
                &[
                    SlotKind::Category,
                    SlotKind::Subject,
                    SlotKind::DateRange,
                    SlotKind::TimeConstraint,
                ],
                &[SlotKind::Category],
                &[],
            ),
            intent(
                IntentKind::ProfileQuery,
                &[
                    "profile",
                    "my interests",
                    "my preferences",
                    "preferences",
                    "my major",
                    "gpa",
                    "recommend",
                    "recommendation",
                    "my goals",
                    "career goals",
                    "about me",
                ],
                &[SlotKind::Subject, SlotKind::Category],
                &[],
                &[],
            ),
        ];

        Self {
            negation_markers: default_negation_markers(),
            slots,
            intents,
        }
    }
}
