//! Course advisor backed by a small static catalog

use async_trait::async_trait;
use chrono::Weekday;
use tracing::debug;

use super::{Preferences, Responder, ResponderRequest};
use crate::error::ResponderError;
use crate::types::SlotKind;

pub const ID: &str = "course-advisor";

const NOON: u16 = 12 * 60;
const EVENING: u16 = 17 * 60;

/// A weekly meeting time, minutes after midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    pub days: &'static [Weekday],
    pub start: u16,
    pub end: u16,
}

impl TimeSlot {
    const fn new(days: &'static [Weekday], start: (u16, u16), end: (u16, u16)) -> Self {
        Self {
            days,
            start: start.0 * 60 + start.1,
            end: end.0 * 60 + end.1,
        }
    }

    fn is_weekend(&self) -> bool {
        self.days.iter().any(|d| matches!(d, Weekday::Sat | Weekday::Sun))
    }

    /// Whether this slot falls in a time-constraint value such as "morning"
    /// or "tuesday". Unknown values match nothing.
    fn falls_in(&self, constraint: &str) -> bool {
        match constraint {
            "morning" => self.start < NOON,
            "afternoon" => (NOON..EVENING).contains(&self.start),
            "evening" => self.start >= EVENING,
            "weekend" => self.is_weekend(),
            day => day
                .parse::<Weekday>()
                .map(|day| self.days.contains(&day))
                .unwrap_or(false),
        }
    }
}

impl std::fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for day in self.days {
            let short = match day {
                Weekday::Mon => "M",
                Weekday::Tue => "T",
                Weekday::Wed => "W",
                Weekday::Thu => "Th",
                Weekday::Fri => "F",
                Weekday::Sat => "Sa",
                Weekday::Sun => "Su",
            };
            f.write_str(short)?;
        }
        write!(
            f,
            " {}:{:02}-{}:{:02}",
            self.start / 60,
            self.start % 60,
            self.end / 60,
            self.end % 60
        )
    }
}

#[derive(Debug, Clone)]
pub struct Course {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub credits: u8,
    pub professor: &'static str,
    /// Canonical subject values this course covers
    pub subjects: &'static [&'static str],
    /// Canonical course-type values
    pub kinds: &'static [&'static str],
    pub slots: &'static [TimeSlot],
    pub capacity: u32,
    pub enrolled: u32,
}

impl Course {
    pub fn open_seats(&self) -> u32 {
        self.capacity.saturating_sub(self.enrolled)
    }
}

use Weekday::{Fri, Mon, Thu, Tue, Wed};

const MWF: &[Weekday] = &[Mon, Wed, Fri];
const TTH: &[Weekday] = &[Tue, Thu];
const MW: &[Weekday] = &[Mon, Wed];

static CATALOG: &[Course] = &[
    Course {
        id: "CS101",
        title: "Introduction to Computer Science",
        description: "Fundamentals of programming and computer science",
        credits: 3,
        professor: "Dr. Smith",
        subjects: &["computer-science", "programming"],
        kinds: &["required", "prerequisite", "undergraduate"],
        slots: &[
            TimeSlot::new(MWF, (9, 0), (9, 50)),
            TimeSlot::new(TTH, (14, 0), (15, 15)),
        ],
        capacity: 50,
        enrolled: 45,
    },
    Course {
        id: "CS201",
        title: "Data Structures and Algorithms",
        description: "Study of fundamental data structures and algorithms",
        credits: 4,
        professor: "Dr. Johnson",
        subjects: &["computer-science", "data-structures", "programming"],
        kinds: &["required", "prerequisite", "undergraduate"],
        slots: &[
            TimeSlot::new(MWF, (11, 0), (11, 50)),
            TimeSlot::new(TTH, (9, 30), (10, 45)),
        ],
        capacity: 40,
        enrolled: 38,
    },
    Course {
        id: "CS301",
        title: "Artificial Intelligence",
        description: "Introduction to AI concepts and techniques",
        credits: 3,
        professor: "Dr. Williams",
        subjects: &["computer-science", "AI", "machine-learning"],
        kinds: &["elective", "undergraduate"],
        slots: &[TimeSlot::new(TTH, (15, 30), (16, 45))],
        capacity: 30,
        enrolled: 25,
    },
    Course {
        id: "CS305",
        title: "Natural Language Processing",
        description: "Language models, parsing and text classification",
        credits: 3,
        professor: "Dr. Patel",
        subjects: &["computer-science", "AI"],
        kinds: &["elective", "undergraduate"],
        slots: &[TimeSlot::new(TTH, (9, 30), (10, 45))],
        capacity: 30,
        enrolled: 12,
    },
    Course {
        id: "CS330",
        title: "Database Systems",
        description: "Relational design, query processing and transactions",
        credits: 3,
        professor: "Dr. Nguyen",
        subjects: &["computer-science", "databases"],
        kinds: &["elective", "undergraduate", "lab"],
        slots: &[TimeSlot::new(MW, (13, 0), (14, 15))],
        capacity: 35,
        enrolled: 30,
    },
    Course {
        id: "CS350",
        title: "Software Engineering",
        description: "Design patterns, testing and team projects",
        credits: 3,
        professor: "Dr. Garcia",
        subjects: &["computer-science", "programming"],
        kinds: &["required", "undergraduate"],
        slots: &[TimeSlot::new(MWF, (10, 0), (10, 50))],
        capacity: 40,
        enrolled: 40,
    },
    Course {
        id: "CS401",
        title: "Advanced Machine Learning",
        description: "Advanced topics in machine learning and deep learning",
        credits: 3,
        professor: "Dr. Chen",
        subjects: &["computer-science", "AI", "machine-learning"],
        kinds: &["elective", "undergraduate"],
        slots: &[TimeSlot::new(MW, (16, 0), (17, 15))],
        capacity: 25,
        enrolled: 20,
    },
    Course {
        id: "CS510",
        title: "Deep Learning Seminar",
        description: "Reading and presenting current deep learning research",
        credits: 2,
        professor: "Dr. Chen",
        subjects: &["AI", "machine-learning"],
        kinds: &["elective", "graduate", "online"],
        slots: &[TimeSlot::new(&[Thu], (18, 0), (19, 30))],
        capacity: 20,
        enrolled: 9,
    },
    Course {
        id: "MATH201",
        title: "Calculus II",
        description: "Integral calculus and series",
        credits: 4,
        professor: "Dr. Davis",
        subjects: &["mathematics"],
        kinds: &["required", "undergraduate"],
        slots: &[
            TimeSlot::new(MWF, (8, 0), (8, 50)),
            TimeSlot::new(TTH, (13, 0), (14, 15)),
        ],
        capacity: 60,
        enrolled: 55,
    },
    Course {
        id: "STAT301",
        title: "Statistical Learning",
        description: "Regression, classification and resampling methods",
        credits: 3,
        professor: "Dr. Okafor",
        subjects: &["mathematics", "machine-learning"],
        kinds: &["elective", "undergraduate"],
        slots: &[TimeSlot::new(TTH, (11, 0), (12, 15))],
        capacity: 45,
        enrolled: 31,
    },
    Course {
        id: "PHYS101",
        title: "General Physics I",
        description: "Mechanics, waves and thermodynamics",
        credits: 4,
        professor: "Dr. Moreau",
        subjects: &["physics"],
        kinds: &["required", "undergraduate", "lab"],
        slots: &[TimeSlot::new(MWF, (14, 0), (14, 50))],
        capacity: 80,
        enrolled: 64,
    },
];

pub fn catalog() -> &'static [Course] {
    CATALOG
}

/// A course that passed the filters, with the sections that fit
#[derive(Debug)]
pub struct CourseMatch<'a> {
    pub course: &'a Course,
    pub slots: Vec<TimeSlot>,
}

/// Filter the catalog by subject, course type and time constraints
pub fn search<'a>(
    catalog: &'a [Course],
    subjects: &[&str],
    kinds: &[&str],
    times: &Preferences<'_>,
) -> Vec<CourseMatch<'a>> {
    catalog
        .iter()
        .filter(|c| {
            subjects.is_empty()
                || subjects
                    .iter()
                    .any(|s| c.subjects.iter().any(|cs| cs.eq_ignore_ascii_case(s)))
        })
        .filter(|c| kinds.iter().all(|k| c.kinds.contains(k)))
        .filter_map(|course| {
            let slots: Vec<TimeSlot> = course
                .slots
                .iter()
                .copied()
                .filter(|slot| slot_allowed(slot, times))
                .collect();
            (!slots.is_empty()).then_some(CourseMatch { course, slots })
        })
        .collect()
}

fn slot_allowed(slot: &TimeSlot, times: &Preferences<'_>) -> bool {
    times.wanted.iter().all(|t| slot.falls_in(t)) && !times.avoided.iter().any(|t| slot.falls_in(t))
}

pub struct CourseAdvisor {
    catalog: &'static [Course],
}

impl CourseAdvisor {
    pub fn new() -> Self {
        Self { catalog: catalog() }
    }
}

impl Default for CourseAdvisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for CourseAdvisor {
    fn id(&self) -> &str {
        ID
    }

    async fn handle(&self, request: &ResponderRequest) -> Result<String, ResponderError> {
        let subjects = request.values(SlotKind::Subject);
        if subjects.is_empty() {
            return Err(ResponderError::InvalidEntities(
                "course search needs a subject".to_string(),
            ));
        }
        let kinds = request.values(SlotKind::CourseType);
        let times = request.preferences(SlotKind::TimeConstraint);

        let matches = search(self.catalog, &subjects, &kinds, &times);
        debug!(
            "Course search subjects={:?} kinds={:?} times={:?}: {} match(es)",
            subjects,
            kinds,
            times,
            matches.len()
        );

        if matches.is_empty() {
            return Ok(format!(
                "No {} courses match your criteria this term.",
                subjects.join("/")
            ));
        }

        let mut out = format!("Found {} course(s):\n", matches.len());
        for m in matches.iter().take(5) {
            let times: Vec<String> = m.slots.iter().map(|s| s.to_string()).collect();
            out.push_str(&format!(
                "\n**{}** ({})\n- {}\n- Credits: {}\n- Time: {}\n- Professor: {}\n",
                m.course.title,
                m.course.id,
                m.course.description,
                m.course.credits,
                times.join(", "),
                m.course.professor
            ));
            match m.course.open_seats() {
                0 => out.push_str("- Full (waitlist only)\n"),
                n => out.push_str(&format!("- Available: {} spots\n", n)),
            }
        }
        Ok(out.trim_end().to_string())
    }
}
