//! Library catalog search

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{Responder, ResponderRequest};
use crate::error::ResponderError;
use crate::types::SlotKind;

pub const ID: &str = "library";

const MAX_LISTED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    Available,
    CheckedOut,
    OnHold,
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "Available"),
            Self::CheckedOut => write!(f, "Checked out"),
            Self::OnHold => write!(f, "On hold"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Book {
    pub id: &'static str,
    /// Canonical title value from the lexicon
    pub key: &'static str,
    pub title: &'static str,
    pub author: &'static str,
    pub author_keys: &'static [&'static str],
    pub subjects: &'static [&'static str],
    pub isbn: &'static str,
    pub location: &'static str,
    pub call_number: &'static str,
    pub status: BookStatus,
    pub due_date: Option<&'static str>,
    pub holds: u32,
}

static CATALOG: &[Book] = &[
    Book {
        id: "CC001",
        key: "clean-code",
        title: "Clean Code: A Handbook of Agile Software Craftsmanship",
        author: "Robert C. Martin",
        author_keys: &["robert-martin"],
        subjects: &["programming"],
        isbn: "9780132350884",
        location: "Main Library, Floor 3, Aisle 7, Shelf 4",
        call_number: "QA76.76.D47 M37 2008",
        status: BookStatus::Available,
        due_date: None,
        holds: 0,
    },
    Book {
        id: "DP001",
        key: "design-patterns",
        title: "Design Patterns: Elements of Reusable Object-Oriented Software",
        author: "Gang of Four",
        author_keys: &["gang-of-four"],
        subjects: &["programming"],
        isbn: "9780201633612",
        location: "Main Library, Floor 3, Aisle 8, Shelf 2",
        call_number: "QA76.64 G35 1995",
        status: BookStatus::CheckedOut,
        due_date: Some("2025-09-20"),
        holds: 0,
    },
    Book {
        id: "ALG001",
        key: "introduction-to-algorithms",
        title: "Introduction to Algorithms",
        author: "Thomas H. Cormen",
        author_keys: &["thomas-cormen"],
        subjects: &["data-structures", "computer-science"],
        isbn: "9780262033848",
        location: "Science Library, Floor 2, Section 3A",
        call_number: "QA76.6 C662 2009",
        status: BookStatus::Available,
        due_date: None,
        holds: 0,
    },
    Book {
        id: "DIA001",
        key: "designing-data-intensive-applications",
        title: "Designing Data-Intensive Applications",
        author: "Martin Kleppmann",
        author_keys: &["martin-kleppmann"],
        subjects: &["databases"],
        isbn: "9781449373320",
        location: "Main Library, Floor 2, Aisle 12, Shelf 3",
        call_number: "QA76.9.D3 K54 2017",
        status: BookStatus::OnHold,
        due_date: Some("2025-09-15"),
        holds: 3,
    },
    Book {
        id: "PCC001",
        key: "python-crash-course",
        title: "Python Crash Course",
        author: "Eric Matthes",
        author_keys: &["eric-matthes"],
        subjects: &["programming"],
        isbn: "9781593279288",
        location: "Main Library, Floor 1, Programming Section",
        call_number: "QA76.73.P98 M38 2019",
        status: BookStatus::Available,
        due_date: None,
        holds: 0,
    },
    Book {
        id: "AI001",
        key: "ai-a-modern-approach",
        title: "Artificial Intelligence: A Modern Approach",
        author: "Stuart Russell and Peter Norvig",
        author_keys: &["stuart-russell", "peter-norvig"],
        subjects: &["AI", "machine-learning", "computer-science"],
        isbn: "9780134610993",
        location: "Science Library, Floor 3, AI Section",
        call_number: "Q335 R87 2020",
        status: BookStatus::Available,
        due_date: None,
        holds: 0,
    },
];

pub fn catalog() -> &'static [Book] {
    CATALOG
}

/// Rank books by how they match: title over author over subject.
/// Books that match nothing are left out.
pub fn search<'a>(
    catalog: &'a [Book],
    titles: &[&str],
    authors: &[&str],
    subjects: &[&str],
) -> Vec<&'a Book> {
    let mut scored: Vec<(u32, &Book)> = catalog
        .iter()
        .filter_map(|book| {
            let mut score = 0;
            if titles.contains(&book.key) {
                score += 4;
            }
            if authors.iter().any(|a| book.author_keys.contains(a)) {
                score += 2;
            }
            if subjects
                .iter()
                .any(|s| book.subjects.iter().any(|bs| bs.eq_ignore_ascii_case(s)))
            {
                score += 1;
            }
            (score > 0).then_some((score, book))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, book)| book).collect()
}

pub struct LibraryResponder {
    catalog: &'static [Book],
}

impl LibraryResponder {
    pub fn new() -> Self {
        Self { catalog: catalog() }
    }
}

impl Default for LibraryResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for LibraryResponder {
    fn id(&self) -> &str {
        ID
    }

    async fn handle(&self, request: &ResponderRequest) -> Result<String, ResponderError> {
        let titles = request.values(SlotKind::Title);
        let authors = request.values(SlotKind::Author);
        let subjects = request.values(SlotKind::Subject);
        if titles.is_empty() && authors.is_empty() && subjects.is_empty() {
            return Err(ResponderError::InvalidEntities(
                "library search needs a title, author or subject".to_string(),
            ));
        }

        let books = search(self.catalog, &titles, &authors, &subjects);
        debug!("Library search found {} item(s)", books.len());
        if books.is_empty() {
            return Ok("No items in the catalog match that. Try a different title, author or topic.".to_string());
        }

        let mut out = format!("Found {} item(s):\n", books.len());
        for (i, book) in books.iter().take(MAX_LISTED).enumerate() {
            out.push_str(&format!(
                "\n**{}. {}**\n   Author: {}\n   Status: {}\n   Location: {} ({})\n",
                i + 1,
                book.title,
                book.author,
                book.status,
                book.location,
                book.call_number
            ));
            match (book.status, book.due_date) {
                (BookStatus::CheckedOut, Some(due)) => {
                    out.push_str(&format!("   Due back: {}\n", due));
                }
                (BookStatus::OnHold, _) if book.holds > 0 => {
                    out.push_str(&format!("   Hold queue: {} waiting\n", book.holds));
                }
                _ => {}
            }
        }
        if books.len() > MAX_LISTED {
            out.push_str(&format!("\n... and {} more.", books.len() - MAX_LISTED));
        }
        Ok(out.trim_end().to_string())
    }
}
