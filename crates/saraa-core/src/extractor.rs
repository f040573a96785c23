//! Entity extraction
//!
//! Scans the query for every lexicon phrase of every slot. Matching is
//! case-insensitive on whole words. Overlapping matches within one slot are
//! resolved longest-first; an adjacent negation marker turns a negatable
//! value into its `not-` variant instead of dropping it.

use tracing::debug;

use crate::lexicon::{Lexicon, SlotTable, Token, find_phrase, phrase_words, tokenize};
use crate::types::{Entity, NEGATION_PREFIX, SlotKind, Span};

/// A phrase occurrence, in token indices
#[derive(Debug, Clone)]
struct Candidate<'a> {
    first: usize,
    len: usize,
    value: &'a str,
    /// position of the value/phrase in the lexicon, for stable tie-breaks
    order: usize,
}

impl Candidate<'_> {
    fn last(&self) -> usize {
        self.first + self.len - 1
    }

    fn overlaps(&self, other: &Candidate<'_>) -> bool {
        self.first <= other.last() && other.first <= self.last()
    }
}

/// Extract all entities from `text`. Never fails; no match yields an empty vec.
///
/// Output is ordered by span start, then slot declaration order.
pub fn extract(lexicon: &Lexicon, text: &str) -> Vec<Entity> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut entities: Vec<Entity> = lexicon
        .slots
        .iter()
        .flat_map(|table| extract_slot(lexicon, table, &tokens))
        .collect();

    entities.sort_by_key(|e| {
        (
            e.span.map(|s| s.start).unwrap_or(usize::MAX),
            slot_rank(e.slot),
        )
    });

    debug!("Extracted {} entities from {:?}", entities.len(), text);
    entities
}

fn slot_rank(slot: SlotKind) -> usize {
    SlotKind::ALL
        .iter()
        .position(|s| *s == slot)
        .unwrap_or(SlotKind::ALL.len())
}

fn extract_slot(lexicon: &Lexicon, table: &SlotTable, tokens: &[Token]) -> Vec<Entity> {
    let mut candidates = Vec::new();
    let mut order = 0;
    for value in &table.values {
        for phrase in &value.phrases {
            let words = phrase_words(phrase);
            for first in find_phrase(tokens, &words) {
                candidates.push(Candidate {
                    first,
                    len: words.len(),
                    value: &value.value,
                    order,
                });
            }
            order += 1;
        }
    }

    // longest first; equal lengths keep the earlier start, then lexicon order
    candidates.sort_by(|a, b| {
        b.len
            .cmp(&a.len)
            .then(a.first.cmp(&b.first))
            .then(a.order.cmp(&b.order))
    });

    let mut kept: Vec<Candidate<'_>> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| !k.overlaps(&candidate)) {
            kept.push(candidate);
        }
    }

    kept.into_iter()
        .map(|c| {
            let negated = table.negatable
                && c.first > 0
                && lexicon.is_negation_marker(&tokens[c.first - 1].text);
            let value = if negated {
                format!("{}{}", NEGATION_PREFIX, c.value)
            } else {
                c.value.to_string()
            };
            let span = Span {
                start: tokens[c.first].start,
                end: tokens[c.last()].end,
            };
            Entity::new(table.slot, value, Some(span))
        })
        .collect()
}
