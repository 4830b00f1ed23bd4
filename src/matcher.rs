//! Cursor-driven search of one pattern over one text.
//!
//! The cursor is explicit state on [`Matcher`], never hidden regex state. A
//! pass starts at offset 0 and each step resumes where the previous match
//! ended, so matches come out in ascending order and never overlap. An empty
//! match moves the cursor one character further so the scan always ends.

use crate::edit::Edit;
use crate::pattern::{Match, PatternSpec};

/// A match together with the text that replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub matched: Match,
    pub value: String,
}

impl Substitution {
    pub fn into_edit(self) -> Edit {
        Edit::new(self.matched.start, self.matched.end, self.value)
    }
}

#[derive(Debug)]
pub struct Matcher<'p, 't> {
    pattern: &'p PatternSpec,
    text: &'t str,
    last_index: usize,
    finished: bool,
}

impl<'p, 't> Matcher<'p, 't> {
    pub fn new(pattern: &'p PatternSpec, text: &'t str) -> Self {
        Self {
            pattern,
            text,
            last_index: 0,
            finished: false,
        }
    }

    /// Offset the next search starts from.
    pub fn last_index(&self) -> usize {
        self.last_index
    }

    fn step_past_empty_match(&mut self, at: usize) {
        log::debug!(
            "zero-width match of /{}/ at offset {}; advancing",
            self.pattern.search.as_str(),
            at
        );
        let width = self.text[at..].chars().next().map_or(1, char::len_utf8);
        self.last_index = at + width;
    }
}

impl Iterator for Matcher<'_, '_> {
    type Item = Substitution;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.last_index > self.text.len() {
            self.finished = true;
            return None;
        }

        let Some(captures) = self.pattern.search.captures_at(self.text, self.last_index) else {
            self.finished = true;
            return None;
        };

        let matched = Match::from_captures(&captures);
        if matched.start == matched.end {
            self.step_past_empty_match(matched.end);
        } else {
            self.last_index = matched.end;
        }
        if !self.pattern.global {
            self.finished = true;
        }

        let value = self.pattern.replacement.resolve(&captures, &matched);
        Some(Substitution { matched, value })
    }
}

impl std::iter::FusedIterator for Matcher<'_, '_> {}

/// All edits `pattern` produces against `text`.
pub fn find_edits(pattern: &PatternSpec, text: &str) -> Vec<Edit> {
    Matcher::new(pattern, text)
        .map(Substitution::into_edit)
        .collect()
}
