//! Replacement rules.

use regex::{Captures, Regex};
use std::fmt;
use std::rc::Rc;

/// One matched occurrence, as handed to computed replacements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    /// Capture groups 1..n; `None` for groups that did not participate.
    pub groups: Vec<Option<String>>,
    pub full_text: String,
}

impl Match {
    pub(crate) fn from_captures(captures: &Captures<'_>) -> Self {
        let whole = captures
            .get(0)
            .map_or((0, 0, ""), |m| (m.start(), m.end(), m.as_str()));
        Self {
            start: whole.0,
            end: whole.1,
            groups: captures
                .iter()
                .skip(1)
                .map(|group| group.map(|g| g.as_str().to_string()))
                .collect(),
            full_text: whole.2.to_string(),
        }
    }

    /// Group `index`, where 0 is the whole match.
    pub fn group(&self, index: usize) -> Option<&str> {
        match index {
            0 => Some(&self.full_text),
            n => self.groups.get(n - 1)?.as_deref(),
        }
    }
}

type ComputeFn = dyn Fn(&Match) -> String;

/// How the text for a match is produced.
#[derive(Clone)]
pub enum Replacement {
    /// Literal text with `$1`, `$&`, `$<name>`, `${name}` and `$$` expansion.
    Literal(String),
    /// Called once per match.
    Computed(Rc<ComputeFn>),
}

impl Replacement {
    pub fn computed(f: impl Fn(&Match) -> String + 'static) -> Self {
        Replacement::Computed(Rc::new(f))
    }

    pub(crate) fn resolve(&self, captures: &Captures<'_>, matched: &Match) -> String {
        match self {
            Replacement::Literal(template) => {
                let mut out = String::with_capacity(template.len());
                expand_template(template, captures, &mut out);
                out
            }
            Replacement::Computed(compute) => compute(matched),
        }
    }
}

/// Expand `template` the way `String.prototype.replace` does.
///
/// `$n` and `$nn` take the longest group number that exists, so `$1px` is
/// group 1 followed by `px`. A reference to a missing group stays literal.
/// `${n}` and `${name}` are accepted as well. Groups that did not take part
/// in the match expand to nothing.
fn expand_template(template: &str, captures: &Captures<'_>, out: &mut String) {
    let group_count = captures.len() - 1;
    let group = |index: usize| captures.get(index).map_or("", |m| m.as_str());
    let named = |name: &str| match name.parse::<usize>() {
        Ok(index) => group(index),
        Err(_) => captures.name(name).map_or("", |m| m.as_str()),
    };

    let mut rest = template;
    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        rest = &rest[dollar + 1..];

        let bytes = rest.as_bytes();
        match bytes.first() {
            Some(b'$') => {
                out.push('$');
                rest = &rest[1..];
            }
            Some(b'&') => {
                out.push_str(group(0));
                rest = &rest[1..];
            }
            Some(open @ (b'<' | b'{')) => {
                let close = if *open == b'<' { '>' } else { '}' };
                match rest.find(close) {
                    Some(end) => {
                        out.push_str(named(&rest[1..end]));
                        rest = &rest[end + 1..];
                    }
                    None => out.push('$'),
                }
            }
            Some(first) if first.is_ascii_digit() => {
                let one = usize::from(first - b'0');
                let two = match bytes.get(1) {
                    Some(second) if second.is_ascii_digit() => {
                        Some(one * 10 + usize::from(second - b'0'))
                    }
                    _ => None,
                };
                match two {
                    Some(index) if (1..=group_count).contains(&index) => {
                        out.push_str(group(index));
                        rest = &rest[2..];
                    }
                    _ if (1..=group_count).contains(&one) => {
                        out.push_str(group(one));
                        rest = &rest[1..];
                    }
                    _ => out.push('$'),
                }
            }
            _ => out.push('$'),
        }
    }
    out.push_str(rest);
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replacement::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Replacement::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for Replacement {
    fn from(text: &str) -> Self {
        Replacement::Literal(text.to_string())
    }
}

impl From<String> for Replacement {
    fn from(text: String) -> Self {
        Replacement::Literal(text)
    }
}

/// A search pattern, its replacement and the files it is limited to.
#[derive(Debug, Clone)]
pub struct PatternSpec {
    pub search: Regex,
    pub replacement: Replacement,
    pub target_filename_pattern: Option<Regex>,
    pub target_suffix: Option<String>,
    pub description: String,
    /// Replace every occurrence rather than only the first.
    pub global: bool,
}

impl PatternSpec {
    pub fn new(search: Regex, replacement: impl Into<Replacement>) -> Self {
        Self {
            search,
            replacement: replacement.into(),
            target_filename_pattern: None,
            target_suffix: None,
            description: String::new(),
            global: true,
        }
    }

    pub fn with_filename_pattern(mut self, pattern: Regex) -> Self {
        self.target_filename_pattern = Some(pattern);
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.target_suffix = Some(suffix.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn first_only(mut self) -> Self {
        self.global = false;
        self
    }

    /// Description if set, else the search expression.
    pub fn label(&self) -> &str {
        if self.description.is_empty() {
            self.search.as_str()
        } else {
            &self.description
        }
    }
}
