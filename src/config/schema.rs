use crate::pattern::PatternSpec;
use crate::replacer::{InvocationPoint, Replacer, ReplacerOptions};
use crate::select::AssetFilter;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ReplaceConfig {
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub patterns: Vec<PatternDefinition>,
}

impl ReplaceConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.compile().map(|_| ())
    }

    /// Compile into a ready-to-apply replacer.
    pub fn build(&self) -> Result<Replacer, ValidationError> {
        let (options, filter, patterns) = self.compile()?;
        Ok(Replacer::new(options, patterns).with_filter(filter))
    }

    fn compile(&self) -> Result<(ReplacerOptions, AssetFilter, Vec<PatternSpec>), ValidationError> {
        let mut issues = Vec::new();

        let target = match self.options.target.parse::<InvocationPoint>() {
            Ok(target) => Some(target),
            Err(error) => {
                issues.push(ValidationIssue::UnsupportedTarget {
                    message: error.to_string(),
                });
                None
            }
        };

        let mut compile_list = |list: &str, sources: &[String]| -> Vec<Regex> {
            sources
                .iter()
                .filter_map(|source| match Regex::new(source) {
                    Ok(re) => Some(re),
                    Err(error) => {
                        issues.push(ValidationIssue::InvalidRegex {
                            location: format!("filter.{list}"),
                            message: error.to_string(),
                        });
                        None
                    }
                })
                .collect()
        };
        let filter = AssetFilter {
            test: compile_list("test", &self.filter.test),
            include: compile_list("include", &self.filter.include),
            exclude: compile_list("exclude", &self.filter.exclude),
        };

        if self.patterns.is_empty() {
            log::warn!("replace config has no patterns; nothing will be replaced");
        }

        let mut patterns = Vec::with_capacity(self.patterns.len());
        for (index, definition) in self.patterns.iter().enumerate() {
            if let Some(spec) = definition.compile(index + 1, &mut issues) {
                patterns.push(spec);
            }
        }

        match target {
            Some(target) if issues.is_empty() => Ok((
                ReplacerOptions {
                    source_map: self.options.source_map,
                    target,
                },
                filter,
                patterns,
            )),
            _ => Err(ValidationError { issues }),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Options {
    #[serde(default = "default_true")]
    pub source_map: bool,
    #[serde(default = "default_target")]
    pub target: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            source_map: true,
            target: default_target(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_target() -> String {
    InvocationPoint::default().as_str().to_string()
}

/// Asset name filter; each entry is a regular expression.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Filter {
    #[serde(default)]
    pub test: Vec<String>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatternDefinition {
    #[serde(default)]
    pub regex: String,
    /// Replacement text; `$1` and `${name}` refer to capture groups.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub flags: String,
    #[serde(default = "default_true")]
    pub global: bool,
    #[serde(default)]
    pub target_filename_pattern: Option<String>,
    #[serde(default)]
    pub target_suffix: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PatternDefinition {
    fn compile(&self, number: usize, issues: &mut Vec<ValidationIssue>) -> Option<PatternSpec> {
        let before = issues.len();

        if self.regex.is_empty() {
            issues.push(ValidationIssue::MissingField {
                pattern: number,
                field: "regex",
            });
        }
        if self.value.is_none() {
            issues.push(ValidationIssue::MissingField {
                pattern: number,
                field: "value",
            });
        }
        if matches!(self.target_suffix.as_deref(), Some("")) {
            issues.push(ValidationIssue::InvalidCombo {
                pattern: number,
                message: "target_suffix must not be empty".to_string(),
            });
        }

        let search = if self.regex.is_empty() {
            None
        } else {
            match build_regex(&self.regex, &self.flags) {
                Ok(re) => Some(re),
                Err(issue) => {
                    issues.push(issue.at(number));
                    None
                }
            }
        };

        let filename_pattern = match self.target_filename_pattern.as_deref() {
            None => None,
            Some(source) => match Regex::new(source) {
                Ok(re) => Some(re),
                Err(error) => {
                    issues.push(ValidationIssue::InvalidRegex {
                        location: format!("pattern #{number} target_filename_pattern"),
                        message: error.to_string(),
                    });
                    None
                }
            },
        };

        if issues.len() > before {
            return None;
        }
        let (search, value) = (search?, self.value.clone()?);

        let mut spec = PatternSpec::new(search, value);
        if let Some(re) = filename_pattern {
            spec = spec.with_filename_pattern(re);
        }
        if let Some(suffix) = &self.target_suffix {
            spec = spec.with_suffix(suffix.clone());
        }
        if let Some(description) = &self.description {
            spec = spec.with_description(description.clone());
        }
        if !self.global {
            spec = spec.first_only();
        }
        Some(spec)
    }
}

enum RegexIssue {
    Flags(String),
    Syntax(String),
}

impl RegexIssue {
    fn at(self, number: usize) -> ValidationIssue {
        match self {
            RegexIssue::Flags(flags) => ValidationIssue::InvalidFlags {
                pattern: number,
                flags,
            },
            RegexIssue::Syntax(message) => ValidationIssue::InvalidRegex {
                location: format!("pattern #{number} regex"),
                message,
            },
        }
    }
}

fn build_regex(source: &str, flags: &str) -> Result<Regex, RegexIssue> {
    let mut builder = RegexBuilder::new(source);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            _ => return Err(RegexIssue::Flags(flags.to_string())),
        };
    }
    builder
        .build()
        .map_err(|error| RegexIssue::Syntax(error.to_string()))
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField {
        pattern: usize,
        field: &'static str,
    },
    InvalidRegex {
        location: String,
        message: String,
    },
    InvalidFlags {
        pattern: usize,
        flags: String,
    },
    UnsupportedTarget {
        message: String,
    },
    InvalidCombo {
        pattern: usize,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { pattern, field } => {
                write!(f, "pattern #{pattern} missing required field '{field}'")
            }
            ValidationIssue::InvalidRegex { location, message } => {
                write!(f, "invalid regular expression in {location}: {message}")
            }
            ValidationIssue::InvalidFlags { pattern, flags } => write!(
                f,
                "pattern #{pattern} has unsupported flags '{flags}' (expected any of i, m, s, x)"
            ),
            ValidationIssue::UnsupportedTarget { message } => write!(f, "{message}"),
            ValidationIssue::InvalidCombo { pattern, message } => {
                write!(f, "pattern #{pattern} has invalid configuration: {message}")
            }
        }
    }
}
