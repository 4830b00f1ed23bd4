//! Which output files a rule runs against.

use crate::pattern::PatternSpec;
use regex::Regex;

/// Whether `pattern` should run against the output file `filename`.
///
/// A pattern without filters applies everywhere. With filters declared, the
/// file passes when it satisfies any one of them.
pub fn applies(filename: &str, pattern: &PatternSpec) -> bool {
    let by_name = pattern
        .target_filename_pattern
        .as_ref()
        .map(|re| re.is_match(filename));
    let by_suffix = pattern
        .target_suffix
        .as_deref()
        .map(|suffix| filename.ends_with(suffix));

    match (by_name, by_suffix) {
        (None, None) => true,
        (name, suffix) => name.unwrap_or(false) || suffix.unwrap_or(false),
    }
}

/// Plugin-wide asset name filter applied before any per-pattern selection.
///
/// Each non-empty list is a set of alternatives: `test` and `include` need at
/// least one hit, a hit in `exclude` rejects the file.
#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    pub test: Vec<Regex>,
    pub include: Vec<Regex>,
    pub exclude: Vec<Regex>,
}

impl AssetFilter {
    pub fn is_empty(&self) -> bool {
        self.test.is_empty() && self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        let any = |list: &[Regex]| list.iter().any(|re| re.is_match(name));

        if !self.test.is_empty() && !any(&self.test) {
            return false;
        }
        if !self.include.is_empty() && !any(&self.include) {
            return false;
        }
        !any(&self.exclude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> PatternSpec {
        PatternSpec::new(Regex::new("dev").unwrap(), "prod")
    }

    #[test]
    fn test_no_filter_applies_everywhere() {
        assert!(applies("bundle.js", &pattern()));
        assert!(applies("styles.css", &pattern()));
    }

    #[test]
    fn test_suffix_filter() {
        let spec = pattern().with_suffix(".js");
        assert!(applies("bundle.js", &spec));
        assert!(!applies("bundle.css", &spec));
        assert!(!applies("bundle.js.map", &spec));
    }

    #[test]
    fn test_filename_pattern_filter() {
        let spec = pattern().with_filename_pattern(Regex::new(r"^vendor\.").unwrap());
        assert!(applies("vendor.abc123.js", &spec));
        assert!(!applies("main.js", &spec));
    }

    #[test]
    fn test_either_declared_filter_suffices() {
        let spec = pattern()
            .with_filename_pattern(Regex::new("^main").unwrap())
            .with_suffix(".css");
        assert!(applies("main.js", &spec));
        assert!(applies("theme.css", &spec));
        assert!(!applies("vendor.js", &spec));
    }

    #[test]
    fn test_asset_filter_empty_accepts_all() {
        let filter = AssetFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches("anything.txt"));
    }

    #[test]
    fn test_asset_filter_test_and_exclude() {
        let filter = AssetFilter {
            test: vec![Regex::new(r"\.js$").unwrap()],
            include: Vec::new(),
            exclude: vec![Regex::new("^vendor").unwrap()],
        };
        assert!(filter.matches("main.js"));
        assert!(!filter.matches("main.css"));
        assert!(!filter.matches("vendor.js"));
    }

    #[test]
    fn test_asset_filter_include_requires_hit() {
        let filter = AssetFilter {
            test: Vec::new(),
            include: vec![Regex::new("^app/").unwrap(), Regex::new("^lib/").unwrap()],
            exclude: Vec::new(),
        };
        assert!(filter.matches("lib/index.js"));
        assert!(!filter.matches("other/index.js"));
    }
}
