//! The replacement plugin: runs pattern rules at one lifecycle phase.
//!
//! For every target (a module source or an output file) the edits of all
//! applicable patterns are found against the target's original text and then
//! realized together by one [`RangeRewriter`] call. A target either gets all of
//! its edits or, when they conflict, none.

use crate::artifact::{ModuleKind, StoreError, TextArtifact};
use crate::edit::Edit;
use crate::host::{Compilation, Lifecycle, Phase};
use crate::matcher::find_edits;
use crate::pattern::PatternSpec;
use crate::rewrite::{RangeRewriter, RewriteError};
use crate::select::{applies, AssetFilter};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use thiserror::Error;

pub const PLUGIN_NAME: &str = "BundleReplace";

/// Names accepted for each invocation point, canonical name first.
const MODULE_SOURCE_NAMES: &[&str] = &["module-source", "modules"];
const ASSET_EMISSION_NAMES: &[&str] = &["asset-emission", "chunks", "assets"];
const POST_OPTIMIZATION_NAMES: &[&str] = &["post-optimization", "post-assets"];

/// The lifecycle point at which the replacer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InvocationPoint {
    /// Module sources, before they are merged into output files.
    ModuleSource,
    /// Output files, as soon as they are produced.
    #[default]
    AssetEmission,
    /// Output files, after every optimization has run.
    PostOptimization,
}

impl InvocationPoint {
    pub fn phase(self) -> Phase {
        match self {
            InvocationPoint::ModuleSource => Phase::OptimizeModules,
            InvocationPoint::AssetEmission => Phase::OptimizeChunkAssets,
            InvocationPoint::PostOptimization => Phase::AfterOptimizeChunkAssets,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.names()[0]
    }

    fn names(self) -> &'static [&'static str] {
        match self {
            InvocationPoint::ModuleSource => MODULE_SOURCE_NAMES,
            InvocationPoint::AssetEmission => ASSET_EMISSION_NAMES,
            InvocationPoint::PostOptimization => POST_OPTIMIZATION_NAMES,
        }
    }

    fn supported() -> String {
        [
            InvocationPoint::ModuleSource,
            InvocationPoint::AssetEmission,
            InvocationPoint::PostOptimization,
        ]
        .iter()
        .flat_map(|point| point.names().iter().copied())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

impl fmt::Display for InvocationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvocationPoint {
    type Err = ReplaceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        [
            InvocationPoint::ModuleSource,
            InvocationPoint::AssetEmission,
            InvocationPoint::PostOptimization,
        ]
        .into_iter()
        .find(|point| point.names().iter().any(|name| *name == wanted))
        .ok_or_else(|| ReplaceError::UnsupportedInvocationPoint {
            value: value.to_string(),
            supported: Self::supported(),
        })
    }
}

#[derive(Error, Debug)]
pub enum ReplaceError {
    #[error("Unsupported target type! Type: '{value}'; Supported types: [{supported}]")]
    UnsupportedInvocationPoint { value: String, supported: String },

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to one target during a pass.
#[derive(Debug)]
#[must_use = "TargetOutcome should be checked for failures"]
pub enum TargetOutcome {
    /// Edits were applied and the result committed.
    Rewritten { target: String, replacements: usize },
    /// No pattern matched; nothing was written.
    Unmatched { target: String },
    /// The target was not processed.
    Skipped { target: String, reason: String },
    /// Processing failed; the target was left as it was.
    Failed { target: String, error: ReplaceError },
}

impl TargetOutcome {
    pub fn target(&self) -> &str {
        match self {
            TargetOutcome::Rewritten { target, .. }
            | TargetOutcome::Unmatched { target }
            | TargetOutcome::Skipped { target, .. }
            | TargetOutcome::Failed { target, .. } => target,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TargetOutcome::Failed { .. })
    }
}

impl fmt::Display for TargetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOutcome::Rewritten {
                target,
                replacements,
            } => write!(f, "Rewrote {} ({} replacements)", target, replacements),
            TargetOutcome::Unmatched { target } => write!(f, "No matches in {}", target),
            TargetOutcome::Skipped { target, reason } => {
                write!(f, "Skipped {}: {}", target, reason)
            }
            TargetOutcome::Failed { target, error } => write!(f, "Failed on {}: {}", target, error),
        }
    }
}

/// Outcomes of one handler invocation.
#[derive(Debug)]
pub struct PassReport {
    pub phase: Phase,
    pub outcomes: Vec<TargetOutcome>,
}

impl PassReport {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            outcomes: Vec::new(),
        }
    }

    pub fn rewritten(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TargetOutcome::Rewritten { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacerOptions {
    pub source_map: bool,
    pub target: InvocationPoint,
}

impl Default for ReplacerOptions {
    fn default() -> Self {
        Self {
            source_map: true,
            target: InvocationPoint::default(),
        }
    }
}

#[derive(Debug)]
pub struct Replacer {
    options: ReplacerOptions,
    patterns: Vec<PatternSpec>,
    filter: AssetFilter,
    rewriter: RangeRewriter,
}

impl Replacer {
    pub fn new(options: ReplacerOptions, patterns: Vec<PatternSpec>) -> Self {
        Self {
            options,
            patterns,
            filter: AssetFilter::default(),
            rewriter: RangeRewriter::new(options.source_map),
        }
    }

    pub fn with_filter(mut self, filter: AssetFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn options(&self) -> ReplacerOptions {
        self.options
    }

    pub fn patterns(&self) -> &[PatternSpec] {
        &self.patterns
    }

    pub fn filter(&self) -> &AssetFilter {
        &self.filter
    }

    /// Register with the host.
    ///
    /// Exactly one processing handler is tapped, at the phase of the
    /// configured invocation point. With source maps on, a build-module
    /// handler also asks every module for detailed maps.
    pub fn apply(self: &Rc<Self>, lifecycle: &mut dyn Lifecycle) {
        if self.options.source_map {
            lifecycle.tap(Phase::BuildModule, PLUGIN_NAME, Box::new(request_module_maps));
        }

        let replacer = Rc::clone(self);
        lifecycle.tap(
            self.options.target.phase(),
            PLUGIN_NAME,
            Box::new(move |compilation: &mut dyn Compilation| replacer.run(compilation)),
        );
    }

    /// One processing pass at the configured invocation point.
    pub fn run(&self, compilation: &mut dyn Compilation) -> Result<PassReport, ReplaceError> {
        match self.options.target {
            InvocationPoint::ModuleSource => Ok(self.process_modules(compilation.modules_mut())),
            InvocationPoint::AssetEmission | InvocationPoint::PostOptimization => {
                self.process_assets(compilation)
            }
        }
    }

    pub fn process_modules(&self, modules: &mut [ModuleKind]) -> PassReport {
        let mut report = PassReport::new(self.options.target.phase());

        for module in modules.iter_mut() {
            if let ModuleKind::Unknown { identifier, kind } = &*module {
                log::warn!(
                    "unsupported module type {} for replacing module sources: {}",
                    kind,
                    identifier
                );
                report.outcomes.push(TargetOutcome::Skipped {
                    target: identifier.clone(),
                    reason: format!("unsupported module type {kind}"),
                });
                continue;
            }

            for source in module.sources_mut() {
                let target = source.identifier().to_string();
                let outcome = match self.rewrite_target(source.source(), None) {
                    Ok(Some((artifact, replacements))) => {
                        source.set_source(artifact);
                        TargetOutcome::Rewritten {
                            target,
                            replacements,
                        }
                    }
                    Ok(None) => TargetOutcome::Unmatched { target },
                    Err(error) => {
                        log::warn!("{}: {}", target, error);
                        TargetOutcome::Failed {
                            target,
                            error: error.into(),
                        }
                    }
                };
                report.outcomes.push(outcome);
            }
        }

        report
    }

    /// Rewrite every eligible output file.
    ///
    /// Read and rewrite problems are reported per file. A failed write aborts
    /// the pass.
    pub fn process_assets(
        &self,
        compilation: &mut dyn Compilation,
    ) -> Result<PassReport, ReplaceError> {
        let mut report = PassReport::new(self.options.target.phase());
        let candidates = compilation.asset_candidates();
        let store = compilation.assets();

        for name in candidates {
            if !self.filter.matches(&name) {
                log::debug!("{} rejected by asset filter", name);
                continue;
            }
            if !self.patterns.iter().any(|p| applies(&name, p)) {
                continue;
            }

            let artifact = match store.get(&name) {
                Ok(Some(artifact)) => artifact,
                Ok(None) => {
                    log::debug!("{} is no longer in the store", name);
                    continue;
                }
                Err(StoreError::NotUtf8 { .. }) => {
                    report.outcomes.push(TargetOutcome::Skipped {
                        target: name,
                        reason: "not valid UTF-8".to_string(),
                    });
                    continue;
                }
                Err(error) => {
                    log::warn!("{}: {}", name, error);
                    report.outcomes.push(TargetOutcome::Failed {
                        target: name,
                        error: error.into(),
                    });
                    continue;
                }
            };

            let outcome = match self.rewrite_target(&artifact, Some(&name)) {
                Ok(Some((rewritten, replacements))) => {
                    store.set(&name, rewritten)?;
                    TargetOutcome::Rewritten {
                        target: name,
                        replacements,
                    }
                }
                Ok(None) => TargetOutcome::Unmatched { target: name },
                Err(error) => {
                    log::warn!("{}: {}", name, error);
                    TargetOutcome::Failed {
                        target: name,
                        error: error.into(),
                    }
                }
            };
            report.outcomes.push(outcome);
        }

        Ok(report)
    }

    /// Edits of every applicable pattern, all against the original `text`.
    ///
    /// Filename filters are only consulted when `filename` is given.
    pub fn collect_edits(&self, text: &str, filename: Option<&str>) -> Vec<Edit> {
        self.patterns
            .iter()
            .filter(|pattern| filename.map_or(true, |name| applies(name, pattern)))
            .flat_map(|pattern| {
                let edits = find_edits(pattern, text);
                log::debug!(
                    "{}: {} matches for {}",
                    filename.unwrap_or("<module>"),
                    edits.len(),
                    pattern.label()
                );
                edits
            })
            .collect()
    }

    fn rewrite_target(
        &self,
        artifact: &TextArtifact,
        filename: Option<&str>,
    ) -> Result<Option<(TextArtifact, usize)>, RewriteError> {
        let edits = self.collect_edits(&artifact.text, filename);
        if edits.is_empty() {
            return Ok(None);
        }
        let count = edits.len();
        Ok(Some((self.rewriter.rewrite(artifact, edits)?, count)))
    }
}

fn request_module_maps(compilation: &mut dyn Compilation) -> Result<PassReport, ReplaceError> {
    for module in compilation.modules_mut() {
        for source in module.sources_mut() {
            source.request_source_map();
        }
    }
    Ok(PassReport::new(Phase::BuildModule))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactStore, MemoryStore, SourceModule};
    use crate::edit::EditError;
    use crate::host::BuildHost;
    use crate::pattern::Replacement;
    use crate::sourcemap::SourceMap;
    use regex::Regex;

    fn pattern(search: &str, replacement: impl Into<Replacement>) -> PatternSpec {
        PatternSpec::new(Regex::new(search).unwrap(), replacement)
    }

    fn replacer(target: InvocationPoint, patterns: Vec<PatternSpec>) -> Rc<Replacer> {
        Rc::new(Replacer::new(
            ReplacerOptions {
                source_map: true,
                target,
            },
            patterns,
        ))
    }

    #[test]
    fn test_parse_invocation_points() {
        assert_eq!(
            "module-source".parse::<InvocationPoint>().unwrap(),
            InvocationPoint::ModuleSource
        );
        assert_eq!(
            "CHUNKS".parse::<InvocationPoint>().unwrap(),
            InvocationPoint::AssetEmission
        );
        assert_eq!(
            "post-assets".parse::<InvocationPoint>().unwrap(),
            InvocationPoint::PostOptimization
        );
    }

    #[test]
    fn test_unsupported_invocation_point_names_supported_set() {
        let err = "sideways".parse::<InvocationPoint>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'sideways'"));
        assert!(message.contains("module-source"));
        assert!(message.contains("post-optimization"));
    }

    #[test]
    fn test_apply_taps_configured_phase_only() {
        let mut host = BuildHost::new(MemoryStore::new());
        replacer(InvocationPoint::PostOptimization, vec![]).apply(&mut host);
        assert_eq!(
            host.tapped_phases(),
            vec![Phase::BuildModule, Phase::AfterOptimizeChunkAssets]
        );

        let mut host = BuildHost::new(MemoryStore::new());
        let plain = Rc::new(Replacer::new(
            ReplacerOptions {
                source_map: false,
                target: InvocationPoint::ModuleSource,
            },
            vec![],
        ));
        plain.apply(&mut host);
        assert_eq!(host.tapped_phases(), vec![Phase::OptimizeModules]);
    }

    #[test]
    fn test_asset_pass_rewrites_matching_files() {
        let mut store = MemoryStore::new();
        store.insert("main.js", TextArtifact::new("const v = \"VERSION=dev\";"));
        store.insert("style.css", TextArtifact::new("/* VERSION=dev */"));

        let mut host = BuildHost::new(store);
        replacer(
            InvocationPoint::AssetEmission,
            vec![pattern("VERSION=dev", "VERSION=1.2.3").with_suffix(".js")],
        )
        .apply(&mut host);

        let reports = host.run().unwrap();
        assert_eq!(reports.last().unwrap().rewritten(), 1);

        let assets = host.into_context().assets;
        assert_eq!(
            assets.artifact("main.js").unwrap().text,
            "const v = \"VERSION=1.2.3\";"
        );
        assert_eq!(assets.artifact("style.css").unwrap().text, "/* VERSION=dev */");
    }

    #[test]
    fn test_patterns_are_pooled_against_original_text() {
        let mut store = MemoryStore::new();
        store.insert("a.js", TextArtifact::new("a b"));

        let replacer = replacer(
            InvocationPoint::AssetEmission,
            vec![pattern("a", "b"), pattern("b", "c")],
        );
        let mut host = BuildHost::new(store);
        replacer.apply(&mut host);
        host.run().unwrap();

        assert_eq!(host.context().assets.artifact("a.js").unwrap().text, "b c");
    }

    #[test]
    fn test_overlapping_patterns_leave_target_untouched() {
        let mut store = MemoryStore::new();
        store.insert("a.js", TextArtifact::new("abcdef"));
        store.insert("b.js", TextArtifact::new("xyz"));

        let replacer = replacer(
            InvocationPoint::AssetEmission,
            vec![pattern("bcd", "1"), pattern("cde", "2"), pattern("y", "Y")],
        );
        let mut host = BuildHost::new(store);
        replacer.apply(&mut host);
        let reports = host.run().unwrap();
        let report = reports.last().unwrap();

        let failed: Vec<_> = report.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].target(), "a.js");
        let TargetOutcome::Failed { error, .. } = failed[0] else {
            panic!("expected failure");
        };
        assert!(matches!(
            error,
            ReplaceError::Rewrite(RewriteError::Edit(EditError::OverlappingEdits { .. }))
        ));

        let assets = &host.context().assets;
        assert_eq!(assets.artifact("a.js").unwrap().text, "abcdef");
        assert_eq!(assets.artifact("b.js").unwrap().text, "xYz");
    }

    #[test]
    fn test_unmatched_file_is_not_written() {
        let mut store = MemoryStore::new();
        store.insert("a.js", TextArtifact::new("nothing here"));
        let replacer = replacer(InvocationPoint::AssetEmission, vec![pattern("dev", "prod")]);

        let mut host = BuildHost::new(store);
        replacer.apply(&mut host);
        let reports = host.run().unwrap();

        assert!(matches!(
            reports.last().unwrap().outcomes[0],
            TargetOutcome::Unmatched { .. }
        ));
    }

    #[test]
    fn test_asset_filter_runs_first() {
        let mut store = MemoryStore::new();
        store.insert("vendor.js", TextArtifact::new("dev"));
        store.insert("main.js", TextArtifact::new("dev"));

        let replacer = Rc::new(
            Replacer::new(ReplacerOptions::default(), vec![pattern("dev", "prod")]).with_filter(
                AssetFilter {
                    exclude: vec![Regex::new("^vendor").unwrap()],
                    ..AssetFilter::default()
                },
            ),
        );
        let mut host = BuildHost::new(store);
        replacer.apply(&mut host);
        host.run().unwrap();

        let assets = &host.context().assets;
        assert_eq!(assets.artifact("vendor.js").unwrap().text, "dev");
        assert_eq!(assets.artifact("main.js").unwrap().text, "prod");
    }

    #[test]
    fn test_source_map_follows_rewrite() {
        let map = SourceMap::from_json(
            r#"{"version":3,"sources":["a.ts"],"names":[],"mappings":"AAAA,IAAI"}"#,
        )
        .unwrap();
        let mut store = MemoryStore::new();
        store.insert("a.js", TextArtifact::with_source_map("var dev", map));

        let replacer = replacer(InvocationPoint::AssetEmission, vec![pattern("dev", "prod")]);
        let mut host = BuildHost::new(store);
        replacer.apply(&mut host);
        host.run().unwrap();

        let out = host.context().assets.get("a.js").unwrap().unwrap();
        assert_eq!(out.text, "var prod");
        assert_eq!(out.source_map.unwrap().mappings, "AAAA,IAAI");
    }

    #[test]
    fn test_module_pass_rewrites_supported_kinds() {
        let modules = vec![
            ModuleKind::Simple(SourceModule::new(
                "./src/a.js",
                TextArtifact::new("const build = 'build-41';"),
            )),
            ModuleKind::Composite {
                identifier: "./src/concat.js".to_string(),
                parts: vec![
                    SourceModule::new("./src/b.js", TextArtifact::new("build-7")),
                    SourceModule::new("./src/c.js", TextArtifact::new("none")),
                ],
            },
            ModuleKind::Unknown {
                identifier: "external react".to_string(),
                kind: "ExternalModule".to_string(),
            },
        ];

        let bump = Replacement::computed(|m| {
            let n: u32 = m.group(1).and_then(|g| g.parse().ok()).unwrap_or(0);
            format!("build-{}", n + 1)
        });
        let replacer = replacer(
            InvocationPoint::ModuleSource,
            vec![pattern(r"build-(\d+)", bump)],
        );

        let mut host = BuildHost::new(MemoryStore::new()).with_modules(modules);
        replacer.apply(&mut host);
        let reports = host.run().unwrap();
        let report = reports.last().unwrap();

        assert_eq!(report.rewritten(), 2);
        assert!(report.outcomes.iter().any(|o| matches!(
            o,
            TargetOutcome::Skipped { target, .. } if target == "external react"
        )));

        let context = host.into_context();
        let ModuleKind::Simple(a) = &context.modules[0] else {
            panic!("expected simple module");
        };
        assert_eq!(a.source().text, "const build = 'build-42';");
        assert!(a.uses_source_map());

        let ModuleKind::Composite { parts, .. } = &context.modules[1] else {
            panic!("expected composite module");
        };
        assert_eq!(parts[0].source().text, "build-8");
        assert_eq!(parts[1].source().text, "none");
        assert_eq!(
            context.modules[2],
            ModuleKind::Unknown {
                identifier: "external react".to_string(),
                kind: "ExternalModule".to_string(),
            }
        );
    }

    #[test]
    fn test_second_pass_finds_nothing() {
        let mut store = MemoryStore::new();
        store.insert("a.js", TextArtifact::new("VERSION=dev"));
        let replacer = replacer(
            InvocationPoint::AssetEmission,
            vec![pattern("VERSION=dev", "VERSION=1.2.3")],
        );

        let mut host = BuildHost::new(store);
        replacer.apply(&mut host);
        host.run().unwrap();
        let second = host.run().unwrap();

        assert_eq!(second.last().unwrap().rewritten(), 0);
        assert_eq!(
            host.context().assets.artifact("a.js").unwrap().text,
            "VERSION=1.2.3"
        );
    }
}
