//! Bundle Replace: regex substitution over bundler output
//!
//! Runs a list of search/replace rules against module sources or emitted
//! output files at a chosen point of the build lifecycle, keeping source maps
//! accurate across the rewrite.
//!
//! # Architecture
//!
//! Every substitution compiles down to one primitive: [`Edit`], a byte-span
//! replacement against the original text of a target. Matching
//! ([`Matcher`]) only produces edits. All edits for a target are realized in a
//! single pass by [`RangeRewriter`], which also re-anchors the target's
//! source map mappings.
//!
//! # Guarantees
//!
//! - Edits from all rules are found against the original text
//! - Conflicting edits leave the target untouched
//! - Output files are written atomically (tempfile + fsync + rename)
//! - Non-UTF-8 files are skipped, never corrupted
//!
//! # Example
//!
//! ```
//! use bundle_replace::{
//!     ArtifactStore, BuildHost, MemoryStore, PatternSpec, Replacer, ReplacerOptions,
//!     TextArtifact,
//! };
//! use regex::Regex;
//! use std::rc::Rc;
//!
//! let mut assets = MemoryStore::new();
//! assets.insert("main.js", TextArtifact::new("const v = 'VERSION=dev';"));
//!
//! let replacer = Rc::new(Replacer::new(
//!     ReplacerOptions::default(),
//!     vec![PatternSpec::new(Regex::new("VERSION=dev").unwrap(), "VERSION=1.2.3")],
//! ));
//!
//! let mut host = BuildHost::new(assets);
//! replacer.apply(&mut host);
//! host.run().unwrap();
//!
//! let main = host.context().assets.get("main.js").unwrap().unwrap();
//! assert_eq!(main.text, "const v = 'VERSION=1.2.3';");
//! ```

pub mod artifact;
pub mod config;
pub mod edit;
pub mod host;
pub mod matcher;
pub mod pattern;
pub mod replacer;
pub mod rewrite;
pub mod select;
pub mod sourcemap;
pub mod store;

// Re-exports
pub use artifact::{
    ArtifactStore, MemoryStore, ModuleKind, SourceModule, StoreError, TextArtifact,
};
pub use config::{
    load_from_path, load_from_str, load_replacer, replacer_from_str, ConfigError, Overrides,
    ReplaceConfig,
};
pub use edit::{Edit, EditError};
pub use host::{BuildContext, BuildHost, Compilation, Handler, Lifecycle, Phase};
pub use matcher::{find_edits, Matcher, Substitution};
pub use pattern::{Match, PatternSpec, Replacement};
pub use replacer::{
    InvocationPoint, PassReport, ReplaceError, Replacer, ReplacerOptions, TargetOutcome,
};
pub use rewrite::{RangeRewriter, RewriteError};
pub use select::{applies, AssetFilter};
pub use sourcemap::{Mapping, OriginalLocation, SourceMap, SourceMapError};
pub use store::DirStore;
