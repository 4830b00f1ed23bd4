//! Artifacts and the containers the host keeps them in.
//!
//! A [`TextArtifact`] is one module's or one output file's content at a point
//! in the pipeline. The replacer never edits one in place: it builds a new
//! artifact and hands it back through [`ArtifactStore::set`] or
//! [`SourceModule::set_source`].

use crate::sourcemap::{SourceMap, SourceMapError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextArtifact {
    pub text: String,
    pub source_map: Option<SourceMap>,
}

impl TextArtifact {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_map: None,
        }
    }

    pub fn with_source_map(text: impl Into<String>, source_map: SourceMap) -> Self {
        Self {
            text: text.into(),
            source_map: Some(source_map),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid source map for {name}: {source}")]
    SourceMap {
        name: String,
        #[source]
        source: SourceMapError,
    },

    #[error("artifact {name} is not valid UTF-8")]
    NotUtf8 { name: String },
}

/// Named output files of a compilation.
pub trait ArtifactStore {
    /// Every artifact name currently in the store, in a stable order.
    fn names(&self) -> Vec<String>;

    fn get(&self, name: &str) -> Result<Option<TextArtifact>, StoreError>;

    fn set(&mut self, name: &str, artifact: TextArtifact) -> Result<(), StoreError>;
}

/// Ordered in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    artifacts: BTreeMap<String, TextArtifact>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, artifact: TextArtifact) {
        self.artifacts.insert(name.into(), artifact);
    }

    pub fn artifact(&self, name: &str) -> Option<&TextArtifact> {
        self.artifacts.get(name)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl ArtifactStore for MemoryStore {
    fn names(&self) -> Vec<String> {
        self.artifacts.keys().cloned().collect()
    }

    fn get(&self, name: &str) -> Result<Option<TextArtifact>, StoreError> {
        Ok(self.artifacts.get(name).cloned())
    }

    fn set(&mut self, name: &str, artifact: TextArtifact) -> Result<(), StoreError> {
        self.artifacts.insert(name.to_string(), artifact);
        Ok(())
    }
}

/// A module whose source body the replacer can read and replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceModule {
    identifier: String,
    source: TextArtifact,
    use_source_map: bool,
}

impl SourceModule {
    pub fn new(identifier: impl Into<String>, source: TextArtifact) -> Self {
        Self {
            identifier: identifier.into(),
            source,
            use_source_map: false,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn source(&self) -> &TextArtifact {
        &self.source
    }

    pub fn set_source(&mut self, source: TextArtifact) {
        self.source = source;
    }

    /// Ask the host to keep detailed source maps for this module.
    pub fn request_source_map(&mut self) {
        self.use_source_map = true;
    }

    pub fn uses_source_map(&self) -> bool {
        self.use_source_map
    }
}

/// The module shapes a compilation can hand to the replacer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    /// A module with one source body.
    Simple(SourceModule),
    /// A module assembled from several constituent modules.
    Composite {
        identifier: String,
        parts: Vec<SourceModule>,
    },
    /// Anything else. Left untouched.
    Unknown { identifier: String, kind: String },
}

impl ModuleKind {
    pub fn identifier(&self) -> &str {
        match self {
            ModuleKind::Simple(module) => module.identifier(),
            ModuleKind::Composite { identifier, .. } | ModuleKind::Unknown { identifier, .. } => {
                identifier
            }
        }
    }

    /// Source-bearing modules inside this one.
    pub fn sources_mut(&mut self) -> &mut [SourceModule] {
        match self {
            ModuleKind::Simple(module) => std::slice::from_mut(module),
            ModuleKind::Composite { parts, .. } => parts,
            ModuleKind::Unknown { .. } => &mut [],
        }
    }
}
