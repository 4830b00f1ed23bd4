//! Output directory as an artifact store.
//!
//! Every regular file under the root is an asset named by its `/`-separated
//! path relative to the root. A `<name>.map` file next to an asset is read as
//! that asset's source map and is never itself a candidate. A `.map` file
//! with no asset beside it is an ordinary asset.

use crate::artifact::{ArtifactStore, StoreError, TextArtifact};
use crate::sourcemap::SourceMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

const MAP_SUFFIX: &str = ".map";

#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
    names: Vec<String>,
    /// Whether `<name>.map` companions are loaded on `get`.
    read_maps: bool,
    /// Writes held back instead of touching disk.
    pending: Option<BTreeMap<String, TextArtifact>>,
}

impl DirStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let mut files = Vec::new();

        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| StoreError::Io {
                path: e.path().map_or_else(|| root.clone(), Path::to_path_buf),
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push(name);
        }

        let present: BTreeSet<&str> = files.iter().map(String::as_str).collect();
        let names = files
            .iter()
            .filter(|name| {
                name.strip_suffix(MAP_SUFFIX)
                    .map_or(true, |asset| !present.contains(asset))
            })
            .cloned()
            .collect();

        Ok(Self {
            root,
            names,
            read_maps: true,
            pending: None,
        })
    }

    /// Leave `<name>.map` companions unread; assets come back without maps.
    pub fn without_source_maps(mut self) -> Self {
        self.read_maps = false;
        self
    }

    /// Keep writes in memory; reads see them, the directory does not.
    pub fn dry_run(mut self) -> Self {
        self.pending = Some(BTreeMap::new());
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.pending.is_some()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        name.split('/').fold(self.root.clone(), |path, part| path.join(part))
    }

    fn map_path_of(&self, name: &str) -> PathBuf {
        self.path_of(&format!("{name}{MAP_SUFFIX}"))
    }

    fn read_map(&self, name: &str) -> Result<Option<SourceMap>, StoreError> {
        let path = self.map_path_of(name);
        if !path.is_file() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        SourceMap::from_json(&json)
            .map(Some)
            .map_err(|source| StoreError::SourceMap {
                name: name.to_string(),
                source,
            })
    }
}

impl ArtifactStore for DirStore {
    fn names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn get(&self, name: &str) -> Result<Option<TextArtifact>, StoreError> {
        if let Some(artifact) = self.pending.as_ref().and_then(|p| p.get(name)) {
            return Ok(Some(artifact.clone()));
        }

        let path = self.path_of(name);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|_| StoreError::NotUtf8 {
            name: name.to_string(),
        })?;

        let source_map = if self.read_maps {
            self.read_map(name)?
        } else {
            None
        };
        Ok(Some(TextArtifact { text, source_map }))
    }

    fn set(&mut self, name: &str, artifact: TextArtifact) -> Result<(), StoreError> {
        if let Some(pending) = self.pending.as_mut() {
            pending.insert(name.to_string(), artifact);
            return Ok(());
        }

        let map_json = artifact
            .source_map
            .as_ref()
            .map(|map| {
                map.to_json().map_err(|source| StoreError::SourceMap {
                    name: name.to_string(),
                    source,
                })
            })
            .transpose()?;

        // Both files are staged before either replaces what is on disk.
        let path = self.path_of(name);
        let map_path = self.map_path_of(name);
        let text = stage(&path, artifact.text.as_bytes())?;
        match map_json {
            Some(json) => {
                let map = stage(&map_path, json.as_bytes())?;
                commit(map, &map_path)?;
            }
            None if map_path.is_file() => {
                log::warn!(
                    "{} was rewritten without a source map; {} no longer matches it",
                    name,
                    map_path.display()
                );
            }
            None => {}
        }
        commit(text, &path)?;

        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
        Ok(())
    }
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `content` to a synced temp file beside `path`.
///
/// Dropping the result without [`commit`] removes the temp file.
fn stage(path: &Path, content: &[u8]) -> Result<NamedTempFile, StoreError> {
    let parent = path.parent().ok_or_else(|| {
        io_error(path)(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        ))
    })?;
    fs::create_dir_all(parent).map_err(io_error(path))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(io_error(path))?;
    temp.write_all(content).map_err(io_error(path))?;
    temp.as_file().sync_all().map_err(io_error(path))?;
    Ok(temp)
}

/// Rename a staged file over `path`.
fn commit(staged: NamedTempFile, path: &Path) -> Result<(), StoreError> {
    staged
        .persist(path)
        .map(|_| ())
        .map_err(|e| io_error(path)(e.error))
}
