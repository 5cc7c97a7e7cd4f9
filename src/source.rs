use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::error::ShaderError;
use crate::id::{ShaderId, SourceKind};

/// Resolves a logical shader identifier to its source text.
pub trait SourceProvider {
    fn open(&self, id: &ShaderId, kind: SourceKind) -> Result<String, ShaderError>;
}

/// Reads `<root>/<namespace>/<path>.<extension>` from disk.
pub struct FileSourceProvider {
    root: PathBuf,
}

impl FileSourceProvider {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, id: &ShaderId, kind: SourceKind) -> PathBuf {
        self.root
            .join(id.namespace())
            .join(format!("{}.{}", id.path(), kind.extension()))
    }

    /// Inverse of [`FileSourceProvider::path_for`], used to map file change
    /// notifications back to shader identifiers.
    pub fn id_for_path(&self, path: &Path) -> Option<(ShaderId, SourceKind)> {
        id_for_relative_path(path.strip_prefix(&self.root).ok()?)
    }
}

/// Maps `<namespace>/<path>.<extension>` to an identifier and source kind.
pub(crate) fn id_for_relative_path(relative: &Path) -> Option<(ShaderId, SourceKind)> {
    let kind = SourceKind::from_extension(relative.extension()?.to_str()?)?;
    let mut segments = Vec::new();
    for component in relative.with_extension("").components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?.to_string()),
            _ => return None,
        }
    }
    if segments.len() < 2 {
        return None;
    }
    let namespace = segments.remove(0);
    ShaderId::new(&namespace, &segments.join("/"))
        .ok()
        .map(|id| (id, kind))
}

/// Every file below `dir`, recursively.
pub(crate) fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

impl SourceProvider for FileSourceProvider {
    fn open(&self, id: &ShaderId, kind: SourceKind) -> Result<String, ShaderError> {
        let path = self.path_for(id, kind);
        std::fs::read_to_string(&path).map_err(|e| ShaderError::SourceNotFound {
            id: id.clone(),
            kind,
            reason: format!("{} ({})", e, path.display()),
        })
    }
}

/// In-memory sources, used for embedded shaders and tests. Counts lookups.
#[derive(Default)]
pub struct MemorySourceProvider {
    sources: HashMap<(ShaderId, SourceKind), String>,
    lookups: Cell<usize>,
}

impl MemorySourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ShaderId, kind: SourceKind, source: impl Into<String>) {
        self.sources.insert((id, kind), source.into());
    }

    pub fn with(mut self, id: &str, kind: SourceKind, source: impl Into<String>) -> Self {
        match id.parse() {
            Ok(id) => self.insert(id, kind, source),
            Err(e) => log::warn!("Ignoring embedded source: {}", e),
        }
        self
    }

    /// Number of `open` calls made so far.
    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }
}

impl SourceProvider for MemorySourceProvider {
    fn open(&self, id: &ShaderId, kind: SourceKind) -> Result<String, ShaderError> {
        self.lookups.set(self.lookups.get() + 1);
        self.sources
            .get(&(id.clone(), kind))
            .cloned()
            .ok_or_else(|| ShaderError::SourceNotFound {
                id: id.clone(),
                kind,
                reason: "no such source".to_string(),
            })
    }
}
