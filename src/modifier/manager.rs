use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::Path;

use super::ShaderModification;
use crate::id::{ShaderId, SourceKind};
use crate::source::{collect_files, id_for_relative_path};

/// Modifications registered per target file, in application order.
#[derive(Debug, Default)]
pub struct ShaderModificationManager {
    modifications: HashMap<(ShaderId, SourceKind), Vec<ShaderModification>>,
}

impl ShaderModificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a modification. Higher priorities apply first; equal
    /// priorities keep registration order.
    pub fn add(&mut self, target: ShaderId, kind: SourceKind, modification: ShaderModification) {
        let list = self.modifications.entry((target, kind)).or_default();
        list.push(modification);
        list.sort_by_key(|modification| Reverse(modification.priority()));
    }

    pub fn get(&self, target: &ShaderId, kind: SourceKind) -> &[ShaderModification] {
        self.modifications
            .get(&(target.clone(), kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn targets(&self) -> impl Iterator<Item = &(ShaderId, SourceKind)> {
        self.modifications.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    /// Loads every modification below `root`. A file at
    /// `<root>/<namespace>/<path>.<extension>` targets `namespace:path` of the
    /// kind named by the extension. Unreadable or malformed files are logged
    /// and skipped. Returns the number of modifications loaded.
    pub fn load_dir(&mut self, root: &Path) -> usize {
        let mut files = Vec::new();
        if let Err(e) = collect_files(root, &mut files) {
            log::error!("Failed to list modifications in {}: {}", root.display(), e);
            return 0;
        }
        files.sort();

        let mut loaded = 0;
        for path in files {
            let Some((target, kind)) = path
                .strip_prefix(root)
                .ok()
                .and_then(id_for_relative_path)
            else {
                log::warn!("Ignoring modification with unrecognized path {}", path.display());
                continue;
            };
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    log::error!("Failed to read modification {}: {}", path.display(), e);
                    continue;
                }
            };
            match ShaderModification::parse(&text) {
                Ok(modification) => {
                    log::debug!("Loaded modification for {} {}", kind, target);
                    self.add(target, kind, modification);
                    loaded += 1;
                }
                Err(e) => log::error!("Invalid modification {}:{}", path.display(), e),
            }
        }
        log::info!("Loaded {} shader modification(s) from {}", loaded, root.display());
        loaded
    }
}
