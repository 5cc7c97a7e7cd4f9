use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Something that reports changed files since the last call.
pub trait ChangeSource {
    fn take_changes(&self) -> Vec<PathBuf>;
}

type ChangedPaths = Arc<Mutex<BTreeSet<PathBuf>>>;

fn lock(changed: &ChangedPaths) -> MutexGuard<'_, BTreeSet<PathBuf>> {
    // A panicking watcher callback cannot leave the set half-updated.
    changed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Watches directories recursively and collects the paths of changed files.
pub struct HotReloader {
    watcher: RecommendedWatcher,
    changed: ChangedPaths,
}

impl HotReloader {
    pub fn new<P: AsRef<Path>>(path: P) -> notify::Result<Self> {
        let changed: ChangedPaths = Arc::new(Mutex::new(BTreeSet::new()));
        let changed_clone = changed.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        lock(&changed_clone).extend(event.paths);
                    }
                }
                Err(e) => log::warn!("File watcher error: {}", e),
            },
            Config::default(),
        )?;

        watcher.watch(path.as_ref(), RecursiveMode::Recursive)?;
        log::info!("Watching {} for changes", path.as_ref().display());

        Ok(Self { watcher, changed })
    }

    /// Also watches `path`, e.g. a second source root.
    pub fn watch<P: AsRef<Path>>(&mut self, path: P) -> notify::Result<()> {
        self.watcher.watch(path.as_ref(), RecursiveMode::Recursive)?;
        log::info!("Watching {} for changes", path.as_ref().display());
        Ok(())
    }

    pub fn check_for_changes(&self) -> bool {
        !lock(&self.changed).is_empty()
    }
}

impl ChangeSource for HotReloader {
    fn take_changes(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *lock(&self.changed)).into_iter().collect()
    }
}

/// Change source fed by hand.
#[derive(Default)]
pub struct MockHotReloader {
    changed: ChangedPaths,
}

impl MockHotReloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn simulate_file_change<P: AsRef<Path>>(&self, path: P) {
        lock(&self.changed).insert(path.as_ref().to_path_buf());
    }

    pub fn check_for_changes(&self) -> bool {
        !lock(&self.changed).is_empty()
    }
}

impl ChangeSource for MockHotReloader {
    fn take_changes(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *lock(&self.changed)).into_iter().collect()
    }
}
