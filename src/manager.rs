//! Owns every program of an application and keeps them compiled.
//!
//! Loading is best effort: a file that cannot be read or parsed is logged and
//! skipped. A program that fails to recompile keeps its previous build
//! resident until a later attempt succeeds. Modifications are loaded once
//! when the manager is created; changing them requires a restart.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use crate::compiler::ShaderCompiler;
use crate::config::{Config, ConfigError};
use crate::definitions::ShaderPreDefinitions;
use crate::device::GraphicsDevice;
use crate::error::ShaderError;
use crate::hot_reload::ChangeSource;
use crate::id::{ShaderId, SourceKind};
use crate::modifier::ShaderModificationManager;
use crate::processor::VersionProcessor;
use crate::program::{ProgramDefinition, ShaderProgram};
use crate::source::{FileSourceProvider, collect_files};

const PROGRAM_EXTENSION: &str = "toml";

/// Failures collected from a batch operation, one per program.
pub type ProgramErrors = Vec<(ShaderId, ShaderError)>;

pub struct ShaderManager<D: GraphicsDevice> {
    compiler: ShaderCompiler<D>,
    definitions: ShaderPreDefinitions,
    program_definitions: BTreeMap<ShaderId, ProgramDefinition>,
    programs: BTreeMap<ShaderId, ShaderProgram>,
    source_files: Option<FileSourceProvider>,
    programs_root: Option<PathBuf>,
}

impl<D: GraphicsDevice> ShaderManager<D> {
    pub fn new(compiler: ShaderCompiler<D>) -> Self {
        Self {
            compiler,
            definitions: ShaderPreDefinitions::new(),
            program_definitions: BTreeMap::new(),
            programs: BTreeMap::new(),
            source_files: None,
            programs_root: None,
        }
    }

    /// Builds a manager from a validated config: file sources, modifications,
    /// capabilities, the default `#version`, the initial definitions and the
    /// program definitions below `sources.programs`.
    pub fn from_config(config: &Config, device: D) -> Result<Self, ConfigError> {
        let version = VersionProcessor::new(&config.compiler.default_version)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let mut modifications = ShaderModificationManager::new();
        for dir in &config.sources.modifiers {
            modifications.load_dir(dir);
        }
        if !modifications.is_empty() {
            log::info!("Modifications target {} file(s)", modifications.targets().count());
        }

        let mut builder = ShaderCompiler::builder(device)
            .provider(Rc::new(FileSourceProvider::new(&config.sources.root)))
            .capabilities(config.capabilities.into())
            .default_version(version);
        if !modifications.is_empty() {
            builder = builder.modifications(Rc::new(modifications));
        }
        if config.compiler.verbose_errors {
            builder = builder.verbose_errors(true);
        }

        let mut manager = Self::new(builder.build());
        manager.source_files = Some(FileSourceProvider::new(&config.sources.root));
        manager.definitions = ShaderPreDefinitions::from_map(config.definitions.clone());
        if let Some(programs) = &config.sources.programs {
            manager.load_programs(programs);
        }
        Ok(manager)
    }

    pub fn compiler(&self) -> &ShaderCompiler<D> {
        &self.compiler
    }

    pub fn compiler_mut(&mut self) -> &mut ShaderCompiler<D> {
        &mut self.compiler
    }

    pub fn device(&self) -> &D {
        self.compiler.device()
    }

    pub fn device_mut(&mut self) -> &mut D {
        self.compiler.device_mut()
    }

    pub fn definitions(&self) -> &ShaderPreDefinitions {
        &self.definitions
    }

    /// Root that changed source paths are resolved against.
    pub fn set_source_root<P: AsRef<Path>>(&mut self, root: P) {
        self.source_files = Some(FileSourceProvider::new(root));
    }

    /// Registers a program. A duplicate identifier is warned about and the
    /// first definition kept.
    pub fn add_program(&mut self, id: ShaderId, definition: ProgramDefinition) -> bool {
        if self.program_definitions.contains_key(&id) {
            log::warn!("Duplicate program definition {}, keeping the first", id);
            return false;
        }
        self.program_definitions.insert(id, definition);
        true
    }

    /// Loads every `<dir>/<namespace>/<path>.toml` as program
    /// `namespace:path`. Returns the number of definitions added.
    pub fn load_programs<P: AsRef<Path>>(&mut self, dir: P) -> usize {
        let dir = dir.as_ref();
        self.programs_root = Some(dir.to_path_buf());
        let mut files = Vec::new();
        if let Err(e) = collect_files(dir, &mut files) {
            log::error!("Failed to list programs in {}: {}", dir.display(), e);
            return 0;
        }
        files.sort();

        let mut loaded = 0;
        for path in files {
            let Some(id) = path.strip_prefix(dir).ok().and_then(program_id_for_relative_path) else {
                log::debug!("Skipping {}", path.display());
                continue;
            };
            match ProgramDefinition::load(&id.to_string(), &path) {
                Ok(definition) => {
                    if self.add_program(id, definition) {
                        loaded += 1;
                    }
                }
                Err(e) => log::error!("{}", e),
            }
        }
        log::info!("Loaded {} program definition(s) from {}", loaded, dir.display());
        loaded
    }

    pub fn program(&self, id: &ShaderId) -> Option<&ShaderProgram> {
        self.programs.get(id)
    }

    pub fn program_mut(&mut self, id: &ShaderId) -> Option<&mut ShaderProgram> {
        self.programs.get_mut(id)
    }

    pub fn program_definition(&self, id: &ShaderId) -> Option<&ProgramDefinition> {
        self.program_definitions.get(id)
    }

    /// Identifiers of every registered program.
    pub fn program_ids(&self) -> impl Iterator<Item = &ShaderId> {
        self.program_definitions.keys()
    }

    /// Compiles every registered program, continuing past failures.
    pub fn compile_all(&mut self) -> ProgramErrors {
        let ids: Vec<ShaderId> = self.program_definitions.keys().cloned().collect();
        let errors = self.recompile_each(ids.iter());
        log::info!(
            "Compiled {} of {} program(s)",
            ids.len() - errors.len(),
            ids.len()
        );
        errors
    }

    /// Builds `id` into a fresh program. On success the new program replaces
    /// the resident one and takes over its samplers. On failure the resident
    /// program, if any, stays in use.
    pub fn recompile(&mut self, id: &ShaderId) -> Result<(), ShaderError> {
        let definition = self
            .program_definitions
            .get(id)
            .ok_or_else(|| ShaderError::Definition {
                id: id.to_string(),
                reason: "no such program".to_string(),
            })?;

        let mut program = ShaderProgram::new(id.clone());
        if let Err(e) = program.compile(&mut self.compiler, definition, &self.definitions) {
            if self.programs.contains_key(id) {
                log::error!("Failed to recompile {}, keeping the previous build: {}", id, e);
            } else {
                log::error!("Failed to compile {}: {}", id, e);
            }
            return Err(e);
        }

        if let Some(mut old) = self.programs.remove(id) {
            program.copy_samplers_from(&old);
            old.free(&mut self.compiler);
        }
        log::info!("Compiled program {}", id);
        self.programs.insert(id.clone(), program);
        Ok(())
    }

    fn recompile_each<'a>(&mut self, ids: impl Iterator<Item = &'a ShaderId>) -> ProgramErrors {
        ids.filter_map(|id| self.recompile(id).err().map(|e| (id.clone(), e)))
            .collect()
    }

    pub fn set_definition(&mut self, name: &str, value: impl Into<String>) -> bool {
        self.definitions.set(name, value)
    }

    pub fn remove_definition(&mut self, name: &str) -> bool {
        self.definitions.remove(name)
    }

    pub fn set_static_definition(&mut self, name: &str, value: impl Into<String>) -> bool {
        self.definitions.set_static(name, value)
    }

    /// Recompiles the programs that depend on a definition changed since the
    /// last call, plus programs that have no resident build. Names used by a
    /// program that fails stay dirty.
    pub fn recompile_dirty(&mut self) -> ProgramErrors {
        let dirty = self.definitions.take_dirty();
        if dirty.is_empty() {
            return Vec::new();
        }
        let ids: Vec<ShaderId> = self
            .program_definitions
            .keys()
            .filter(|id| match self.programs.get(*id) {
                Some(program) => dirty.iter().any(|name| program.depends_on(name)),
                None => true,
            })
            .cloned()
            .collect();
        log::debug!("Definitions {:?} changed, recompiling {} program(s)", dirty, ids.len());
        let errors = self.recompile_each(ids.iter());

        // Failed programs are retried on the next call.
        for (id, _) in &errors {
            let pending: Vec<&String> = match self.programs.get(id) {
                Some(program) => dirty.iter().filter(|name| program.depends_on(name)).collect(),
                None => dirty.iter().collect(),
            };
            self.definitions.mark_dirty(pending);
        }
        errors
    }

    /// Recompiles the programs built from any of the changed sources.
    pub fn sources_changed(&mut self, changed: &[(ShaderId, SourceKind)]) -> ProgramErrors {
        let changed: BTreeSet<&ShaderId> = changed.iter().map(|(id, _)| id).collect();
        let ids: Vec<ShaderId> = self
            .program_definitions
            .iter()
            .filter(|(id, definition)| {
                let declared = definition
                    .stages()
                    .into_iter()
                    .any(|(_, stage)| changed.contains(stage));
                let used = self
                    .programs
                    .get(*id)
                    .is_some_and(|program| program.sources().iter().any(|s| changed.contains(s)));
                declared || used
            })
            .map(|(id, _)| id.clone())
            .collect();
        self.recompile_each(ids.iter())
    }

    /// Reloads a program definition file and rebuilds the program.
    pub fn reload_program(&mut self, id: ShaderId, path: &Path) -> Result<(), ShaderError> {
        let definition = ProgramDefinition::load(&id.to_string(), path).inspect_err(|e| {
            log::error!("{}", e);
        })?;
        self.program_definitions.insert(id.clone(), definition);
        self.recompile(&id)
    }

    /// Applies the file changes reported by `changes`: changed program
    /// definitions are reloaded, changed sources trigger recompiles of the
    /// programs using them.
    pub fn poll_hot_reload(&mut self, changes: &dyn ChangeSource) -> ProgramErrors {
        let paths = changes.take_changes();
        if paths.is_empty() {
            return Vec::new();
        }

        let mut errors = Vec::new();
        let mut sources = Vec::new();
        for path in paths {
            if let Some(id) = self.changed_program(&path) {
                if let Err(e) = self.reload_program(id.clone(), &path) {
                    errors.push((id, e));
                }
                continue;
            }
            match self.source_files.as_ref().and_then(|files| files.id_for_path(&path)) {
                Some(source) => sources.push(source),
                None => log::debug!("Ignoring change to {}", path.display()),
            }
        }
        if !sources.is_empty() {
            log::info!("{} shader source(s) changed", sources.len());
            errors.extend(self.sources_changed(&sources));
        }
        errors
    }

    fn changed_program(&self, path: &Path) -> Option<ShaderId> {
        let relative = path.strip_prefix(self.programs_root.as_deref()?).ok()?;
        let id = program_id_for_relative_path(relative)?;
        if !path.is_file() {
            // Removed definitions keep their resident program.
            log::debug!("Program definition {} is gone", path.display());
            return None;
        }
        Some(id)
    }

    /// Releases every program and every shader object.
    pub fn free(&mut self) {
        for (_, mut program) in std::mem::take(&mut self.programs) {
            program.free(&mut self.compiler);
        }
        self.compiler.free();
    }
}

/// Maps `<namespace>/<path>.toml` to `namespace:path`.
fn program_id_for_relative_path(relative: &Path) -> Option<ShaderId> {
    if relative.extension()?.to_str()? != PROGRAM_EXTENSION {
        return None;
    }
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
    ShaderId::new(&namespace, &segments.join("/")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use crate::hot_reload::MockHotReloader;
    use crate::id::ShaderKind;
    use crate::source::MemorySourceProvider;

    const VERTEX: &str = "void main() {\n    gl_Position = vec4(0.0);\n}\n";
    const FOGGY: &str = "out vec4 color;\n#ifdef USE_FOG\nuniform float fog;\n#endif\nvoid main() {\n    color = vec4(1.0);\n}\n";

    fn id(s: &str) -> ShaderId {
        s.parse().unwrap()
    }

    fn manager() -> ShaderManager<HeadlessDevice> {
        let provider = MemorySourceProvider::new()
            .with("demo:fog", SourceKind::Shader(ShaderKind::Vertex), VERTEX)
            .with("demo:fog", SourceKind::Shader(ShaderKind::Fragment), FOGGY)
            .with("demo:flat", SourceKind::Shader(ShaderKind::Vertex), VERTEX)
            .with(
                "demo:flat",
                SourceKind::Shader(ShaderKind::Fragment),
                "out vec4 color;\nvoid main() {\n    color = vec4(0.5);\n}\n",
            );
        let compiler = ShaderCompiler::builder(HeadlessDevice::new())
            .provider(Rc::new(provider))
            .verbose_errors(false)
            .build();
        let mut manager = ShaderManager::new(compiler);
        for name in ["demo:fog", "demo:flat"] {
            let mut definition = ProgramDefinition::default();
            definition.set_stage(ShaderKind::Vertex, id(name));
            definition.set_stage(ShaderKind::Fragment, id(name));
            manager.add_program(id(name), definition);
        }
        manager
    }

    #[test]
    fn test_program_id_for_relative_path() {
        assert_eq!(
            program_id_for_relative_path(Path::new("demo/post/blur.toml")),
            Some(id("demo:post/blur"))
        );
        assert_eq!(program_id_for_relative_path(Path::new("demo/blur.fsh")), None);
        assert_eq!(program_id_for_relative_path(Path::new("blur.toml")), None);
    }

    #[test]
    fn test_duplicate_program_keeps_first() {
        let mut manager = manager();
        let mut other = ProgramDefinition::default();
        other.set_stage(ShaderKind::Compute, id("demo:flat"));
        assert!(!manager.add_program(id("demo:flat"), other));
        assert!(manager.program_definition(&id("demo:flat")).unwrap().compute.is_none());
    }

    #[test]
    fn test_recompile_dirty_only_touches_dependents() {
        let mut manager = manager();
        assert!(manager.compile_all().is_empty());
        let fog_handle = manager.program(&id("demo:fog")).unwrap().handle();
        let flat_handle = manager.program(&id("demo:flat")).unwrap().handle();
        assert!(manager.program(&id("demo:fog")).unwrap().depends_on("USE_FOG"));

        assert!(manager.set_definition("USE_FOG", ""));
        assert!(manager.recompile_dirty().is_empty());
        assert_ne!(manager.program(&id("demo:fog")).unwrap().handle(), fog_handle);
        assert_eq!(manager.program(&id("demo:flat")).unwrap().handle(), flat_handle);
        assert!(manager.recompile_dirty().is_empty());

        manager.free();
        assert_eq!(manager.device().live_shaders(), 0);
        assert_eq!(manager.device().live_programs(), 0);
    }

    #[test]
    fn test_failed_recompile_keeps_previous_program() {
        let mut manager = manager();
        manager.recompile(&id("demo:flat")).unwrap();
        let program = manager.program_mut(&id("demo:flat")).unwrap();
        program.set_sampler("albedo", 7);
        let handle = program.handle();

        manager.device_mut().fail_next_link("out of registers");
        let result = manager.recompile(&id("demo:flat"));
        assert!(matches!(result, Err(ShaderError::NativeLink { .. })));
        let program = manager.program(&id("demo:flat")).unwrap();
        assert_eq!(program.handle(), handle);
        assert!(program.is_linked());

        manager.recompile(&id("demo:flat")).unwrap();
        let program = manager.program(&id("demo:flat")).unwrap();
        assert_ne!(program.handle(), handle);
        assert_eq!(program.samplers(), &[("albedo".to_string(), 7)]);
        assert_eq!(manager.device().live_programs(), 1);
    }

    #[test]
    fn test_unknown_program() {
        let mut manager = manager();
        assert!(matches!(
            manager.recompile(&id("demo:nothing")),
            Err(ShaderError::Definition { .. })
        ));
    }

    #[test]
    fn test_hot_reload_maps_paths_to_sources() {
        let mut manager = manager();
        manager.set_source_root("/assets/shaders");
        manager.compile_all();
        let fog_handle = manager.program(&id("demo:fog")).unwrap().handle();
        let flat_handle = manager.program(&id("demo:flat")).unwrap().handle();

        let reloader = MockHotReloader::new();
        reloader.simulate_file_change("/assets/shaders/demo/fog.fsh");
        reloader.simulate_file_change("/elsewhere/readme.md");
        assert!(manager.poll_hot_reload(&reloader).is_empty());
        assert_ne!(manager.program(&id("demo:fog")).unwrap().handle(), fog_handle);
        assert_eq!(manager.program(&id("demo:flat")).unwrap().handle(), flat_handle);
        assert!(manager.poll_hot_reload(&reloader).is_empty());
    }
}
