//! Linked shader programs.

mod definition;

use std::collections::{BTreeMap, BTreeSet, HashMap};

pub use definition::{ProgramDefinition, TextureSource, TextureSourceContext};

use crate::compiler::{CompileContext, CompiledShaderStage, ShaderCompiler};
use crate::definitions::ShaderPreDefinitions;
use crate::device::{GraphicsDevice, INVALID_INDEX, INVALID_LOCATION};
use crate::error::{ShaderError, shader_name};
use crate::id::{ShaderId, ShaderKind};

/// Fragment stage added for drivers that cannot link without one.
pub const DUMMY_FRAGMENT: &str = "out vec4 fragColor;\nvoid main() {\n    fragColor = vec4(1.0);\n}\n";

/// Name lookups memoized for one link of the program.
#[derive(Debug)]
struct BindingCache<T> {
    generation: u64,
    values: HashMap<String, T>,
}

impl<T: Copy> BindingCache<T> {
    fn new() -> Self {
        Self {
            generation: 0,
            values: HashMap::new(),
        }
    }

    fn get_or_insert_with(&mut self, generation: u64, name: &str, query: impl FnOnce() -> T) -> T {
        if self.generation != generation {
            self.values.clear();
            self.generation = generation;
        }
        if let Some(value) = self.values.get(name) {
            return *value;
        }
        let value = query();
        self.values.insert(name.to_string(), value);
        value
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}

/// Slots handed out to one kind of block while linking a program.
#[derive(Default)]
struct BlockSlots {
    assigned: HashMap<String, u32>,
    used: BTreeSet<u32>,
}

impl BlockSlots {
    /// Returns the slot to bind `name` to, `None` when it is already bound.
    fn place(&mut self, name: &str, slot: u32, explicit: bool) -> Option<u32> {
        if self.assigned.contains_key(name) {
            return None;
        }
        let slot = if explicit || !self.used.contains(&slot) {
            slot
        } else {
            let free = (0..).find(|s| !self.used.contains(s)).unwrap_or(u32::MAX);
            log::debug!("Moved block {} from binding {} to {}", name, slot, free);
            free
        };
        self.used.insert(slot);
        self.assigned.insert(name.to_string(), slot);
        Some(slot)
    }
}

/// A native program object built from the stages of a [`ProgramDefinition`].
///
/// Uniform and block lookups are cached per link. The sampler table is kept
/// across recompiles.
#[derive(Debug)]
pub struct ShaderProgram {
    id: Option<ShaderId>,
    handle: u32,
    stages: Vec<CompiledShaderStage>,
    definition_dependencies: BTreeSet<String>,
    sources: BTreeSet<ShaderId>,
    textures: BTreeMap<String, TextureSource>,
    samplers: Vec<(String, u32)>,
    generation: u64,
    uniforms: BindingCache<i32>,
    uniform_blocks: BindingCache<u32>,
    storage_blocks: BindingCache<u32>,
}

impl Default for ShaderProgram {
    fn default() -> Self {
        Self {
            id: None,
            handle: 0,
            stages: Vec::new(),
            definition_dependencies: BTreeSet::new(),
            sources: BTreeSet::new(),
            textures: BTreeMap::new(),
            samplers: Vec::new(),
            generation: 0,
            uniforms: BindingCache::new(),
            uniform_blocks: BindingCache::new(),
            storage_blocks: BindingCache::new(),
        }
    }
}

impl ShaderProgram {
    pub fn new(id: ShaderId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<&ShaderId> {
        self.id.as_ref()
    }

    /// Native program handle, `0` when not linked.
    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn is_linked(&self) -> bool {
        self.handle != 0
    }

    pub fn stages(&self) -> &[CompiledShaderStage] {
        &self.stages
    }

    pub fn stage(&self, kind: ShaderKind) -> Option<&CompiledShaderStage> {
        self.stages.iter().find(|stage| stage.kind() == kind)
    }

    /// Pre-definition names whose value affects this program.
    pub fn definition_dependencies(&self) -> &BTreeSet<String> {
        &self.definition_dependencies
    }

    pub fn depends_on(&self, definition: &str) -> bool {
        self.definition_dependencies.contains(definition)
    }

    /// Stage files and imports the program was built from.
    pub fn sources(&self) -> &BTreeSet<ShaderId> {
        &self.sources
    }

    /// Number of cached uniform, uniform block and storage block lookups.
    pub fn cached_lookups(&self) -> usize {
        self.uniforms.len() + self.uniform_blocks.len() + self.storage_blocks.len()
    }

    /// Rebuilds the program from `definition`.
    ///
    /// Previous stages are always released first. On failure everything built
    /// by this attempt is released and the program is left unlinked.
    pub fn compile<D: GraphicsDevice>(
        &mut self,
        compiler: &mut ShaderCompiler<D>,
        definition: &ProgramDefinition,
        pre_definitions: &ShaderPreDefinitions,
    ) -> Result<(), ShaderError> {
        self.free(compiler);
        let context = CompileContext::new(pre_definitions).with_definition(definition);
        match self.build(compiler, definition, context) {
            Ok(()) => {
                log::debug!("Linked program {}", shader_name(self.id.as_ref()));
                Ok(())
            }
            Err(e) => {
                self.free(compiler);
                Err(e)
            }
        }
    }

    fn build<D: GraphicsDevice>(
        &mut self,
        compiler: &mut ShaderCompiler<D>,
        definition: &ProgramDefinition,
        context: CompileContext<'_>,
    ) -> Result<(), ShaderError> {
        let stages = definition.stages();
        if stages.is_empty() {
            return Err(ShaderError::Definition {
                id: shader_name(self.id.as_ref()),
                reason: "no shader stages declared".to_string(),
            });
        }

        self.handle = compiler.device_mut().create_program();
        for (kind, id) in stages {
            let stage = compiler.compile(context, kind, id)?;
            self.attach(compiler, stage);
        }
        if compiler.capabilities().requires_fragment_stage
            && definition.fragment.is_none()
            && definition.compute.is_none()
        {
            log::debug!(
                "Adding pass-through fragment stage to {}",
                shader_name(self.id.as_ref())
            );
            let stage = compiler.compile_source(context, ShaderKind::Fragment, DUMMY_FRAGMENT)?;
            self.attach(compiler, stage);
        }

        compiler
            .device_mut()
            .link_program(self.handle)
            .map_err(|log| ShaderError::NativeLink {
                program: shader_name(self.id.as_ref()),
                log,
            })?;
        self.generation += 1;

        self.apply_block_bindings(compiler.device_mut());
        for stage in &self.stages {
            self.definition_dependencies
                .extend(stage.definition_dependencies().iter().cloned());
            self.sources.extend(stage.id().cloned());
            self.sources.extend(stage.includes().iter().cloned());
        }
        self.textures = definition.textures.clone();
        Ok(())
    }

    fn attach<D: GraphicsDevice>(&mut self, compiler: &mut ShaderCompiler<D>, stage: CompiledShaderStage) {
        compiler.device_mut().attach_shader(self.handle, stage.handle());
        self.stages.push(stage);
    }

    /// Binds every active block of the linked program.
    ///
    /// Stages are pre-processed one at a time, so two stages may hand the same
    /// slot to different blocks. Explicit slots are kept; a block whose
    /// assigned slot is already taken by another block of the same kind
    /// moves to the smallest free one. A block keeps one slot across stages.
    fn apply_block_bindings<D: GraphicsDevice>(&mut self, device: &mut D) {
        let mut blocks: Vec<(&str, u32, bool)> = Vec::new();
        for stage in &self.stages {
            let mut entries: Vec<(&str, u32)> = stage
                .uniform_bindings()
                .iter()
                .map(|(name, slot)| (name.as_str(), *slot))
                .collect();
            entries.sort_by_key(|(name, slot)| (*slot, *name));
            blocks.extend(
                entries
                    .into_iter()
                    .map(|(name, slot)| (name, slot, stage.is_explicit_binding(name))),
            );
        }
        // Explicit slots are reserved before any assigned slot is placed.
        blocks.sort_by_key(|(_, _, explicit)| !*explicit);

        let mut uniform = BlockSlots::default();
        let mut storage = BlockSlots::default();
        for (name, slot, explicit) in blocks {
            let index = device.uniform_block_index(self.handle, name);
            if index != INVALID_INDEX {
                if let Some(slot) = uniform.place(name, slot, explicit) {
                    device.uniform_block_binding(self.handle, index, slot);
                }
                continue;
            }
            let index = device.storage_block_index(self.handle, name);
            if index != INVALID_INDEX {
                if let Some(slot) = storage.place(name, slot, explicit) {
                    device.storage_block_binding(self.handle, index, slot);
                }
            } else {
                log::debug!("Block {} is not active, binding {} unused", name, slot);
            }
        }
    }

    /// Detaches and releases every stage and deletes the native program.
    pub fn free<D: GraphicsDevice>(&mut self, compiler: &mut ShaderCompiler<D>) {
        let handle = self.handle;
        for stage in self.stages.drain(..) {
            if handle != 0 {
                compiler.device_mut().detach_shader(handle, stage.handle());
            }
            compiler.release(stage);
        }
        if handle != 0 {
            compiler.device_mut().delete_program(handle);
            self.handle = 0;
        }
        self.generation += 1;
        self.uniforms.clear();
        self.uniform_blocks.clear();
        self.storage_blocks.clear();
        self.definition_dependencies.clear();
        self.sources.clear();
    }

    /// Location of a uniform, [`INVALID_LOCATION`] when absent or unlinked.
    pub fn uniform_location<D: GraphicsDevice>(&mut self, device: &D, name: &str) -> i32 {
        if self.handle == 0 {
            return INVALID_LOCATION;
        }
        let handle = self.handle;
        self.uniforms
            .get_or_insert_with(self.generation, name, || device.uniform_location(handle, name))
    }

    /// Index of a uniform block, [`INVALID_INDEX`] when absent or unlinked.
    pub fn uniform_block_index<D: GraphicsDevice>(&mut self, device: &D, name: &str) -> u32 {
        if self.handle == 0 {
            return INVALID_INDEX;
        }
        let handle = self.handle;
        self.uniform_blocks
            .get_or_insert_with(self.generation, name, || device.uniform_block_index(handle, name))
    }

    /// Index of a storage block, [`INVALID_INDEX`] when absent or unlinked.
    pub fn storage_block_index<D: GraphicsDevice>(&mut self, device: &D, name: &str) -> u32 {
        if self.handle == 0 {
            return INVALID_INDEX;
        }
        let handle = self.handle;
        self.storage_blocks
            .get_or_insert_with(self.generation, name, || device.storage_block_index(handle, name))
    }

    /// Assigns a texture to a sampler uniform. `0` binds the missing texture.
    pub fn set_sampler(&mut self, name: &str, texture: u32) {
        match self.samplers.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = texture,
            None => self.samplers.push((name.to_string(), texture)),
        }
    }

    pub fn remove_sampler(&mut self, name: &str) {
        self.samplers.retain(|(n, _)| n != name);
    }

    pub fn clear_samplers(&mut self) {
        self.samplers.clear();
    }

    pub fn samplers(&self) -> &[(String, u32)] {
        &self.samplers
    }

    /// Takes over the sampler table of a program this one replaces.
    pub fn copy_samplers_from(&mut self, other: &ShaderProgram) {
        for (name, texture) in &other.samplers {
            self.set_sampler(name, *texture);
        }
    }

    /// Binds every sampler to a texture unit, starting at `first_unit`.
    ///
    /// `first_unit` receives the missing texture; samplers take the units
    /// after it in table order. Samplers whose texture is `0` point at the
    /// missing texture without using a unit, and samplers the program does
    /// not use are skipped. With a `context`, texture sources of the
    /// definition are resolved into the table first. Returns the next free unit.
    pub fn apply_samplers<D: GraphicsDevice>(
        &mut self,
        device: &mut D,
        context: Option<&dyn TextureSourceContext>,
        first_unit: u32,
    ) -> u32 {
        if let Some(context) = context {
            let resolved: Vec<(String, u32)> = self
                .textures
                .iter()
                .map(|(name, source)| (name.clone(), source.texture(Some(context))))
                .collect();
            for (name, texture) in resolved {
                self.set_sampler(&name, texture);
            }
        }

        let active = device.active_texture();
        device.set_active_texture(first_unit);
        let missing = device.missing_texture();
        device.bind_texture(missing);
        let mut unit = first_unit + 1;

        let samplers = self.samplers.clone();
        for (name, texture) in samplers {
            let location = self.uniform_location(device, &name);
            if location == INVALID_LOCATION {
                continue;
            }
            if texture == 0 {
                device.program_uniform_i32(self.handle, location, first_unit as i32);
                continue;
            }
            device.set_active_texture(unit);
            device.bind_texture(texture);
            device.program_uniform_i32(self.handle, location, unit as i32);
            unit += 1;
        }
        device.set_active_texture(active);
        unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    #[test]
    fn test_binding_cache_generation() {
        let mut cache = BindingCache::new();
        assert_eq!(cache.get_or_insert_with(1, "a", || 5), 5);
        assert_eq!(cache.get_or_insert_with(1, "a", || 6), 5);
        assert_eq!(cache.get_or_insert_with(2, "a", || 7), 7);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_block_slots_move_colliding_blocks() {
        let mut slots = BlockSlots::default();
        assert_eq!(slots.place("Camera", 1, true), Some(1));
        assert_eq!(slots.place("Scene", 0, false), Some(0));
        assert_eq!(slots.place("Lights", 0, false), Some(2));
        assert_eq!(slots.place("Scene", 0, false), None);
    }

    #[test]
    fn test_unlinked_program_returns_sentinels() {
        let device = HeadlessDevice::new();
        let mut program = ShaderProgram::default();
        assert_eq!(program.uniform_location(&device, "tex"), INVALID_LOCATION);
        assert_eq!(program.uniform_block_index(&device, "Camera"), INVALID_INDEX);
        assert_eq!(program.storage_block_index(&device, "Lights"), INVALID_INDEX);
        assert_eq!(program.cached_lookups(), 0);
    }

    #[test]
    fn test_sampler_table_order_and_replace() {
        let mut program = ShaderProgram::default();
        program.set_sampler("b", 1);
        program.set_sampler("a", 2);
        program.set_sampler("b", 3);
        assert_eq!(
            program.samplers(),
            &[("b".to_string(), 3), ("a".to_string(), 2)]
        );
        program.remove_sampler("b");
        assert_eq!(program.samplers().len(), 1);
        program.clear_samplers();
        assert!(program.samplers().is_empty());
    }
}
