//! A [`GraphicsDevice`] without a GPU.
//!
//! Sources are checked with the crate's own GLSL parser, and optionally with
//! naga, and linking reflects the active uniforms and blocks from the
//! attached sources. Every object and state change is recorded so tests and
//! the command line tool can inspect what a real driver would have seen.

use std::collections::{BTreeMap, HashMap};

use crate::device::{GraphicsDevice, INVALID_INDEX, INVALID_LOCATION};
use crate::glsl::TranslationUnit;
use crate::glsl::ast::Declaration;
use crate::id::ShaderKind;
use crate::validate::validate_glsl;

pub const DEFAULT_MISSING_TEXTURE: u32 = 0xdead;

#[derive(Debug)]
struct ShaderObject {
    kind: ShaderKind,
    source: String,
    compiled: bool,
}

/// Names a program exposes after a successful link.
#[derive(Debug, Default, Clone)]
struct Reflection {
    uniforms: Vec<String>,
    uniform_blocks: Vec<String>,
    storage_blocks: Vec<String>,
}

#[derive(Debug, Default)]
struct ProgramObject {
    attached: Vec<u32>,
    linked: Option<Reflection>,
    uniform_block_bindings: BTreeMap<u32, u32>,
    storage_block_bindings: BTreeMap<u32, u32>,
    uniform_values: HashMap<i32, i32>,
}

#[derive(Debug)]
pub struct HeadlessDevice {
    next_handle: u32,
    shaders: BTreeMap<u32, ShaderObject>,
    programs: BTreeMap<u32, ProgramObject>,
    naga_validation: bool,
    link_failures: Vec<String>,
    invalid_deletes: usize,
    active_texture: u32,
    texture_units: BTreeMap<u32, u32>,
    missing_texture: u32,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self {
            next_handle: 1,
            shaders: BTreeMap::new(),
            programs: BTreeMap::new(),
            naga_validation: false,
            link_failures: Vec::new(),
            invalid_deletes: 0,
            active_texture: 0,
            texture_units: BTreeMap::new(),
            missing_texture: DEFAULT_MISSING_TEXTURE,
        }
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also validates compiled sources with naga where it supports the stage.
    pub fn with_naga_validation(mut self, enabled: bool) -> Self {
        self.naga_validation = enabled;
        self
    }

    pub fn with_missing_texture(mut self, texture: u32) -> Self {
        self.missing_texture = texture;
        self
    }

    /// Makes the next link fail with `log`.
    pub fn fail_next_link(&mut self, log: impl Into<String>) {
        self.link_failures.push(log.into());
    }

    fn allocate(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Deletes of handles that were never created or already deleted.
    pub fn invalid_deletes(&self) -> usize {
        self.invalid_deletes
    }

    pub fn shader_source_of(&self, shader: u32) -> Option<&str> {
        self.shaders.get(&shader).map(|s| s.source.as_str())
    }

    pub fn shader_kind(&self, shader: u32) -> Option<ShaderKind> {
        self.shaders.get(&shader).map(|s| s.kind)
    }

    pub fn attached_shaders(&self, program: u32) -> &[u32] {
        self.programs
            .get(&program)
            .map(|p| p.attached.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_linked(&self, program: u32) -> bool {
        self.programs
            .get(&program)
            .is_some_and(|p| p.linked.is_some())
    }

    pub fn bound_texture(&self, unit: u32) -> Option<u32> {
        self.texture_units.get(&unit).copied()
    }

    /// Binding applied to the named uniform block.
    pub fn uniform_block_binding_of(&self, program: u32, name: &str) -> Option<u32> {
        let index = self.uniform_block_index(program, name);
        self.programs
            .get(&program)?
            .uniform_block_bindings
            .get(&index)
            .copied()
    }

    /// Binding applied to the named storage block.
    pub fn storage_block_binding_of(&self, program: u32, name: &str) -> Option<u32> {
        let index = self.storage_block_index(program, name);
        self.programs
            .get(&program)?
            .storage_block_bindings
            .get(&index)
            .copied()
    }

    /// Integer value last set for the named uniform.
    pub fn uniform_value(&self, program: u32, name: &str) -> Option<i32> {
        let location = self.uniform_location(program, name);
        self.programs
            .get(&program)?
            .uniform_values
            .get(&location)
            .copied()
    }

    fn reflect(&self, attached: &[u32]) -> Result<Reflection, String> {
        let mut reflection = Reflection::default();
        let mut has_stage = false;
        for shader in attached {
            let object = self
                .shaders
                .get(shader)
                .ok_or_else(|| format!("attached shader {} does not exist", shader))?;
            if !object.compiled {
                return Err(format!("attached shader {} is not compiled", shader));
            }
            has_stage = true;
            let unit = TranslationUnit::parse(&object.source).map_err(|e| e.to_string())?;
            for declaration in &unit.declarations {
                match declaration {
                    Declaration::Variable(variable) if variable.has_keyword("uniform") => {
                        for declarator in &variable.declarators {
                            push_unique(&mut reflection.uniforms, &declarator.name);
                        }
                    }
                    Declaration::Block(block) if block.has_keyword("uniform") => {
                        push_unique(&mut reflection.uniform_blocks, &block.name);
                    }
                    Declaration::Block(block) if block.has_keyword("buffer") => {
                        push_unique(&mut reflection.storage_blocks, &block.name);
                    }
                    _ => {}
                }
            }
        }
        if !has_stage {
            return Err("program has no attached shaders".to_string());
        }
        Ok(reflection)
    }

    fn reflection(&self, program: u32) -> Option<&Reflection> {
        self.programs.get(&program)?.linked.as_ref()
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

fn index_of(names: &[String], name: &str) -> u32 {
    names
        .iter()
        .position(|n| n == name)
        .and_then(|index| u32::try_from(index).ok())
        .unwrap_or(INVALID_INDEX)
}

impl GraphicsDevice for HeadlessDevice {
    fn create_shader(&mut self, kind: ShaderKind) -> u32 {
        let handle = self.allocate();
        self.shaders.insert(
            handle,
            ShaderObject {
                kind,
                source: String::new(),
                compiled: false,
            },
        );
        handle
    }

    fn shader_source(&mut self, shader: u32, source: &str) {
        if let Some(object) = self.shaders.get_mut(&shader) {
            object.source = source.to_string();
            object.compiled = false;
        }
    }

    fn compile_shader(&mut self, shader: u32) -> Result<(), String> {
        let naga_validation = self.naga_validation;
        let object = self
            .shaders
            .get_mut(&shader)
            .ok_or_else(|| format!("shader {} does not exist", shader))?;

        let unit = TranslationUnit::parse(&object.source).map_err(|e| format!("ERROR: {}", e))?;
        let has_version = matches!(
            unit.declarations.first(),
            Some(Declaration::Directive(directive)) if directive.name() == "version"
        );
        if !has_version {
            return Err("ERROR: 0:1: '#version' must be the first directive".to_string());
        }
        if naga_validation {
            validate_glsl(object.kind, &object.source).map_err(|e| format!("ERROR: {}", e))?;
        }
        object.compiled = true;
        Ok(())
    }

    fn delete_shader(&mut self, shader: u32) {
        if self.shaders.remove(&shader).is_none() {
            log::warn!("Deleting unknown shader {}", shader);
            self.invalid_deletes += 1;
        }
    }

    fn create_program(&mut self) -> u32 {
        let handle = self.allocate();
        self.programs.insert(handle, ProgramObject::default());
        handle
    }

    fn attach_shader(&mut self, program: u32, shader: u32) {
        if let Some(object) = self.programs.get_mut(&program) {
            if !object.attached.contains(&shader) {
                object.attached.push(shader);
            }
        }
    }

    fn detach_shader(&mut self, program: u32, shader: u32) {
        if let Some(object) = self.programs.get_mut(&program) {
            object.attached.retain(|attached| *attached != shader);
        }
    }

    fn link_program(&mut self, program: u32) -> Result<(), String> {
        let attached = self
            .programs
            .get(&program)
            .map(|p| p.attached.clone())
            .ok_or_else(|| format!("program {} does not exist", program))?;
        if !self.link_failures.is_empty() {
            return Err(self.link_failures.remove(0));
        }
        let reflection = self.reflect(&attached)?;
        if let Some(object) = self.programs.get_mut(&program) {
            object.linked = Some(reflection);
            object.uniform_block_bindings.clear();
            object.storage_block_bindings.clear();
            object.uniform_values.clear();
        }
        Ok(())
    }

    fn delete_program(&mut self, program: u32) {
        if self.programs.remove(&program).is_none() {
            log::warn!("Deleting unknown program {}", program);
            self.invalid_deletes += 1;
        }
    }

    fn uniform_location(&self, program: u32, name: &str) -> i32 {
        self.reflection(program)
            .and_then(|r| r.uniforms.iter().position(|n| n == name))
            .and_then(|index| i32::try_from(index).ok())
            .unwrap_or(INVALID_LOCATION)
    }

    fn uniform_block_index(&self, program: u32, name: &str) -> u32 {
        self.reflection(program)
            .map_or(INVALID_INDEX, |r| index_of(&r.uniform_blocks, name))
    }

    fn storage_block_index(&self, program: u32, name: &str) -> u32 {
        self.reflection(program)
            .map_or(INVALID_INDEX, |r| index_of(&r.storage_blocks, name))
    }

    fn uniform_block_binding(&mut self, program: u32, index: u32, binding: u32) {
        if let Some(object) = self.programs.get_mut(&program) {
            object.uniform_block_bindings.insert(index, binding);
        }
    }

    fn storage_block_binding(&mut self, program: u32, index: u32, binding: u32) {
        if let Some(object) = self.programs.get_mut(&program) {
            object.storage_block_bindings.insert(index, binding);
        }
    }

    fn active_texture(&self) -> u32 {
        self.active_texture
    }

    fn set_active_texture(&mut self, unit: u32) {
        self.active_texture = unit;
    }

    fn bind_texture(&mut self, texture: u32) {
        self.texture_units.insert(self.active_texture, texture);
    }

    fn missing_texture(&self) -> u32 {
        self.missing_texture
    }

    fn program_uniform_i32(&mut self, program: u32, location: i32, value: i32) {
        if location == INVALID_LOCATION {
            return;
        }
        if let Some(object) = self.programs.get_mut(&program) {
            object.uniform_values.insert(location, value);
        }
    }
}
