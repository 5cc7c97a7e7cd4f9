//! The native graphics API as seen by the compiler and programs.
//!
//! Handles are plain integers where `0` means "no object", matching the
//! OpenGL conventions the rest of the crate follows.

use crate::id::ShaderKind;

/// Returned by block index queries when the name is not an active block.
pub const INVALID_INDEX: u32 = u32::MAX;

/// Returned by uniform location queries when the name is not active.
pub const INVALID_LOCATION: i32 = -1;

/// Which shader stages the device can compile, and platform quirks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub compute: bool,
    pub geometry: bool,
    pub tessellation: bool,
    /// Programs without a fragment stage fail to link; a pass-through
    /// fragment shader is added to such programs.
    pub requires_fragment_stage: bool,
}

impl Capabilities {
    pub fn supports(&self, kind: ShaderKind) -> bool {
        match kind {
            ShaderKind::Vertex | ShaderKind::Fragment => true,
            ShaderKind::Geometry => self.geometry,
            ShaderKind::TessControl | ShaderKind::TessEvaluation => self.tessellation,
            ShaderKind::Compute => self.compute,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            compute: true,
            geometry: true,
            tessellation: true,
            requires_fragment_stage: false,
        }
    }
}

/// Native shader and program operations.
///
/// Errors from compilation and linking are returned as the driver's info log.
pub trait GraphicsDevice {
    fn create_shader(&mut self, kind: ShaderKind) -> u32;
    fn shader_source(&mut self, shader: u32, source: &str);
    fn compile_shader(&mut self, shader: u32) -> Result<(), String>;
    fn delete_shader(&mut self, shader: u32);

    fn create_program(&mut self) -> u32;
    fn attach_shader(&mut self, program: u32, shader: u32);
    fn detach_shader(&mut self, program: u32, shader: u32);
    fn link_program(&mut self, program: u32) -> Result<(), String>;
    fn delete_program(&mut self, program: u32);

    /// [`INVALID_LOCATION`] when `name` is not an active uniform.
    fn uniform_location(&self, program: u32, name: &str) -> i32;
    /// [`INVALID_INDEX`] when `name` is not an active uniform block.
    fn uniform_block_index(&self, program: u32, name: &str) -> u32;
    /// [`INVALID_INDEX`] when `name` is not an active storage block.
    fn storage_block_index(&self, program: u32, name: &str) -> u32;
    fn uniform_block_binding(&mut self, program: u32, index: u32, binding: u32);
    fn storage_block_binding(&mut self, program: u32, index: u32, binding: u32);

    fn active_texture(&self) -> u32;
    fn set_active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, texture: u32);
    /// Texture bound for samplers without a texture.
    fn missing_texture(&self) -> u32;
    fn program_uniform_i32(&mut self, program: u32, location: i32, value: i32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_supports() {
        let capabilities = Capabilities {
            compute: false,
            geometry: true,
            tessellation: false,
            requires_fragment_stage: false,
        };
        assert!(capabilities.supports(ShaderKind::Vertex));
        assert!(capabilities.supports(ShaderKind::Geometry));
        assert!(!capabilities.supports(ShaderKind::Compute));
        assert!(!capabilities.supports(ShaderKind::TessControl));
        assert!(Capabilities::default().supports(ShaderKind::Compute));
    }
}
