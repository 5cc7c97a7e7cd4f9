//! GLSL pre-processing, modification and program linking.
//!
//! Shader sources are looked up by [`ShaderId`] through a [`SourceProvider`],
//! run through a [`PreProcessorChain`] (modifications, imports, block
//! bindings, pre-definitions, `#version`), compiled on a [`GraphicsDevice`]
//! and linked into [`ShaderProgram`]s. [`ShaderManager`] keeps a set of
//! programs compiled as definitions and files change.

pub mod compiler;
pub mod config;
pub mod definitions;
pub mod device;
pub mod error;
pub mod glsl;
pub mod headless;
pub mod hot_reload;
pub mod id;
pub mod manager;
pub mod modifier;
pub mod processor;
pub mod program;
pub mod source;
pub mod validate;

pub use crate::compiler::{CompileContext, CompiledShaderStage, ShaderCompiler};
pub use crate::config::{Config, ConfigError};
pub use crate::definitions::ShaderPreDefinitions;
pub use crate::device::{Capabilities, GraphicsDevice, INVALID_INDEX, INVALID_LOCATION};
pub use crate::error::{ModificationError, PreProcessorError, ShaderError};
pub use crate::headless::HeadlessDevice;
pub use crate::hot_reload::{ChangeSource, HotReloader, MockHotReloader};
pub use crate::id::{ShaderId, ShaderKind, SourceKind};
pub use crate::manager::ShaderManager;
pub use crate::modifier::{ShaderModification, ShaderModificationManager};
pub use crate::processor::{PreProcessorChain, ShaderPreProcessor};
pub use crate::program::{ProgramDefinition, ShaderProgram, TextureSource};
pub use crate::source::{FileSourceProvider, MemorySourceProvider, SourceProvider};
