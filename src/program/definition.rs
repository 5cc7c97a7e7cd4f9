use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ShaderError;
use crate::id::{ShaderId, ShaderKind};

/// Where a sampler's texture comes from when samplers are applied.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TextureSource {
    /// A fixed native texture handle.
    Handle { id: u32 },
    /// A named texture resolved through a [`TextureSourceContext`] at bind time.
    Dynamic { name: String },
}

/// Resolves dynamic texture names, e.g. framebuffer attachments.
pub trait TextureSourceContext {
    fn resolve(&self, name: &str) -> Option<u32>;
}

impl TextureSourceContext for BTreeMap<String, u32> {
    fn resolve(&self, name: &str) -> Option<u32> {
        self.get(name).copied()
    }
}

impl TextureSource {
    /// Native handle to bind, `0` when it cannot be resolved.
    pub fn texture(&self, context: Option<&dyn TextureSourceContext>) -> u32 {
        match self {
            TextureSource::Handle { id } => *id,
            TextureSource::Dynamic { name } => context
                .and_then(|context| context.resolve(name))
                .unwrap_or_else(|| {
                    log::debug!("Dynamic texture '{}' is not available", name);
                    0
                }),
        }
    }
}

/// The stages and defaults that make up one program, usually read from a
/// TOML file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramDefinition {
    pub vertex: Option<ShaderId>,
    pub tess_control: Option<ShaderId>,
    pub tess_evaluation: Option<ShaderId>,
    pub geometry: Option<ShaderId>,
    pub fragment: Option<ShaderId>,
    pub compute: Option<ShaderId>,
    /// Applied when the global pre-definition table lacks a name.
    #[serde(default)]
    pub definitions: BTreeMap<String, String>,
    #[serde(default)]
    pub textures: BTreeMap<String, TextureSource>,
}

impl ProgramDefinition {
    /// Parses and validates a definition. `name` is used in errors only.
    pub fn from_toml(name: &str, content: &str) -> Result<Self, ShaderError> {
        let definition: ProgramDefinition =
            toml::from_str(content).map_err(|e| ShaderError::Definition {
                id: name.to_string(),
                reason: e.to_string(),
            })?;
        definition.validate().map_err(|reason| ShaderError::Definition {
            id: name.to_string(),
            reason,
        })?;
        Ok(definition)
    }

    pub fn load(name: &str, path: &Path) -> Result<Self, ShaderError> {
        let content = std::fs::read_to_string(path).map_err(|source| ShaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(name, &content)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.stages().is_empty() {
            return Err("no shader stages declared".to_string());
        }
        if self.compute.is_some() && self.stages().len() > 1 {
            return Err("a compute program cannot declare other stages".to_string());
        }
        Ok(())
    }

    pub fn stage(&self, kind: ShaderKind) -> Option<&ShaderId> {
        match kind {
            ShaderKind::Vertex => self.vertex.as_ref(),
            ShaderKind::TessControl => self.tess_control.as_ref(),
            ShaderKind::TessEvaluation => self.tess_evaluation.as_ref(),
            ShaderKind::Geometry => self.geometry.as_ref(),
            ShaderKind::Fragment => self.fragment.as_ref(),
            ShaderKind::Compute => self.compute.as_ref(),
        }
    }

    pub fn set_stage(&mut self, kind: ShaderKind, id: ShaderId) {
        let slot = match kind {
            ShaderKind::Vertex => &mut self.vertex,
            ShaderKind::TessControl => &mut self.tess_control,
            ShaderKind::TessEvaluation => &mut self.tess_evaluation,
            ShaderKind::Geometry => &mut self.geometry,
            ShaderKind::Fragment => &mut self.fragment,
            ShaderKind::Compute => &mut self.compute,
        };
        *slot = Some(id);
    }

    /// Declared stages in pipeline order.
    pub fn stages(&self) -> Vec<(ShaderKind, &ShaderId)> {
        ShaderKind::ALL
            .iter()
            .filter_map(|kind| self.stage(*kind).map(|id| (*kind, id)))
            .collect()
    }
}
