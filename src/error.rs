use std::path::PathBuf;

use crate::glsl::ParseError;
use crate::id::{ShaderId, ShaderKind, SourceKind};
use crate::modifier::Arity;

/// Name used in diagnostics for sources compiled without an identifier.
pub const INLINE_SHADER: &str = "inline";

pub(crate) fn shader_name(id: Option<&ShaderId>) -> String {
    id.map_or_else(|| INLINE_SHADER.to_string(), ToString::to_string)
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("Failed to read {kind} '{id}': {reason}")]
    SourceNotFound {
        id: ShaderId,
        kind: SourceKind,
        reason: String,
    },
    #[error("{kind} shaders are not supported by this device")]
    CapabilityUnsupported { kind: ShaderKind },
    #[error("Failed to pre-process {kind} shader {shader}: {source}")]
    PreProcessor {
        shader: String,
        kind: ShaderKind,
        source: PreProcessorError,
    },
    #[error(transparent)]
    ModificationSyntax(#[from] ModificationSyntaxError),
    #[error("Failed to modify {kind} shader {shader}: {source}")]
    ModificationApplication {
        shader: String,
        kind: ShaderKind,
        source: ModificationError,
    },
    #[error("Failed to compile {kind} shader {shader}\n{log}")]
    NativeCompile {
        kind: ShaderKind,
        shader: String,
        log: String,
        processed_source: Option<String>,
    },
    #[error("Failed to link shader program {program}\n{log}")]
    NativeLink { program: String, log: String },
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid program definition {id}: {reason}")]
    Definition { id: String, reason: String },
}

impl ShaderError {
    pub(crate) fn pre_processing(
        id: Option<&ShaderId>,
        kind: ShaderKind,
        error: PreProcessorError,
    ) -> Self {
        let shader = shader_name(id);
        match error {
            PreProcessorError::Modification(source) => ShaderError::ModificationApplication {
                shader,
                kind,
                source,
            },
            source => ShaderError::PreProcessor {
                shader,
                kind,
                source,
            },
        }
    }

    /// Full diagnostic text. Compile failures with verbose diagnostics enabled
    /// also carry the numbered pre-processed source.
    pub fn diagnostic(&self) -> String {
        match self {
            ShaderError::NativeCompile {
                processed_source: Some(source),
                ..
            } => {
                let mut text = self.to_string();
                text.push('\n');
                for (i, line) in source.lines().enumerate() {
                    text.push_str(&format!("{:4}: {}\n", i + 1, line));
                }
                text
            }
            _ => self.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PreProcessorError {
    #[error("Import cycle detected: {}", format_chain(.chain))]
    ImportCycle { chain: Vec<ShaderId> },
    #[error("Failed to import '{id}': {reason}")]
    MissingImport { id: ShaderId, reason: String },
    #[error("Invalid import directive '{0}'")]
    InvalidImport(String),
    #[error("Conflicting #version directives '{first}' and '{second}'")]
    ConflictingVersion { first: String, second: String },
    #[error("Invalid #version directive '{0}'")]
    InvalidVersion(String),
    #[error("Binding of block '{block}' must be an integer literal, found '{value}'")]
    InvalidBinding { block: String, value: String },
    #[error(transparent)]
    Syntax(#[from] ParseError),
    #[error(transparent)]
    Modification(#[from] ModificationError),
}

fn format_chain(chain: &[ShaderId]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{line}:{column}: {message}")]
pub struct ModificationSyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ModificationError {
    #[error("Replace modification replaces the whole file and cannot be injected")]
    ReplaceAsInjection,
    #[error("No function matching {name}({arity}) found")]
    FunctionNotFound { name: String, arity: Arity },
    #[error("Unbalanced braces in body of function '{0}'")]
    UnbalancedBraces(String),
    #[error("Unresolved placeholder '#{0}'")]
    UnresolvedPlaceholder(String),
    #[error("Failed to read replacement '{id}': {reason}")]
    Replacement { id: ShaderId, reason: String },
    #[error(transparent)]
    Syntax(#[from] ParseError),
}
