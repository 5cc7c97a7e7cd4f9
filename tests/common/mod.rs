#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::rc::Rc;

use shadeweave::{
    HeadlessDevice, MemorySourceProvider, ShaderCompiler, ShaderId, ShaderKind, SourceKind,
};
use tempfile::TempDir;

pub fn id(s: &str) -> ShaderId {
    s.parse().expect("Invalid shader id in test")
}

pub fn stage(kind: ShaderKind) -> SourceKind {
    SourceKind::Shader(kind)
}

/// Compiler over in-memory sources with the default chain.
pub fn memory_compiler(provider: MemorySourceProvider) -> ShaderCompiler<HeadlessDevice> {
    ShaderCompiler::builder(HeadlessDevice::new())
        .provider(Rc::new(provider))
        .verbose_errors(false)
        .build()
}

/// A project directory laid out the way the config expects it:
/// `shaders/`, `programs/` and `modifiers/` next to `shadeweave.toml`.
pub struct ProjectDir {
    pub dir: TempDir,
}

impl ProjectDir {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        for sub in ["shaders", "programs", "modifiers"] {
            std::fs::create_dir_all(dir.path().join(sub)).expect("Failed to create project dir");
        }
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn shaders(&self) -> PathBuf {
        self.root().join("shaders")
    }

    pub fn programs(&self) -> PathBuf {
        self.root().join("programs")
    }

    pub fn modifiers(&self) -> PathBuf {
        self.root().join("modifiers")
    }

    fn write(path: PathBuf, content: &str) -> PathBuf {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create dir");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Writes `shaders/<ns>/<path>.<ext>`.
    pub fn write_source(&self, shader: &str, kind: SourceKind, content: &str) -> PathBuf {
        let shader = id(shader);
        let path = self
            .shaders()
            .join(shader.namespace())
            .join(format!("{}.{}", shader.path(), kind.extension()));
        Self::write(path, content)
    }

    /// Writes `programs/<ns>/<path>.toml`.
    pub fn write_program(&self, program: &str, content: &str) -> PathBuf {
        let program = id(program);
        let path = self
            .programs()
            .join(program.namespace())
            .join(format!("{}.toml", program.path()));
        Self::write(path, content)
    }

    /// Writes `modifiers/<ns>/<path>.<ext>`.
    pub fn write_modifier(&self, target: &str, kind: SourceKind, content: &str) -> PathBuf {
        let target = id(target);
        let path = self
            .modifiers()
            .join(target.namespace())
            .join(format!("{}.{}", target.path(), kind.extension()));
        Self::write(path, content)
    }

    /// Writes `shadeweave.toml` with relative paths plus `extra` sections.
    pub fn write_config(&self, extra: &str) -> PathBuf {
        let content = format!(
            "[sources]\nroot = \"shaders\"\nprograms = \"programs\"\nmodifiers = [\"modifiers\"]\n\n{}",
            extra
        );
        Self::write(self.root().join("shadeweave.toml"), &content)
    }
}
