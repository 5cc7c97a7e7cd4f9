use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use crate::definitions::ShaderPreDefinitions;
use crate::device::{Capabilities, GraphicsDevice};
use crate::error::{ShaderError, shader_name};
use crate::id::{ShaderId, ShaderKind, SourceKind};
use crate::modifier::ShaderModificationManager;
use crate::processor::{
    BindingProcessor, ImportProcessor, ModifyProcessor, PreDefinitionProcessor, PreProcessorChain,
    VersionProcessor,
};
use crate::program::ProgramDefinition;
use crate::source::SourceProvider;

/// Environment variable that turns on verbose compile diagnostics.
pub const VERBOSE_ERRORS_ENV: &str = "SHADEWEAVE_VERBOSE_SHADER_ERRORS";

/// Whether [`VERBOSE_ERRORS_ENV`] is set to a truthy value.
pub fn verbose_errors_from_env() -> bool {
    std::env::var(VERBOSE_ERRORS_ENV)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Inputs shared by every stage of one program compile.
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub pre_definitions: &'a ShaderPreDefinitions,
    pub definition: Option<&'a ProgramDefinition>,
}

impl<'a> CompileContext<'a> {
    pub fn new(pre_definitions: &'a ShaderPreDefinitions) -> Self {
        Self {
            pre_definitions,
            definition: None,
        }
    }

    pub fn with_definition(mut self, definition: &'a ProgramDefinition) -> Self {
        self.definition = Some(definition);
        self
    }
}

/// A native shader object plus what pre-processing learned about it.
///
/// Owned by the program it is attached to and returned to the compiler with
/// [`ShaderCompiler::release`].
#[derive(Debug)]
pub struct CompiledShaderStage {
    id: Option<ShaderId>,
    kind: ShaderKind,
    handle: u32,
    uniform_bindings: HashMap<String, u32>,
    explicit_bindings: BTreeSet<String>,
    definition_dependencies: BTreeSet<String>,
    includes: BTreeSet<ShaderId>,
}

impl CompiledShaderStage {
    /// `None` for sources compiled from a string.
    pub fn id(&self) -> Option<&ShaderId> {
        self.id.as_ref()
    }

    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn uniform_bindings(&self) -> &HashMap<String, u32> {
        &self.uniform_bindings
    }

    /// Whether the slot of `block` was written in the source.
    pub fn is_explicit_binding(&self, block: &str) -> bool {
        self.explicit_bindings.contains(block)
    }

    pub fn definition_dependencies(&self) -> &BTreeSet<String> {
        &self.definition_dependencies
    }

    pub fn includes(&self) -> &BTreeSet<ShaderId> {
        &self.includes
    }
}

/// Turns shader sources into native shader objects.
///
/// Every object created is tracked until it is released or [`free`]d.
///
/// [`free`]: ShaderCompiler::free
pub struct ShaderCompiler<D: GraphicsDevice> {
    device: D,
    provider: Option<Rc<dyn SourceProvider>>,
    capabilities: Capabilities,
    chain: PreProcessorChain,
    shaders: HashSet<u32>,
    verbose_errors: bool,
}

impl<D: GraphicsDevice> ShaderCompiler<D> {
    /// A compiler running exactly the given chain.
    pub fn new(
        device: D,
        provider: Option<Rc<dyn SourceProvider>>,
        capabilities: Capabilities,
        chain: PreProcessorChain,
    ) -> Self {
        Self {
            device,
            provider,
            capabilities,
            chain,
            shaders: HashSet::new(),
            verbose_errors: verbose_errors_from_env(),
        }
    }

    pub fn builder(device: D) -> ShaderCompilerBuilder<D> {
        ShaderCompilerBuilder::new(device)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn provider(&self) -> Option<&Rc<dyn SourceProvider>> {
        self.provider.as_ref()
    }

    pub fn set_verbose_errors(&mut self, verbose: bool) {
        self.verbose_errors = verbose;
    }

    /// Number of live shader objects created by this compiler.
    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    /// Compiles the stage `kind` of the shader file `id`.
    pub fn compile(
        &mut self,
        context: CompileContext<'_>,
        kind: ShaderKind,
        id: &ShaderId,
    ) -> Result<CompiledShaderStage, ShaderError> {
        self.check_capability(kind)?;
        let source_kind = SourceKind::Shader(kind);
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| ShaderError::SourceNotFound {
                id: id.clone(),
                kind: source_kind,
                reason: "no source provider configured".to_string(),
            })?;
        let source = provider.open(id, source_kind)?;
        self.compile_processed(context, kind, Some(id), source)
    }

    /// Compiles an inline source of stage `kind`.
    pub fn compile_source(
        &mut self,
        context: CompileContext<'_>,
        kind: ShaderKind,
        source: &str,
    ) -> Result<CompiledShaderStage, ShaderError> {
        self.check_capability(kind)?;
        self.compile_processed(context, kind, None, source.to_string())
    }

    fn check_capability(&self, kind: ShaderKind) -> Result<(), ShaderError> {
        if self.capabilities.supports(kind) {
            Ok(())
        } else {
            Err(ShaderError::CapabilityUnsupported { kind })
        }
    }

    fn compile_processed(
        &mut self,
        context: CompileContext<'_>,
        kind: ShaderKind,
        id: Option<&ShaderId>,
        source: String,
    ) -> Result<CompiledShaderStage, ShaderError> {
        let name = shader_name(id);
        log::debug!("Pre-processing {} shader {}", kind, name);
        let (processed, output) = self
            .chain
            .process(context, id, kind, source)
            .map_err(|e| ShaderError::pre_processing(id, kind, e))?;

        log::debug!("Compiling {} shader {}", kind, name);
        let handle = self.device.create_shader(kind);
        self.device.shader_source(handle, &processed);
        if let Err(log) = self.device.compile_shader(handle) {
            self.device.delete_shader(handle);
            return Err(ShaderError::NativeCompile {
                kind,
                shader: name,
                log,
                processed_source: self.verbose_errors.then_some(processed),
            });
        }
        self.shaders.insert(handle);

        Ok(CompiledShaderStage {
            id: id.cloned(),
            kind,
            handle,
            uniform_bindings: output.uniform_bindings,
            explicit_bindings: output.explicit_bindings,
            definition_dependencies: output.definition_dependencies,
            includes: output.includes,
        })
    }

    /// Deletes the native object of a stage created by this compiler.
    pub fn release(&mut self, stage: CompiledShaderStage) {
        if self.shaders.remove(&stage.handle) {
            self.device.delete_shader(stage.handle);
        } else {
            log::warn!("Releasing shader {} not owned by this compiler", stage.handle);
        }
    }

    /// Deletes every native shader object this compiler still tracks.
    pub fn free(&mut self) {
        let handles: Vec<u32> = self.shaders.drain().collect();
        for handle in handles {
            self.device.delete_shader(handle);
        }
    }
}

/// Builds a compiler with the standard pre-processor chain: modifications,
/// imports, block bindings, pre-definitions and finally `#version`.
pub struct ShaderCompilerBuilder<D: GraphicsDevice> {
    device: D,
    provider: Option<Rc<dyn SourceProvider>>,
    capabilities: Capabilities,
    modifications: Option<Rc<ShaderModificationManager>>,
    version: VersionProcessor,
    verbose_errors: Option<bool>,
}

impl<D: GraphicsDevice> ShaderCompilerBuilder<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            provider: None,
            capabilities: Capabilities::default(),
            modifications: None,
            version: VersionProcessor::default(),
            verbose_errors: None,
        }
    }

    pub fn provider(mut self, provider: Rc<dyn SourceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn modifications(mut self, modifications: Rc<ShaderModificationManager>) -> Self {
        self.modifications = Some(modifications);
        self
    }

    /// `#version` given to sources that declare none.
    pub fn default_version(mut self, version: VersionProcessor) -> Self {
        self.version = version;
        self
    }

    /// Overrides the environment variable.
    pub fn verbose_errors(mut self, verbose: bool) -> Self {
        self.verbose_errors = Some(verbose);
        self
    }

    pub fn build(self) -> ShaderCompiler<D> {
        let mut chain = PreProcessorChain::new();
        if let Some(modifications) = self.modifications {
            chain.add(ModifyProcessor::new(modifications, self.provider.clone()), true);
        }
        if let Some(provider) = &self.provider {
            chain.add(ImportProcessor::new(Rc::clone(provider)), true);
        }
        chain.add(BindingProcessor::new(), true);
        chain.add(PreDefinitionProcessor::new(), false);
        chain.add(self.version, false);

        let mut compiler = ShaderCompiler::new(self.device, self.provider, self.capabilities, chain);
        if let Some(verbose) = self.verbose_errors {
            compiler.set_verbose_errors(verbose);
        }
        compiler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use crate::source::MemorySourceProvider;

    fn compiler(provider: MemorySourceProvider) -> ShaderCompiler<HeadlessDevice> {
        ShaderCompiler::builder(HeadlessDevice::new())
            .provider(Rc::new(provider))
            .verbose_errors(false)
            .build()
    }

    #[test]
    fn test_compile_tracks_and_frees() {
        let provider = MemorySourceProvider::new().with(
            "demo:flat",
            SourceKind::Shader(ShaderKind::Fragment),
            "out vec4 color;\nvoid main() { color = vec4(1.0); }",
        );
        let mut compiler = compiler(provider);
        let definitions = ShaderPreDefinitions::new();
        let id: ShaderId = "demo:flat".parse().unwrap();

        let stage = compiler
            .compile(CompileContext::new(&definitions), ShaderKind::Fragment, &id)
            .unwrap();
        assert_eq!(stage.id(), Some(&id));
        let source = compiler.device().shader_source_of(stage.handle()).unwrap();
        assert!(source.starts_with("#version 410 core"));
        assert_eq!(compiler.live_shaders(), 1);

        compiler
            .compile_source(CompileContext::new(&definitions), ShaderKind::Vertex, "void main() {}")
            .unwrap();
        assert_eq!(compiler.device().live_shaders(), 2);
        compiler.free();
        assert_eq!(compiler.device().live_shaders(), 0);
        assert_eq!(compiler.device().invalid_deletes(), 0);
    }

    #[test]
    fn test_failed_compile_deletes_shader() {
        let mut compiler = compiler(MemorySourceProvider::new());
        let definitions = ShaderPreDefinitions::new();
        let result = compiler.compile_source(
            CompileContext::new(&definitions),
            ShaderKind::Fragment,
            "void main() { float x = ; }",
        );
        // The pre-processors already reject the syntax error.
        assert!(matches!(result, Err(ShaderError::PreProcessor { .. })));
        assert_eq!(compiler.device().live_shaders(), 0);
    }

    #[test]
    fn test_verbose_errors_attach_source() {
        let mut compiler = ShaderCompiler::builder(HeadlessDevice::new().with_naga_validation(true))
            .default_version(VersionProcessor::new("450 core").unwrap())
            .verbose_errors(true)
            .build();
        let definitions = ShaderPreDefinitions::new();
        let result = compiler.compile_source(
            CompileContext::new(&definitions),
            ShaderKind::Fragment,
            "layout(location = 0) out vec4 color;\nvoid main() { color = undefined_value; }",
        );
        match result {
            Err(error @ ShaderError::NativeCompile { .. }) => {
                let ShaderError::NativeCompile {
                    processed_source, ..
                } = &error
                else {
                    unreachable!()
                };
                assert!(processed_source.as_deref().unwrap().contains("undefined_value"));
                assert!(error.diagnostic().contains("   1: #version 450 core"));
            }
            other => panic!("expected native compile error, got {:?}", other),
        }
        assert_eq!(compiler.device().live_shaders(), 0);
    }

    #[test]
    fn test_capability_checked_before_lookup() {
        let provider = Rc::new(MemorySourceProvider::new());
        let mut compiler = ShaderCompiler::builder(HeadlessDevice::new())
            .provider(provider.clone())
            .capabilities(Capabilities {
                compute: false,
                ..Capabilities::default()
            })
            .build();
        let definitions = ShaderPreDefinitions::new();
        let id: ShaderId = "demo:particles".parse().unwrap();
        let result = compiler.compile(CompileContext::new(&definitions), ShaderKind::Compute, &id);
        assert!(matches!(
            result,
            Err(ShaderError::CapabilityUnsupported {
                kind: ShaderKind::Compute
            })
        ));
        assert_eq!(provider.lookups(), 0);
    }

    #[test]
    fn test_missing_source() {
        let mut compiler = compiler(MemorySourceProvider::new());
        let definitions = ShaderPreDefinitions::new();
        let id: ShaderId = "demo:nothing".parse().unwrap();
        let result = compiler.compile(CompileContext::new(&definitions), ShaderKind::Vertex, &id);
        assert!(matches!(result, Err(ShaderError::SourceNotFound { .. })));
    }
}
