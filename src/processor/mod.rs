//! Source-to-source passes run over every shader before native compilation.
//!
//! A [`PreProcessorChain`] runs its passes in registration order. Passes
//! registered with `modify_imports` also run over every imported file, which
//! the import pass requests through [`PreProcessorContext::modify`].

mod binding;
mod import;
mod modify;
mod predefinition;
mod version;

use std::collections::{BTreeSet, HashMap};

pub use binding::BindingProcessor;
pub use import::ImportProcessor;
pub use modify::ModifyProcessor;
pub use predefinition::PreDefinitionProcessor;
pub use version::{DEFAULT_VERSION, Version, VersionProcessor};

use crate::compiler::CompileContext;
use crate::definitions::ShaderPreDefinitions;
use crate::error::PreProcessorError;
use crate::id::{ShaderId, ShaderKind, SourceKind};
use crate::program::ProgramDefinition;

/// A single source-to-source pass.
///
/// Passes take `&self` so that the import pass can re-enter the chain for the
/// files it pulls in. State kept between runs lives behind interior
/// mutability and is reset by [`ShaderPreProcessor::prepare`].
pub trait ShaderPreProcessor {
    /// Called once before each top-level compile.
    fn prepare(&self) {}

    /// Returns the transformed source of `context.input()`.
    fn modify(&self, context: &mut PreProcessorContext<'_>) -> Result<String, PreProcessorError>;
}

/// Facts collected while pre-processing one top-level source, including
/// everything its imports contribute.
#[derive(Debug, Default)]
pub struct PreProcessorOutput {
    /// Block name to binding slot.
    pub uniform_bindings: HashMap<String, u32>,
    /// Blocks whose slot came from a `layout(binding = N)` qualifier.
    pub explicit_bindings: BTreeSet<String>,
    pub definition_dependencies: BTreeSet<String>,
    pub includes: BTreeSet<ShaderId>,
}

pub struct PreProcessorContext<'a> {
    chain: &'a PreProcessorChain,
    compile: CompileContext<'a>,
    output: &'a mut PreProcessorOutput,
    name: Option<&'a ShaderId>,
    kind: ShaderKind,
    source_file: bool,
    input: String,
}

impl<'a> PreProcessorContext<'a> {
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Identifier of the file being processed, `None` for inline sources.
    pub fn name(&self) -> Option<&ShaderId> {
        self.name
    }

    /// Stage of the top-level shader being compiled.
    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    /// Kind of the file being processed: the stage for the top-level source,
    /// [`SourceKind::Include`] for imports.
    pub fn source_kind(&self) -> SourceKind {
        if self.source_file {
            SourceKind::Shader(self.kind)
        } else {
            SourceKind::Include
        }
    }

    /// Whether this is the top-level source rather than an import.
    pub fn is_source_file(&self) -> bool {
        self.source_file
    }

    pub fn pre_definitions(&self) -> &ShaderPreDefinitions {
        self.compile.pre_definitions
    }

    pub fn definition(&self) -> Option<&ProgramDefinition> {
        self.compile.definition
    }

    /// Value for `name` from the global table, falling back to the program
    /// definition's defaults.
    pub fn lookup_definition(&self, name: &str) -> Option<&str> {
        self.compile.pre_definitions.get(name).or_else(|| {
            self.compile
                .definition
                .and_then(|definition| definition.definitions.get(name))
                .map(String::as_str)
        })
    }

    pub fn uniform_binding(&self, block: &str) -> Option<u32> {
        self.output.uniform_bindings.get(block).copied()
    }

    pub fn add_uniform_binding(&mut self, block: &str, slot: u32) {
        self.output.uniform_bindings.insert(block.to_string(), slot);
    }

    pub fn add_explicit_binding(&mut self, block: &str, slot: u32) {
        self.add_uniform_binding(block, slot);
        self.output.explicit_bindings.insert(block.to_string());
    }

    pub fn add_definition_dependency(&mut self, name: &str) {
        self.output.definition_dependencies.insert(name.to_string());
    }

    pub fn add_include(&mut self, id: ShaderId) {
        self.output.includes.insert(id);
    }

    /// Runs the import-enabled passes of the chain over an imported source.
    pub fn modify(&mut self, name: &ShaderId, source: String) -> Result<String, PreProcessorError> {
        self.chain
            .run(self.compile, &mut *self.output, Some(name), self.kind, false, source)
    }
}

struct Entry {
    processor: Box<dyn ShaderPreProcessor>,
    modify_imports: bool,
}

#[derive(Default)]
pub struct PreProcessorChain {
    entries: Vec<Entry>,
}

impl PreProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<P: ShaderPreProcessor + 'static>(&mut self, processor: P, modify_imports: bool) {
        self.entries.push(Entry {
            processor: Box::new(processor),
            modify_imports,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pre-processes a top-level source.
    pub fn process(
        &self,
        compile: CompileContext<'_>,
        name: Option<&ShaderId>,
        kind: ShaderKind,
        source: String,
    ) -> Result<(String, PreProcessorOutput), PreProcessorError> {
        for entry in &self.entries {
            entry.processor.prepare();
        }
        let mut output = PreProcessorOutput::default();
        let source = self.run(compile, &mut output, name, kind, true, source)?;
        Ok((source, output))
    }

    fn run(
        &self,
        compile: CompileContext<'_>,
        output: &mut PreProcessorOutput,
        name: Option<&ShaderId>,
        kind: ShaderKind,
        source_file: bool,
        mut source: String,
    ) -> Result<String, PreProcessorError> {
        for entry in &self.entries {
            if !source_file && !entry.modify_imports {
                continue;
            }
            let mut context = PreProcessorContext {
                chain: self,
                compile,
                output: &mut *output,
                name,
                kind,
                source_file,
                input: source,
            };
            source = entry.processor.modify(&mut context)?;
        }
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Append(&'static str);

    impl ShaderPreProcessor for Append {
        fn modify(
            &self,
            context: &mut PreProcessorContext<'_>,
        ) -> Result<String, PreProcessorError> {
            Ok(format!("{}{}", context.input(), self.0))
        }
    }

    #[test]
    fn test_chain_runs_in_order() {
        let mut chain = PreProcessorChain::new();
        chain.add(Append("a"), true);
        chain.add(Append("b"), false);
        let definitions = ShaderPreDefinitions::new();
        let (source, output) = chain
            .process(
                CompileContext::new(&definitions),
                None,
                ShaderKind::Fragment,
                "x".to_string(),
            )
            .unwrap();
        assert_eq!(source, "xab");
        assert!(output.includes.is_empty());
    }

    #[test]
    fn test_lookup_falls_back_to_program_defaults() {
        let mut chain = PreProcessorChain::new();
        struct Lookup;
        impl ShaderPreProcessor for Lookup {
            fn modify(
                &self,
                context: &mut PreProcessorContext<'_>,
            ) -> Result<String, PreProcessorError> {
                Ok(format!(
                    "{:?} {:?}",
                    context.lookup_definition("A"),
                    context.lookup_definition("B")
                ))
            }
        }
        chain.add(Lookup, false);

        let definitions = ShaderPreDefinitions::from_map([("A", "1")]);
        let mut program = ProgramDefinition::default();
        program.definitions.insert("A".to_string(), "2".to_string());
        program.definitions.insert("B".to_string(), "3".to_string());
        let (source, _) = chain
            .process(
                CompileContext::new(&definitions).with_definition(&program),
                None,
                ShaderKind::Vertex,
                String::new(),
            )
            .unwrap();
        assert_eq!(source, "Some(\"1\") Some(\"3\")");
    }
}
