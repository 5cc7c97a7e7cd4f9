use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;

use super::{PreProcessorContext, ShaderPreProcessor};
use crate::error::PreProcessorError;
use crate::glsl::TranslationUnit;
use crate::glsl::ast::{Declaration, Directive};
use crate::id::{ShaderId, SourceKind};
use crate::source::SourceProvider;

static IMPORT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#[ \t]*(?:include|import)\b").unwrap());

/// Splices `#include <id>` / `#import <id>` targets in place of the directive.
///
/// Each identifier is spliced once per top-level compile; later imports of the
/// same file are dropped. An import that reaches itself is an error.
pub struct ImportProcessor {
    provider: Rc<dyn SourceProvider>,
    imported: RefCell<HashSet<ShaderId>>,
    resolving: RefCell<Vec<ShaderId>>,
}

impl ImportProcessor {
    pub fn new(provider: Rc<dyn SourceProvider>) -> Self {
        Self {
            provider,
            imported: RefCell::new(HashSet::new()),
            resolving: RefCell::new(Vec::new()),
        }
    }

    fn resolve(
        &self,
        context: &mut PreProcessorContext<'_>,
        id: ShaderId,
    ) -> Result<Vec<Declaration>, PreProcessorError> {
        if self.resolving.borrow().contains(&id) {
            let mut chain = self.resolving.borrow().clone();
            chain.push(id);
            return Err(PreProcessorError::ImportCycle { chain });
        }
        if self.imported.borrow().contains(&id) {
            log::debug!("Skipping repeated import of {}", id);
            return Ok(Vec::new());
        }

        let source = self
            .provider
            .open(&id, SourceKind::Include)
            .map_err(|e| PreProcessorError::MissingImport {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        self.resolving.borrow_mut().push(id.clone());
        let processed = context.modify(&id, source);
        self.resolving.borrow_mut().pop();
        let processed = processed?;

        log::debug!("Imported {}", id);
        self.imported.borrow_mut().insert(id.clone());
        context.add_include(id);
        Ok(TranslationUnit::parse(&processed)?.declarations)
    }
}

impl ShaderPreProcessor for ImportProcessor {
    fn prepare(&self) {
        self.imported.borrow_mut().clear();
        self.resolving.borrow_mut().clear();
    }

    fn modify(&self, context: &mut PreProcessorContext<'_>) -> Result<String, PreProcessorError> {
        if !IMPORT_LINE.is_match(context.input()) {
            return Ok(context.input().to_string());
        }

        let unit = TranslationUnit::parse(context.input())?;
        let mut declarations = Vec::with_capacity(unit.declarations.len());
        for declaration in unit.declarations {
            let target = match &declaration {
                Declaration::Directive(directive) => import_target(directive)?,
                _ => None,
            };
            match target {
                Some(id) => declarations.extend(self.resolve(context, id)?),
                None => declarations.push(declaration),
            }
        }
        Ok(TranslationUnit { declarations }.to_source())
    }
}

/// Target of an import directive, accepting a bare id, `"id"` or `<id>`.
fn import_target(directive: &Directive) -> Result<Option<ShaderId>, PreProcessorError> {
    if !matches!(directive.name(), "include" | "import") {
        return Ok(None);
    }
    let arguments = directive.arguments();
    let target = arguments
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .or_else(|| {
            arguments
                .strip_prefix('<')
                .and_then(|rest| rest.strip_suffix('>'))
        })
        .unwrap_or(arguments)
        .trim();
    if target.is_empty() {
        return Err(PreProcessorError::InvalidImport(directive.text.clone()));
    }
    target
        .parse()
        .map(Some)
        .map_err(|_| PreProcessorError::InvalidImport(directive.text.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileContext;
    use crate::definitions::ShaderPreDefinitions;
    use crate::id::ShaderKind;
    use crate::processor::PreProcessorChain;
    use crate::source::MemorySourceProvider;

    fn chain(provider: MemorySourceProvider) -> PreProcessorChain {
        let mut chain = PreProcessorChain::new();
        chain.add(ImportProcessor::new(Rc::new(provider)), true);
        chain
    }

    fn run(chain: &PreProcessorChain, source: &str) -> Result<String, PreProcessorError> {
        let definitions = ShaderPreDefinitions::new();
        chain
            .process(
                CompileContext::new(&definitions),
                None,
                ShaderKind::Fragment,
                source.to_string(),
            )
            .map(|(source, _)| source)
    }

    #[test]
    fn test_import_forms() {
        let provider = MemorySourceProvider::new().with(
            "demo:lib",
            SourceKind::Include,
            "float lib() { return 1.0; }",
        );
        let chain = chain(provider);
        for line in ["#include demo:lib", "#import \"demo:lib\"", "#include <demo:lib>"] {
            let source = run(&chain, &format!("{}\nvoid main() {{}}", line)).unwrap();
            assert!(source.contains("float lib()"), "{}", line);
            assert!(!source.contains("demo:lib"), "{}", line);
        }
    }

    #[test]
    fn test_repeated_import_is_elided() {
        let provider = MemorySourceProvider::new().with(
            "demo:lib",
            SourceKind::Include,
            "float lib() { return 1.0; }",
        );
        let chain = chain(provider);
        let once = run(&chain, "#include demo:lib\nvoid main() {}").unwrap();
        let twice = run(&chain, "#include demo:lib\n#include demo:lib\nvoid main() {}").unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.matches("float lib()").count(), 1);
    }

    #[test]
    fn test_import_cycle() {
        let provider = MemorySourceProvider::new()
            .with("demo:a", SourceKind::Include, "#include demo:b\nfloat a;")
            .with("demo:b", SourceKind::Include, "#include demo:a\nfloat b;");
        let chain = chain(provider);
        match run(&chain, "#include demo:a\nvoid main() {}") {
            Err(PreProcessorError::ImportCycle { chain }) => {
                let names: Vec<_> = chain.iter().map(ToString::to_string).collect();
                assert_eq!(names, vec!["demo:a", "demo:b", "demo:a"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_import() {
        let chain = chain(MemorySourceProvider::new());
        let result = run(&chain, "#include demo:nothing\nvoid main() {}");
        assert!(matches!(result, Err(PreProcessorError::MissingImport { .. })));
    }

    #[test]
    fn test_invalid_import() {
        let chain = chain(MemorySourceProvider::new());
        assert!(matches!(
            run(&chain, "#include \"\"\nvoid main() {}"),
            Err(PreProcessorError::InvalidImport(_))
        ));
        assert!(matches!(
            run(&chain, "#include Bad:Name\nvoid main() {}"),
            Err(PreProcessorError::InvalidImport(_))
        ));
    }

    #[test]
    fn test_source_without_imports_is_untouched() {
        let chain = chain(MemorySourceProvider::new());
        let source = "// comment\nvoid main() {}\n";
        assert_eq!(run(&chain, source).unwrap(), source);
    }
}
