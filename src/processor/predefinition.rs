use std::sync::LazyLock;

use regex::Regex;

use super::{PreProcessorContext, ShaderPreProcessor};
use crate::definitions::define_line;
use crate::error::PreProcessorError;
use crate::glsl::TranslationUnit;
use crate::glsl::ast::{Declaration, Directive};

const STANDARD_DIRECTIVES: &[&str] = &[
    "define", "undef", "if", "ifdef", "ifndef", "elif", "else", "endif", "error", "pragma",
    "extension", "version", "line", "include", "import",
];

const CONDITIONALS: &[&str] = &["if", "ifdef", "ifndef", "elif"];

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());

/// Expands `#NAME` lines into `#define NAME value` and records which
/// definitions the source depends on.
///
/// A `#NAME` line whose definition is absent is removed. Identifiers tested by
/// `#if`, `#ifdef`, `#ifndef` and `#elif` are recorded as dependencies too, so
/// that changing a definition recompiles every program it could affect.
/// Static definitions are emitted at the top of the top-level source.
#[derive(Default)]
pub struct PreDefinitionProcessor;

impl PreDefinitionProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl ShaderPreProcessor for PreDefinitionProcessor {
    fn modify(&self, context: &mut PreProcessorContext<'_>) -> Result<String, PreProcessorError> {
        let statics: Vec<(String, String)> = if context.is_source_file() {
            context
                .pre_definitions()
                .static_definitions()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect()
        } else {
            Vec::new()
        };
        if statics.is_empty() && !context.input().contains('#') {
            return Ok(context.input().to_string());
        }

        let mut unit = TranslationUnit::parse(context.input())?;
        let mut dependencies = Vec::new();
        let mut expansions = Vec::new();
        unit.rewrite_directives(&mut |directive| {
            let name = directive.name();
            if CONDITIONALS.contains(&name) {
                dependencies.extend(
                    IDENTIFIER
                        .find_iter(directive.arguments())
                        .map(|m| m.as_str())
                        .filter(|identifier| *identifier != "defined")
                        .map(str::to_string),
                );
                return Some(directive);
            }
            if name.is_empty() || STANDARD_DIRECTIVES.contains(&name) {
                return Some(directive);
            }
            let name = name.to_string();
            dependencies.push(name.clone());
            expansions.push(name);
            Some(directive)
        });

        // Second pass once the names are known; lookups borrow the context.
        let values: Vec<(String, Option<String>)> = expansions
            .into_iter()
            .map(|name| {
                let value = context.lookup_definition(&name).map(str::to_string);
                (name, value)
            })
            .collect();
        if !values.is_empty() {
            unit.rewrite_directives(&mut |directive| {
                match values.iter().find(|(name, _)| name == directive.name()) {
                    Some((name, Some(value))) => Some(Directive::new(define_line(name, value))),
                    Some((_, None)) => None,
                    None => Some(directive),
                }
            });
        }

        for (index, (name, value)) in statics.iter().enumerate() {
            dependencies.push(name.clone());
            unit.declarations
                .insert(index, Declaration::Directive(Directive::new(define_line(name, value))));
        }

        for name in &dependencies {
            context.add_definition_dependency(name);
        }
        Ok(unit.to_source())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileContext;
    use crate::definitions::ShaderPreDefinitions;
    use crate::id::ShaderKind;
    use crate::processor::{PreProcessorChain, PreProcessorOutput};
    use crate::program::ProgramDefinition;

    fn run(
        definitions: &ShaderPreDefinitions,
        program: Option<&ProgramDefinition>,
        source: &str,
    ) -> (String, PreProcessorOutput) {
        let mut chain = PreProcessorChain::new();
        chain.add(PreDefinitionProcessor::new(), false);
        let mut context = CompileContext::new(definitions);
        if let Some(program) = program {
            context = context.with_definition(program);
        }
        chain
            .process(context, None, ShaderKind::Fragment, source.to_string())
            .unwrap()
    }

    #[test]
    fn test_definition_line_expanded() {
        let definitions = ShaderPreDefinitions::from_map([("SAMPLES", "4")]);
        let (source, output) = run(&definitions, None, "#SAMPLES\nvoid main() {}");
        assert!(source.contains("#define SAMPLES 4"));
        assert!(output.definition_dependencies.contains("SAMPLES"));
    }

    #[test]
    fn test_absent_definition_removed() {
        let definitions = ShaderPreDefinitions::new();
        let (source, output) = run(&definitions, None, "#SHADOWS\nvoid main() {}");
        assert!(!source.contains("SHADOWS"));
        assert!(output.definition_dependencies.contains("SHADOWS"));
    }

    #[test]
    fn test_program_defaults_apply_when_global_missing() {
        let definitions = ShaderPreDefinitions::new();
        let mut program = ProgramDefinition::default();
        program
            .definitions
            .insert("QUALITY".to_string(), "2".to_string());
        let (source, _) = run(&definitions, Some(&program), "#QUALITY\nvoid main() {}");
        assert!(source.contains("#define QUALITY 2"));
    }

    #[test]
    fn test_conditionals_recorded_as_dependencies() {
        let definitions = ShaderPreDefinitions::new();
        let (source, output) = run(
            &definitions,
            None,
            "#if defined(FOG) && LEVEL > 1\nuniform float fog;\n#endif\nvoid main() {\n#ifdef DEBUG\n#endif\n}",
        );
        assert!(source.contains("#if defined(FOG) && LEVEL > 1"));
        let dependencies: Vec<_> = output.definition_dependencies.iter().cloned().collect();
        assert_eq!(dependencies, vec!["DEBUG", "FOG", "LEVEL"]);
    }

    #[test]
    fn test_static_definitions_at_top() {
        let mut definitions = ShaderPreDefinitions::new();
        definitions.set_static("PLATFORM", "1");
        let (source, output) = run(&definitions, None, "void main() {}");
        assert!(source.starts_with("#define PLATFORM 1"));
        assert!(output.definition_dependencies.contains("PLATFORM"));
    }
}
