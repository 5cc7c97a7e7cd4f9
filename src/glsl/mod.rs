//! GLSL translation units: tokenizing, parsing into a tree and printing back.
//!
//! Preprocessor lines are not expanded. They are kept as [`ast::Directive`]
//! nodes wherever a declaration, member or statement may appear, which is
//! where the pre-processors and the native compiler expect them.

pub mod ast;
mod lexer;
mod parser;
mod printer;

pub use ast::TranslationUnit;
pub use parser::is_builtin_type;
pub use printer::print_expr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

pub fn parse(source: &str) -> Result<TranslationUnit, ParseError> {
    parser::parse(source)
}

impl TranslationUnit {
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        parser::parse(source)
    }

    pub fn to_source(&self) -> String {
        printer::print(self)
    }
}
