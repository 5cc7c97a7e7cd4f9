//! Declarative shader modifications.
//!
//! A modification targets one shader file and either replaces it wholesale or
//! injects declarations and code into it. Modifications are written in a
//! small text format, see [`ShaderModification::parse`].

mod manager;
mod parser;

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

pub use manager::ShaderModificationManager;

use crate::error::{ModificationError, ModificationSyntaxError};
use crate::glsl::TranslationUnit;
use crate::glsl::ast::{Declaration, Directive, layout_value};
use crate::id::ShaderId;

pub const DEFAULT_PRIORITY: i32 = 1000;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\w+)").unwrap());
static RETURN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\breturn\b").unwrap());

const PARAMETER: &str = r"(?:(?:const|in|out|inout|highp|mediump|lowp|precise)\s+)*\w+(?:\s*\[[^\]]*\])?\s+\w+(?:\s*\[[^\]]*\])?";

/// Parameter count a function injection matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Any,
    Exact(usize),
}

impl Arity {
    /// `-1` (or any negative count) matches every overload.
    pub fn from_count(count: i32) -> Self {
        usize::try_from(count).map_or(Arity::Any, Arity::Exact)
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Any => write!(f, "any"),
            Arity::Exact(count) => write!(f, "{}", count),
        }
    }
}

/// Code inserted at the start (`head`) or end of every matching function.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    arity: Arity,
    head: bool,
    code: String,
    pattern: Regex,
}

impl Function {
    pub fn create(
        name: &str,
        parameters: i32,
        head: bool,
        code: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let arity = Arity::from_count(parameters);
        let name_pattern = regex::escape(name);
        let parameters = match arity {
            Arity::Any => r"[^)]*".to_string(),
            Arity::Exact(0) => r"\s*(?:void\s*)?".to_string(),
            Arity::Exact(count) => format!(
                r"\s*{PARAMETER}(?:\s*,\s*{PARAMETER}){{{}}}\s*",
                count - 1
            ),
        };
        let pattern = Regex::new(&format!(
            r"\b\w+\s+{}\s*\({}\)[^{{;]*\{{",
            name_pattern, parameters
        ))?;
        Ok(Self {
            name: name.to_string(),
            arity,
            head,
            code: code.into(),
            pattern,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn is_head(&self) -> bool {
        self.head
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Byte offsets of the opening brace of every matching definition.
    pub fn body_starts(&self, source: &str) -> Vec<usize> {
        self.pattern
            .find_iter(source)
            .map(|m| m.end() - 1)
            .collect()
    }

    fn apply(&self, source: &mut String, code: &str) -> Result<(), ModificationError> {
        let starts = self.body_starts(source);
        if starts.is_empty() {
            return Err(ModificationError::FunctionNotFound {
                name: self.name.clone(),
                arity: self.arity,
            });
        }
        // Back to front so earlier offsets stay valid.
        for open in starts.into_iter().rev() {
            let close = matching_brace(&mask_comments(source), open)
                .ok_or_else(|| ModificationError::UnbalancedBraces(self.name.clone()))?;
            if self.head {
                source.insert_str(open + 1, &format!("\n{}\n", code));
            } else {
                let body = wrap_returns(&source[open + 1..close], code);
                source.replace_range(open + 1..close, &format!("{}\n{}\n", body, code));
            }
        }
        Ok(())
    }
}

fn matching_brace(source: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in source[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Copy of `text` with comments blanked out. Byte offsets and line breaks
/// are unchanged.
fn mask_comments(text: &str) -> String {
    let mut masked = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let blank = |masked: &mut String, c: char| {
        if c == '\n' {
            masked.push('\n');
        } else {
            masked.extend(std::iter::repeat_n(' ', c.len_utf8()));
        }
    };
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                masked.push_str("  ");
                chars.next();
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    blank(&mut masked, next);
                    chars.next();
                }
            }
            ('/', Some('*')) => {
                masked.push_str("  ");
                chars.next();
                let mut star = false;
                for next in chars.by_ref() {
                    blank(&mut masked, next);
                    if star && next == '/' {
                        break;
                    }
                    star = next == '*';
                }
            }
            _ => masked.push(c),
        }
    }
    masked
}

/// Rewrites every `return ...;` in `body` as `{ code return ...; }`.
/// Returns inside comments are left alone.
fn wrap_returns(body: &str, code: &str) -> String {
    let masked = mask_comments(body);
    let statements: Vec<(usize, usize)> = RETURN
        .find_iter(&masked)
        .filter_map(|m| {
            let start = m.start();
            let mut depth = 0i32;
            masked[start..].char_indices().find_map(|(offset, c)| match c {
                '(' => {
                    depth += 1;
                    None
                }
                ')' => {
                    depth -= 1;
                    None
                }
                ';' if depth == 0 => Some((start, start + offset + 1)),
                _ => None,
            })
        })
        .collect();

    let mut result = body.to_string();
    for (start, end) in statements.into_iter().rev() {
        let statement = result[start..end].to_string();
        result.replace_range(start..end, &format!("{{ {}\n{} }}", code, statement));
    }
    result
}

/// Replaces the target file with another source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceModification {
    pub priority: i32,
    pub shader: ShaderId,
}

/// Adds declarations and function code to the target file.
#[derive(Debug, Clone)]
pub struct InjectModification {
    pub priority: i32,
    /// Minimum `#version` the injected code needs.
    pub version: Option<u32>,
    pub includes: Vec<ShaderId>,
    pub uniforms: Option<String>,
    pub outputs: Option<String>,
    pub inputs: Option<String>,
    pub functions: Vec<Function>,
}

impl InjectModification {
    pub fn new(priority: i32) -> Self {
        Self {
            priority,
            version: None,
            includes: Vec::new(),
            uniforms: None,
            outputs: None,
            inputs: None,
            functions: Vec::new(),
        }
    }

    fn inject(&self, source: &str) -> Result<String, ModificationError> {
        let mut unit = TranslationUnit::parse(source)?;

        if let Some(minimum) = self.version {
            raise_version(&mut unit, minimum);
        }
        insert_declarations(&mut unit, "uniform", self.uniforms.as_deref())?;
        insert_declarations(&mut unit, "out", self.outputs.as_deref())?;
        insert_declarations(&mut unit, "in", self.inputs.as_deref())?;
        if !self.includes.is_empty() {
            let at = unit
                .declarations
                .iter()
                .position(|d| matches!(d, Declaration::Directive(d) if d.name() == "version"))
                .map_or(0, |index| index + 1);
            for (offset, id) in self.includes.iter().enumerate() {
                unit.declarations.insert(
                    at + offset,
                    Declaration::Directive(Directive::new(format!("#include {}", id))),
                );
            }
        }

        let placeholders = Placeholders::collect(&unit);
        let mut output = unit.to_source();
        for function in &self.functions {
            let code = placeholders.resolve(function.code())?;
            function.apply(&mut output, &code)?;
        }
        Ok(output)
    }
}

fn raise_version(unit: &mut TranslationUnit, minimum: u32) {
    let existing = unit.declarations.iter_mut().find_map(|declaration| match declaration {
        Declaration::Directive(directive) if directive.name() == "version" => Some(directive),
        _ => None,
    });
    match existing {
        Some(directive) => {
            let mut parts = directive.arguments().split_whitespace();
            let number = parts.next().and_then(|n| n.parse::<u32>().ok());
            let profile: Vec<&str> = parts.collect();
            if number.is_none_or(|number| number < minimum) {
                let mut text = format!("#version {}", minimum);
                for part in profile {
                    text.push(' ');
                    text.push_str(part);
                }
                *directive = Directive::new(text);
            }
        }
        None => unit.declarations.insert(
            0,
            Declaration::Directive(Directive::new(format!("#version {}", minimum))),
        ),
    }
}

/// Inserts `code` after the last top-level declaration of the given storage,
/// or before the first function when there is none.
fn insert_declarations(
    unit: &mut TranslationUnit,
    storage: &str,
    code: Option<&str>,
) -> Result<(), ModificationError> {
    let Some(code) = code else {
        return Ok(());
    };
    let injected = TranslationUnit::parse(code)?.declarations;
    let last = unit.declarations.iter().rposition(|declaration| match declaration {
        Declaration::Variable(variable) => variable.has_keyword(storage),
        Declaration::Block(block) => block.has_keyword(storage),
        _ => false,
    });
    let at = match last {
        Some(index) => index + 1,
        None => unit
            .declarations
            .iter()
            .position(|d| matches!(d, Declaration::Function(_)))
            .unwrap_or(unit.declarations.len()),
    };
    unit.declarations.splice(at..at, injected);
    Ok(())
}

/// Names that `#name`, `#in<N>` and `#out<N>` placeholders resolve to.
struct Placeholders {
    names: HashMap<String, String>,
}

impl Placeholders {
    fn collect(unit: &TranslationUnit) -> Self {
        let mut names = HashMap::new();
        for storage in ["in", "out"] {
            for (index, (declaration, declarator)) in unit.variables(storage).enumerate() {
                let location = layout_value(&declaration.qualifiers, "location")
                    .and_then(|entry| entry.value.as_ref())
                    .and_then(|value| value.as_int())
                    .map_or(index, |location| location as usize);
                names.insert(declarator.name.clone(), declarator.name.clone());
                names
                    .entry(format!("{}{}", storage, location))
                    .or_insert_with(|| declarator.name.clone());
            }
        }
        Self { names }
    }

    /// Substitutes placeholders outside of preprocessor lines.
    fn resolve(&self, code: &str) -> Result<String, ModificationError> {
        let mut resolved = String::with_capacity(code.len());
        for (index, line) in code.lines().enumerate() {
            if index > 0 {
                resolved.push('\n');
            }
            if is_preprocessor_line(line) {
                resolved.push_str(line);
                continue;
            }
            let mut last = 0;
            for captures in PLACEHOLDER.captures_iter(line) {
                let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                    continue;
                };
                let target = self
                    .names
                    .get(name.as_str())
                    .ok_or_else(|| ModificationError::UnresolvedPlaceholder(name.as_str().to_string()))?;
                resolved.push_str(&line[last..whole.start()]);
                resolved.push_str(target);
                last = whole.end();
            }
            resolved.push_str(&line[last..]);
        }
        Ok(resolved)
    }
}

fn is_preprocessor_line(line: &str) -> bool {
    let Some(rest) = line.trim_start().strip_prefix('#') else {
        return false;
    };
    let directive = Directive::new(format!("#{}", rest));
    PREPROCESSOR_DIRECTIVES.contains(&directive.name())
}

const PREPROCESSOR_DIRECTIVES: &[&str] = &[
    "define", "undef", "if", "ifdef", "ifndef", "elif", "else", "endif", "error", "pragma",
    "extension", "line",
];

#[derive(Debug, Clone)]
pub enum ShaderModification {
    Replace(ReplaceModification),
    Inject(InjectModification),
}

impl ShaderModification {
    /// Parses the modification text format:
    ///
    /// ```text
    /// #priority 500
    /// #version 430
    /// #include demo:lib/fog
    ///
    /// [UNIFORM]
    /// uniform float fogDensity;
    ///
    /// [FUNCTION main(0) TAIL]
    /// #out0 = applyFog(#out0);
    /// ```
    ///
    /// A file containing `#replace <id>` must not declare any section.
    pub fn parse(input: &str) -> Result<Self, ModificationSyntaxError> {
        parser::parse(input)
    }

    pub fn priority(&self) -> i32 {
        match self {
            ShaderModification::Replace(replace) => replace.priority,
            ShaderModification::Inject(inject) => inject.priority,
        }
    }

    /// Applies an injection to `source`. Replacements are resolved by the
    /// caller and cannot be injected.
    pub fn inject(&self, source: &str) -> Result<String, ModificationError> {
        match self {
            ShaderModification::Replace(_) => Err(ModificationError::ReplaceAsInjection),
            ShaderModification::Inject(inject) => inject.inject(source),
        }
    }
}
