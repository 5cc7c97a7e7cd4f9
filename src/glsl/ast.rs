//! Syntax tree for a GLSL translation unit.
//!
//! Every node kind is a variant of a closed enum so that transforms match
//! exhaustively instead of dispatching through visitors.

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranslationUnit {
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Directive(Directive),
    /// `precision highp float;`
    Precision { precision: String, ty: TypeSpecifier },
    /// Qualifiers without a declarator, e.g. `layout(local_size_x = 8) in;`
    Qualifiers(Vec<TypeQualifier>),
    Variable(VariableDeclaration),
    Block(InterfaceBlock),
    Function(FunctionDefinition),
}

/// A preprocessor line, kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub text: String,
}

impl Directive {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Directive keyword without the leading `#`, e.g. `version`.
    pub fn name(&self) -> &str {
        let body = self.text.trim_start_matches('#').trim_start();
        let end = body
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(body.len());
        &body[..end]
    }

    /// Everything after the keyword, trimmed.
    pub fn arguments(&self) -> &str {
        let body = self.text.trim_start_matches('#').trim_start();
        body[self.name().len()..].trim()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeQualifier {
    Layout(Vec<LayoutQualifier>),
    /// Storage, interpolation, precision, memory and invariance keywords.
    Keyword(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutQualifier {
    pub name: String,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpecifier {
    pub name: String,
    pub structure: Option<Box<StructSpecifier>>,
    pub array: Vec<Option<Expr>>,
}

impl TypeSpecifier {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            structure: None,
            array: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructSpecifier {
    pub name: Option<String>,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Field(VariableDeclaration),
    Directive(Directive),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub qualifiers: Vec<TypeQualifier>,
    pub ty: TypeSpecifier,
    pub declarators: Vec<Declarator>,
}

impl VariableDeclaration {
    pub fn has_keyword(&self, keyword: &str) -> bool {
        has_keyword(&self.qualifiers, keyword)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub array: Vec<Option<Expr>>,
    pub initializer: Option<Initializer>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    Expr(Expr),
    List(Vec<Initializer>),
}

/// `uniform Name { ... } instance;` and the `in`/`out`/`buffer` equivalents.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceBlock {
    pub qualifiers: Vec<TypeQualifier>,
    pub name: String,
    pub members: Vec<Member>,
    pub instance: Option<Declarator>,
}

impl InterfaceBlock {
    pub fn has_keyword(&self, keyword: &str) -> bool {
        has_keyword(&self.qualifiers, keyword)
    }
}

pub(crate) fn has_keyword(qualifiers: &[TypeQualifier], keyword: &str) -> bool {
    qualifiers
        .iter()
        .any(|qualifier| matches!(qualifier, TypeQualifier::Keyword(k) if k == keyword))
}

/// Finds `name` inside any `layout(...)` qualifier.
pub fn layout_value<'a>(qualifiers: &'a [TypeQualifier], name: &str) -> Option<&'a LayoutQualifier> {
    qualifiers.iter().find_map(|qualifier| match qualifier {
        TypeQualifier::Layout(entries) => entries.iter().find(|entry| entry.name == name),
        TypeQualifier::Keyword(_) => None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub qualifiers: Vec<TypeQualifier>,
    pub return_type: TypeSpecifier,
    pub name: String,
    pub parameters: Vec<Parameter>,
    /// `None` for a prototype.
    pub body: Option<Vec<Statement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub qualifiers: Vec<TypeQualifier>,
    pub ty: TypeSpecifier,
    pub name: Option<String>,
    pub array: Vec<Option<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Block(Vec<Statement>),
    Declaration(VariableDeclaration),
    Expression(Option<Expr>),
    If {
        condition: Expr,
        then: Box<Statement>,
        otherwise: Option<Box<Statement>>,
    },
    Switch {
        selector: Expr,
        body: Vec<Statement>,
    },
    /// `case value:` or `default:` inside a switch body.
    Case(Option<Expr>),
    While {
        condition: Expr,
        body: Box<Statement>,
    },
    DoWhile {
        body: Box<Statement>,
        condition: Expr,
    },
    For {
        init: Option<Box<Statement>>,
        condition: Option<Expr>,
        step: Option<Expr>,
        body: Box<Statement>,
    },
    Break,
    Continue,
    Discard,
    Return(Option<Expr>),
    Directive(Directive),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    Complement,
    PreIncrement,
    PreDecrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    Xor,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    LeftShift,
    RightShift,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    LeftShift,
    RightShift,
    And,
    Xor,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier(String),
    IntConst(String),
    FloatConst(String),
    BoolConst(bool),
    Unary(UnaryOp, Box<Expr>),
    PostIncrement(Box<Expr>),
    PostDecrement(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Assign(AssignOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    /// `base[index]`; the index is absent for unsized array constructors.
    Index(Box<Expr>, Option<Box<Expr>>),
    Field(Box<Expr>, String),
    Sequence(Vec<Expr>),
    Paren(Box<Expr>),
}

impl Expr {
    /// Value of an integer literal, honoring hex notation and unsigned suffix.
    pub fn as_int(&self) -> Option<u32> {
        let Expr::IntConst(text) = self else {
            return None;
        };
        let text = text.trim_end_matches(['u', 'U']);
        match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None if text.len() > 1 && text.starts_with('0') => u32::from_str_radix(text, 8).ok(),
            None => text.parse().ok(),
        }
    }
}

impl TranslationUnit {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.declarations.iter().filter_map(|declaration| match declaration {
            Declaration::Function(function) => Some(function),
            _ => None,
        })
    }

    /// Function definitions (not prototypes) with the given name and, when
    /// `arity` is set, exactly that many parameters.
    pub fn find_functions<'a>(
        &'a self,
        name: &'a str,
        arity: Option<usize>,
    ) -> impl Iterator<Item = &'a FunctionDefinition> + 'a {
        self.functions().filter(move |function| {
            function.name == name
                && function.body.is_some()
                && arity.is_none_or(|arity| function.parameters.len() == arity)
        })
    }

    pub fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.declarations.iter().filter_map(|declaration| match declaration {
            Declaration::Directive(directive) => Some(directive),
            _ => None,
        })
    }

    /// Rewrites every directive in the unit, at any nesting depth. Returning
    /// `None` removes the directive.
    pub fn rewrite_directives(&mut self, f: &mut dyn FnMut(Directive) -> Option<Directive>) {
        let declarations = std::mem::take(&mut self.declarations);
        for declaration in declarations {
            let declaration = match declaration {
                Declaration::Directive(directive) => match f(directive) {
                    Some(directive) => Declaration::Directive(directive),
                    None => continue,
                },
                Declaration::Block(mut block) => {
                    rewrite_members(&mut block.members, f);
                    Declaration::Block(block)
                }
                Declaration::Variable(mut variable) => {
                    if let Some(structure) = variable.ty.structure.as_mut() {
                        rewrite_members(&mut structure.members, f);
                    }
                    Declaration::Variable(variable)
                }
                Declaration::Function(mut function) => {
                    if let Some(body) = function.body.as_mut() {
                        rewrite_statements(body, f);
                    }
                    Declaration::Function(function)
                }
                other => other,
            };
            self.declarations.push(declaration);
        }
    }

    /// Interface blocks declared with the given storage keyword.
    pub fn blocks<'a>(&'a self, storage: &'a str) -> impl Iterator<Item = &'a InterfaceBlock> + 'a {
        self.declarations.iter().filter_map(move |declaration| match declaration {
            Declaration::Block(block) if block.has_keyword(storage) => Some(block),
            _ => None,
        })
    }

    /// Top-level variables declared with the given storage keyword, paired
    /// with the declaration carrying their qualifiers.
    pub fn variables<'a>(
        &'a self,
        storage: &'a str,
    ) -> impl Iterator<Item = (&'a VariableDeclaration, &'a Declarator)> + 'a {
        self.declarations
            .iter()
            .filter_map(move |declaration| match declaration {
                Declaration::Variable(variable) if variable.has_keyword(storage) => Some(variable),
                _ => None,
            })
            .flat_map(|variable| variable.declarators.iter().map(move |d| (variable, d)))
    }
}

fn rewrite_members(members: &mut Vec<Member>, f: &mut dyn FnMut(Directive) -> Option<Directive>) {
    let taken = std::mem::take(members);
    for member in taken {
        match member {
            Member::Directive(directive) => {
                if let Some(directive) = f(directive) {
                    members.push(Member::Directive(directive));
                }
            }
            Member::Field(mut field) => {
                if let Some(structure) = field.ty.structure.as_mut() {
                    rewrite_members(&mut structure.members, f);
                }
                members.push(Member::Field(field));
            }
        }
    }
}

fn rewrite_statements(
    statements: &mut Vec<Statement>,
    f: &mut dyn FnMut(Directive) -> Option<Directive>,
) {
    let taken = std::mem::take(statements);
    for mut statement in taken {
        if let Statement::Directive(directive) = statement {
            if let Some(directive) = f(directive) {
                statements.push(Statement::Directive(directive));
            }
            continue;
        }
        rewrite_nested(&mut statement, f);
        statements.push(statement);
    }
}

fn rewrite_nested(statement: &mut Statement, f: &mut dyn FnMut(Directive) -> Option<Directive>) {
    if let Statement::Directive(directive) = statement {
        let rewritten = f(directive.clone());
        *statement = match rewritten {
            Some(directive) => Statement::Directive(directive),
            None => Statement::Expression(None),
        };
        return;
    }
    match statement {
        Statement::Block(statements) | Statement::Switch { body: statements, .. } => {
            rewrite_statements(statements, f)
        }
        Statement::If {
            then, otherwise, ..
        } => {
            rewrite_boxed(then, f);
            if let Some(otherwise) = otherwise {
                rewrite_boxed(otherwise, f);
            }
        }
        Statement::While { body, .. } | Statement::DoWhile { body, .. } => rewrite_boxed(body, f),
        Statement::For { body, .. } => rewrite_boxed(body, f),
        Statement::Directive(_)
        | Statement::Declaration(_)
        | Statement::Expression(_)
        | Statement::Case(_)
        | Statement::Break
        | Statement::Continue
        | Statement::Discard
        | Statement::Return(_) => {}
    }
}

fn rewrite_boxed(statement: &mut Box<Statement>, f: &mut dyn FnMut(Directive) -> Option<Directive>) {
    rewrite_nested(statement.as_mut(), f);
}
