use super::ast::*;
use super::lexer::{Spanned, Token, tokenize};
use super::ParseError;

const QUALIFIER_KEYWORDS: &[&str] = &[
    "const", "in", "out", "inout", "uniform", "buffer", "shared", "attribute", "varying",
    "centroid", "patch", "sample", "flat", "smooth", "noperspective", "highp", "mediump", "lowp",
    "invariant", "precise", "coherent", "volatile", "restrict", "readonly", "writeonly",
];

const SCALAR_TYPES: &[&str] = &["void", "bool", "int", "uint", "float", "double", "atomic_uint"];

const VECTOR_PREFIXES: &[&str] = &["vec", "bvec", "ivec", "uvec", "dvec", "mat", "dmat"];

const OPAQUE_PREFIXES: &[&str] = &[
    "sampler", "isampler", "usampler", "image", "iimage", "uimage", "texture", "itexture",
    "utexture", "subpassInput",
];

pub fn is_builtin_type(name: &str) -> bool {
    if SCALAR_TYPES.contains(&name) {
        return true;
    }
    if VECTOR_PREFIXES.iter().any(|prefix| {
        name.strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
    }) {
        return true;
    }
    OPAQUE_PREFIXES.iter().any(|prefix| {
        name.strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit() || c.is_ascii_uppercase()))
    })
}

/// Parses a complete translation unit.
pub fn parse(source: &str) -> Result<TranslationUnit, ParseError> {
    let mut parser = Parser::new(tokenize(source)?);
    let mut declarations = Vec::new();
    while !parser.at_end() {
        if parser.eat_punct(";") {
            continue;
        }
        declarations.push(parser.declaration()?);
    }
    Ok(TranslationUnit { declarations })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|spanned| &spanned.token)
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |spanned| spanned.line)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line(), message)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(token) => self.error(format!("expected {}, found {}", expected, describe(token))),
            None => self.error(format!("expected {}, found end of input", expected)),
        }
    }

    fn is_punct_at(&self, offset: usize, punct: &str) -> bool {
        matches!(self.peek_at(offset), Some(Token::Punct(p)) if *p == punct)
    }

    fn is_punct(&self, punct: &str) -> bool {
        self.is_punct_at(0, punct)
    }

    fn ident_at(&self, offset: usize) -> Option<&str> {
        match self.peek_at(offset) {
            Some(Token::Ident(name)) => Some(name),
            _ => None,
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        self.ident_at(0) == Some(keyword)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), ParseError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", punct)))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn take_directive(&mut self) -> Option<Directive> {
        match self.peek() {
            Some(Token::Directive(text)) => {
                let directive = Directive::new(text.clone());
                self.pos += 1;
                Some(directive)
            }
            _ => None,
        }
    }

    // ---- declarations ----

    fn declaration(&mut self) -> Result<Declaration, ParseError> {
        if let Some(directive) = self.take_directive() {
            return Ok(Declaration::Directive(directive));
        }

        if self.is_keyword("precision") {
            self.pos += 1;
            let precision = self.expect_ident()?;
            let ty = self.type_specifier()?;
            self.expect_punct(";")?;
            return Ok(Declaration::Precision { precision, ty });
        }

        let qualifiers = self.qualifiers()?;
        if !qualifiers.is_empty() && self.eat_punct(";") {
            return Ok(Declaration::Qualifiers(qualifiers));
        }

        if !qualifiers.is_empty()
            && self.ident_at(0).is_some_and(|name| name != "struct")
            && self.is_punct_at(1, "{")
        {
            return self.interface_block(qualifiers).map(Declaration::Block);
        }

        let ty = self.type_specifier()?;
        if self.eat_punct(";") {
            return Ok(Declaration::Variable(VariableDeclaration {
                qualifiers,
                ty,
                declarators: Vec::new(),
            }));
        }

        let name = self.expect_ident()?;
        if self.is_punct("(") {
            return self
                .function(qualifiers, ty, name)
                .map(Declaration::Function);
        }

        let declarators = self.declarators(name)?;
        Ok(Declaration::Variable(VariableDeclaration {
            qualifiers,
            ty,
            declarators,
        }))
    }

    fn qualifiers(&mut self) -> Result<Vec<TypeQualifier>, ParseError> {
        let mut qualifiers = Vec::new();
        loop {
            if self.is_keyword("layout") && self.is_punct_at(1, "(") {
                self.pos += 2;
                let mut entries = Vec::new();
                loop {
                    let name = self.expect_ident()?;
                    let value = if self.eat_punct("=") {
                        Some(self.conditional()?)
                    } else {
                        None
                    };
                    entries.push(LayoutQualifier { name, value });
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct(")")?;
                qualifiers.push(TypeQualifier::Layout(entries));
                continue;
            }

            match self.ident_at(0) {
                Some(keyword) if QUALIFIER_KEYWORDS.contains(&keyword) => {
                    qualifiers.push(TypeQualifier::Keyword(keyword.to_string()));
                    self.pos += 1;
                }
                _ => return Ok(qualifiers),
            }
        }
    }

    fn type_specifier(&mut self) -> Result<TypeSpecifier, ParseError> {
        let (name, structure) = if self.is_keyword("struct") {
            self.pos += 1;
            let name = match self.ident_at(0) {
                Some(_) => Some(self.expect_ident()?),
                None => None,
            };
            self.expect_punct("{")?;
            let members = self.members()?;
            let type_name = name.clone().unwrap_or_default();
            (type_name, Some(Box::new(StructSpecifier { name, members })))
        } else {
            (self.expect_ident()?, None)
        };

        Ok(TypeSpecifier {
            name,
            structure,
            array: self.array_specifiers()?,
        })
    }

    fn array_specifiers(&mut self) -> Result<Vec<Option<Expr>>, ParseError> {
        let mut sizes = Vec::new();
        while self.eat_punct("[") {
            if self.eat_punct("]") {
                sizes.push(None);
            } else {
                sizes.push(Some(self.expression()?));
                self.expect_punct("]")?;
            }
        }
        Ok(sizes)
    }

    /// Members up to and including the closing brace.
    fn members(&mut self) -> Result<Vec<Member>, ParseError> {
        let mut members = Vec::new();
        while !self.eat_punct("}") {
            if self.at_end() {
                return Err(self.unexpected("'}'"));
            }
            if let Some(directive) = self.take_directive() {
                members.push(Member::Directive(directive));
                continue;
            }
            let qualifiers = self.qualifiers()?;
            let ty = self.type_specifier()?;
            let name = self.expect_ident()?;
            let declarators = self.declarators(name)?;
            members.push(Member::Field(VariableDeclaration {
                qualifiers,
                ty,
                declarators,
            }));
        }
        Ok(members)
    }

    fn interface_block(
        &mut self,
        qualifiers: Vec<TypeQualifier>,
    ) -> Result<InterfaceBlock, ParseError> {
        let name = self.expect_ident()?;
        self.expect_punct("{")?;
        let members = self.members()?;
        let instance = match self.ident_at(0) {
            Some(_) => {
                let name = self.expect_ident()?;
                let array = self.array_specifiers()?;
                Some(Declarator {
                    name,
                    array,
                    initializer: None,
                })
            }
            None => None,
        };
        self.expect_punct(";")?;
        Ok(InterfaceBlock {
            qualifiers,
            name,
            members,
            instance,
        })
    }

    /// Declarators starting at an already consumed name, through the `;`.
    fn declarators(&mut self, first: String) -> Result<Vec<Declarator>, ParseError> {
        let mut declarators = Vec::new();
        let mut name = first;
        loop {
            let array = self.array_specifiers()?;
            let initializer = if self.eat_punct("=") {
                Some(self.initializer()?)
            } else {
                None
            };
            declarators.push(Declarator {
                name,
                array,
                initializer,
            });
            if !self.eat_punct(",") {
                break;
            }
            name = self.expect_ident()?;
        }
        self.expect_punct(";")?;
        Ok(declarators)
    }

    fn initializer(&mut self) -> Result<Initializer, ParseError> {
        if !self.eat_punct("{") {
            return self.assignment().map(Initializer::Expr);
        }
        let mut items = Vec::new();
        while !self.eat_punct("}") {
            items.push(self.initializer()?);
            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Initializer::List(items))
    }

    fn function(
        &mut self,
        qualifiers: Vec<TypeQualifier>,
        return_type: TypeSpecifier,
        name: String,
    ) -> Result<FunctionDefinition, ParseError> {
        self.expect_punct("(")?;
        let mut parameters = Vec::new();
        if self.is_keyword("void") && self.is_punct_at(1, ")") {
            self.pos += 1;
        }
        while !self.eat_punct(")") {
            let qualifiers = self.qualifiers()?;
            let ty = self.type_specifier()?;
            let name = match self.ident_at(0) {
                Some(_) => Some(self.expect_ident()?),
                None => None,
            };
            let array = self.array_specifiers()?;
            parameters.push(Parameter {
                qualifiers,
                ty,
                name,
                array,
            });
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }

        let body = if self.eat_punct(";") {
            None
        } else {
            self.expect_punct("{")?;
            Some(self.compound()?)
        };

        Ok(FunctionDefinition {
            qualifiers,
            return_type,
            name,
            parameters,
            body,
        })
    }

    // ---- statements ----

    /// Statements up to and including the closing brace.
    fn compound(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        while !self.eat_punct("}") {
            if self.at_end() {
                return Err(self.unexpected("'}'"));
            }
            statements.push(self.statement()?);
        }
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        if let Some(directive) = self.take_directive() {
            return Ok(Statement::Directive(directive));
        }
        if self.eat_punct("{") {
            return self.compound().map(Statement::Block);
        }
        if self.eat_punct(";") {
            return Ok(Statement::Expression(None));
        }

        let keyword = self.ident_at(0).map(str::to_string);
        match keyword.as_deref() {
            Some("if") => {
                self.pos += 1;
                self.expect_punct("(")?;
                let condition = self.expression()?;
                self.expect_punct(")")?;
                let then = Box::new(self.statement()?);
                let otherwise = if self.is_keyword("else") {
                    self.pos += 1;
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                Ok(Statement::If {
                    condition,
                    then,
                    otherwise,
                })
            }
            Some("switch") => {
                self.pos += 1;
                self.expect_punct("(")?;
                let selector = self.expression()?;
                self.expect_punct(")")?;
                self.expect_punct("{")?;
                let body = self.compound()?;
                Ok(Statement::Switch { selector, body })
            }
            Some("case") => {
                self.pos += 1;
                let value = self.expression()?;
                self.expect_punct(":")?;
                Ok(Statement::Case(Some(value)))
            }
            Some("default") => {
                self.pos += 1;
                self.expect_punct(":")?;
                Ok(Statement::Case(None))
            }
            Some("while") => {
                self.pos += 1;
                self.expect_punct("(")?;
                let condition = self.expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.statement()?);
                Ok(Statement::While { condition, body })
            }
            Some("do") => {
                self.pos += 1;
                let body = Box::new(self.statement()?);
                if !self.is_keyword("while") {
                    return Err(self.unexpected("'while'"));
                }
                self.pos += 1;
                self.expect_punct("(")?;
                let condition = self.expression()?;
                self.expect_punct(")")?;
                self.expect_punct(";")?;
                Ok(Statement::DoWhile { body, condition })
            }
            Some("for") => {
                self.pos += 1;
                self.expect_punct("(")?;
                let init = if self.eat_punct(";") {
                    None
                } else {
                    Some(Box::new(self.simple_statement()?))
                };
                let condition = if self.is_punct(";") {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect_punct(";")?;
                let step = if self.is_punct(")") {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect_punct(")")?;
                let body = Box::new(self.statement()?);
                Ok(Statement::For {
                    init,
                    condition,
                    step,
                    body,
                })
            }
            Some("break") => self.jump(Statement::Break),
            Some("continue") => self.jump(Statement::Continue),
            Some("discard") => self.jump(Statement::Discard),
            Some("return") => {
                self.pos += 1;
                let value = if self.is_punct(";") {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect_punct(";")?;
                Ok(Statement::Return(value))
            }
            _ => self.simple_statement(),
        }
    }

    fn jump(&mut self, statement: Statement) -> Result<Statement, ParseError> {
        self.pos += 1;
        self.expect_punct(";")?;
        Ok(statement)
    }

    /// A declaration or expression statement, through the `;`.
    fn simple_statement(&mut self) -> Result<Statement, ParseError> {
        if self.at_declaration() {
            let qualifiers = self.qualifiers()?;
            let ty = self.type_specifier()?;
            if self.eat_punct(";") {
                return Ok(Statement::Declaration(VariableDeclaration {
                    qualifiers,
                    ty,
                    declarators: Vec::new(),
                }));
            }
            let name = self.expect_ident()?;
            let declarators = self.declarators(name)?;
            return Ok(Statement::Declaration(VariableDeclaration {
                qualifiers,
                ty,
                declarators,
            }));
        }
        let expr = self.expression()?;
        self.expect_punct(";")?;
        Ok(Statement::Expression(Some(expr)))
    }

    fn at_declaration(&self) -> bool {
        let Some(first) = self.ident_at(0) else {
            return false;
        };
        if first == "struct" || first == "layout" || QUALIFIER_KEYWORDS.contains(&first) {
            return true;
        }
        if self.ident_at(1).is_some() {
            return true;
        }
        if !is_builtin_type(first) {
            return false;
        }
        if self.is_punct_at(1, "(") {
            return false;
        }
        if self.is_punct_at(1, "[") {
            // `float[2] a` declares, `float[2](a, b)` constructs.
            let mut depth = 0usize;
            let mut offset = 1;
            while let Some(token) = self.peek_at(offset) {
                match token {
                    Token::Punct("[") => depth += 1,
                    Token::Punct("]") => {
                        depth -= 1;
                        if depth == 0 {
                            return !self.is_punct_at(offset + 1, "(");
                        }
                    }
                    _ => {}
                }
                offset += 1;
            }
            return false;
        }
        true
    }

    // ---- expressions ----

    fn expression(&mut self) -> Result<Expr, ParseError> {
        let first = self.assignment()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            items.push(self.assignment()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.conditional()?;
        let op = match self.peek() {
            Some(Token::Punct(p)) => assign_op(p),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                let rhs = self.assignment()?;
                Ok(Expr::Assign(op, Box::new(lhs), Box::new(rhs)))
            }
            None => Ok(lhs),
        }
    }

    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let condition = self.binary(1)?;
        if !self.eat_punct("?") {
            return Ok(condition);
        }
        let then = self.expression()?;
        self.expect_punct(":")?;
        let otherwise = self.assignment()?;
        Ok(Expr::Ternary(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn binary(&mut self, min_precedence: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Punct(p)) => binary_op(p),
                _ => None,
            };
            let Some(op) = op else {
                return Ok(lhs);
            };
            let precedence = precedence(op);
            if precedence < min_precedence {
                return Ok(lhs);
            }
            self.pos += 1;
            let rhs = self.binary(precedence + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Punct("+")) => Some(UnaryOp::Plus),
            Some(Token::Punct("-")) => Some(UnaryOp::Minus),
            Some(Token::Punct("!")) => Some(UnaryOp::Not),
            Some(Token::Punct("~")) => Some(UnaryOp::Complement),
            Some(Token::Punct("++")) => Some(UnaryOp::PreIncrement),
            Some(Token::Punct("--")) => Some(UnaryOp::PreDecrement),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                Ok(Expr::Unary(op, Box::new(self.unary()?)))
            }
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_punct("[") {
                let index = if self.is_punct("]") {
                    None
                } else {
                    Some(Box::new(self.expression()?))
                };
                self.expect_punct("]")?;
                expr = Expr::Index(Box::new(expr), index);
            } else if self.eat_punct("(") {
                let mut args = Vec::new();
                if self.is_keyword("void") && self.is_punct_at(1, ")") {
                    self.pos += 1;
                }
                while !self.eat_punct(")") {
                    args.push(self.assignment()?);
                    if !self.eat_punct(",") {
                        self.expect_punct(")")?;
                        break;
                    }
                }
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat_punct(".") {
                let field = self.expect_ident()?;
                expr = Expr::Field(Box::new(expr), field);
            } else if self.eat_punct("++") {
                expr = Expr::PostIncrement(Box::new(expr));
            } else if self.eat_punct("--") {
                expr = Expr::PostDecrement(Box::new(expr));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let expr = match self.peek() {
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Expr::BoolConst(true),
                "false" => Expr::BoolConst(false),
                _ => Expr::Identifier(name.clone()),
            },
            Some(Token::Int(text)) => Expr::IntConst(text.clone()),
            Some(Token::Float(text)) => Expr::FloatConst(text.clone()),
            Some(Token::Punct("(")) => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect_punct(")")?;
                return Ok(Expr::Paren(Box::new(inner)));
            }
            _ => return Err(self.unexpected("expression")),
        };
        self.pos += 1;
        Ok(expr)
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("'{}'", name),
        Token::Int(text) | Token::Float(text) => format!("'{}'", text),
        Token::Punct(p) => format!("'{}'", p),
        Token::Directive(text) => format!("directive '{}'", text),
    }
}

fn assign_op(punct: &str) -> Option<AssignOp> {
    Some(match punct {
        "=" => AssignOp::Assign,
        "+=" => AssignOp::Add,
        "-=" => AssignOp::Sub,
        "*=" => AssignOp::Mul,
        "/=" => AssignOp::Div,
        "%=" => AssignOp::Mod,
        "<<=" => AssignOp::LeftShift,
        ">>=" => AssignOp::RightShift,
        "&=" => AssignOp::And,
        "^=" => AssignOp::Xor,
        "|=" => AssignOp::Or,
        _ => return None,
    })
}

fn binary_op(punct: &str) -> Option<BinaryOp> {
    Some(match punct {
        "||" => BinaryOp::Or,
        "^^" => BinaryOp::Xor,
        "&&" => BinaryOp::And,
        "|" => BinaryOp::BitOr,
        "^" => BinaryOp::BitXor,
        "&" => BinaryOp::BitAnd,
        "==" => BinaryOp::Equal,
        "!=" => BinaryOp::NotEqual,
        "<" => BinaryOp::Less,
        ">" => BinaryOp::Greater,
        "<=" => BinaryOp::LessEqual,
        ">=" => BinaryOp::GreaterEqual,
        "<<" => BinaryOp::LeftShift,
        ">>" => BinaryOp::RightShift,
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Mod,
        _ => return None,
    })
}

fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::Xor => 2,
        BinaryOp::And => 3,
        BinaryOp::BitOr => 4,
        BinaryOp::BitXor => 5,
        BinaryOp::BitAnd => 6,
        BinaryOp::Equal | BinaryOp::NotEqual => 7,
        BinaryOp::Less | BinaryOp::Greater | BinaryOp::LessEqual | BinaryOp::GreaterEqual => 8,
        BinaryOp::LeftShift | BinaryOp::RightShift => 9,
        BinaryOp::Add | BinaryOp::Sub => 10,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 11,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_declaration_kinds() {
        let unit = parse(
            r#"
#version 410 core
precision highp float;
layout(local_size_x = 8) in;
layout(std140) uniform Camera { mat4 view; mat4 proj; } camera;
uniform sampler2D tex, other[2];
struct Light { vec3 color; float radius; };
float helper(in float a, vec2 b);
void main() { }
"#,
        )
        .unwrap();

        let d = &unit.declarations;
        assert!(matches!(&d[0], Declaration::Directive(v) if v.name() == "version"));
        assert!(matches!(&d[1], Declaration::Precision { precision, .. } if precision == "highp"));
        assert!(matches!(&d[2], Declaration::Qualifiers(_)));
        assert!(matches!(&d[3], Declaration::Block(b) if b.name == "Camera" && b.instance.is_some()));
        assert!(matches!(&d[4], Declaration::Variable(v) if v.declarators.len() == 2));
        assert!(matches!(&d[5], Declaration::Variable(v) if v.ty.structure.is_some()));
        assert!(matches!(&d[6], Declaration::Function(f) if f.body.is_none() && f.parameters.len() == 2));
        assert!(matches!(&d[7], Declaration::Function(f) if f.body.is_some() && f.parameters.is_empty()));
    }

    #[test]
    fn test_statement_declaration_disambiguation() {
        let unit = parse(
            "void main() { Light l; vec3 c = vec3(1.0); a * b; float[2] f; x = float[2](1.0, 2.0)[0]; }",
        )
        .unwrap();
        let main = unit.functions().next().unwrap();
        let body = main.body.as_ref().unwrap();
        assert!(matches!(body[0], Statement::Declaration(_)));
        assert!(matches!(body[1], Statement::Declaration(_)));
        assert!(matches!(body[2], Statement::Expression(Some(Expr::Binary(BinaryOp::Mul, _, _)))));
        assert!(matches!(body[3], Statement::Declaration(_)));
        assert!(matches!(body[4], Statement::Expression(Some(Expr::Assign(..)))));
    }

    #[test]
    fn test_operator_precedence() {
        let unit = parse("void f() { x = a + b * c == d && e; }").unwrap();
        let body = unit.functions().next().unwrap().body.clone().unwrap();
        let Statement::Expression(Some(Expr::Assign(_, _, rhs))) = &body[0] else {
            panic!("expected assignment");
        };
        let Expr::Binary(BinaryOp::And, lhs, _) = rhs.as_ref() else {
            panic!("expected && at the root");
        };
        assert!(matches!(lhs.as_ref(), Expr::Binary(BinaryOp::Equal, _, _)));
    }

    #[test]
    fn test_control_flow_and_directives_in_body() {
        let unit = parse(
            r#"
int f(int n) {
    int total = 0;
    for (int i = 0; i < n; ++i) {
#ifdef DOUBLE
        total += 2;
#else
        total++;
#endif
    }
    switch (n) { case 1: break; default: return -1; }
    do { n--; } while (n > 0);
    return total > 0 ? total : 0;
}
"#,
        )
        .unwrap();
        let body = unit.functions().next().unwrap().body.clone().unwrap();
        assert_eq!(body.len(), 5);
        assert!(matches!(body[1], Statement::For { .. }));
        assert!(matches!(body[2], Statement::Switch { .. }));
        assert!(matches!(body[3], Statement::DoWhile { .. }));
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = parse("void main() {\n  x = ;\n}").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("expected expression"));
    }

    #[test]
    fn test_builtin_type_detection() {
        assert!(is_builtin_type("vec4"));
        assert!(is_builtin_type("mat3x4"));
        assert!(is_builtin_type("usampler2DArray"));
        assert!(!is_builtin_type("vector"));
        assert!(!is_builtin_type("Light"));
    }
}
