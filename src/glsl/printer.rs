use std::fmt::Write;

use super::ast::*;

const INDENT: &str = "    ";

/// Serializes a translation unit back to GLSL source. Directives always land
/// on their own line.
pub fn print(unit: &TranslationUnit) -> String {
    let mut printer = Printer::default();
    for declaration in &unit.declarations {
        printer.declaration(declaration);
    }
    printer.out
}

pub fn print_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

#[derive(Default)]
struct Printer {
    out: String,
    depth: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn declaration(&mut self, declaration: &Declaration) {
        match declaration {
            Declaration::Directive(directive) => self.directive(directive),
            Declaration::Precision { precision, ty } => {
                let text = format!("precision {} {};", precision, type_text(ty));
                self.line(&text);
            }
            Declaration::Qualifiers(qualifiers) => {
                let text = format!("{};", qualifiers_text(qualifiers).trim_end());
                self.line(&text);
            }
            Declaration::Variable(variable) => self.variable(variable),
            Declaration::Block(block) => {
                let header = format!("{}{} {{", qualifiers_text(&block.qualifiers), block.name);
                self.line(&header);
                self.members(&block.members);
                let tail = match &block.instance {
                    Some(instance) => format!("}} {};", declarator_text(instance)),
                    None => "};".to_string(),
                };
                self.line(&tail);
            }
            Declaration::Function(function) => self.function(function),
        }
    }

    fn directive(&mut self, directive: &Directive) {
        // Directives are never indented so nested ones stay readable in logs.
        self.out.push_str(&directive.text);
        self.out.push('\n');
    }

    fn members(&mut self, members: &[Member]) {
        self.depth += 1;
        for member in members {
            match member {
                Member::Field(field) => self.variable(field),
                Member::Directive(directive) => self.directive(directive),
            }
        }
        self.depth -= 1;
    }

    fn variable(&mut self, variable: &VariableDeclaration) {
        let prefix = qualifiers_text(&variable.qualifiers);
        match &variable.ty.structure {
            Some(structure) => {
                let header = match &structure.name {
                    Some(name) => format!("{}struct {} {{", prefix, name),
                    None => format!("{}struct {{", prefix),
                };
                self.line(&header);
                self.members(&structure.members);
                let mut tail = format!("}}{}", array_text(&variable.ty.array));
                if !variable.declarators.is_empty() {
                    tail.push(' ');
                    tail.push_str(&declarators_text(&variable.declarators));
                }
                tail.push(';');
                self.line(&tail);
            }
            None => {
                let mut text = format!("{}{}", prefix, type_text(&variable.ty));
                if !variable.declarators.is_empty() {
                    text.push(' ');
                    text.push_str(&declarators_text(&variable.declarators));
                }
                text.push(';');
                self.line(&text);
            }
        }
    }

    fn function(&mut self, function: &FunctionDefinition) {
        let parameters = function
            .parameters
            .iter()
            .map(|parameter| {
                let mut text = format!("{}{}", qualifiers_text(&parameter.qualifiers), type_text(&parameter.ty));
                if let Some(name) = &parameter.name {
                    text.push(' ');
                    text.push_str(name);
                }
                text.push_str(&array_text(&parameter.array));
                text
            })
            .collect::<Vec<_>>()
            .join(", ");
        let signature = format!(
            "{}{} {}({})",
            qualifiers_text(&function.qualifiers),
            type_text(&function.return_type),
            function.name,
            parameters
        );
        match &function.body {
            None => self.line(&format!("{};", signature)),
            Some(body) => {
                self.line(&format!("{} {{", signature));
                self.body(body);
                self.line("}");
            }
        }
    }

    fn body(&mut self, statements: &[Statement]) {
        self.depth += 1;
        for statement in statements {
            self.statement(statement);
        }
        self.depth -= 1;
    }

    /// Statement used as the body of a control construct.
    fn nested(&mut self, header: &str, statement: &Statement) {
        match statement {
            Statement::Block(statements) => {
                self.line(&format!("{} {{", header));
                self.body(statements);
                self.line("}");
            }
            other => {
                self.line(header);
                self.depth += 1;
                self.statement(other);
                self.depth -= 1;
            }
        }
    }

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Block(statements) => {
                self.line("{");
                self.body(statements);
                self.line("}");
            }
            Statement::Declaration(variable) => self.variable(variable),
            Statement::Expression(None) => self.line(";"),
            Statement::Expression(Some(expr)) => self.line(&format!("{};", print_expr(expr))),
            Statement::If {
                condition,
                then,
                otherwise,
            } => {
                self.nested(&format!("if ({})", print_expr(condition)), then);
                if let Some(otherwise) = otherwise {
                    self.nested("else", otherwise);
                }
            }
            Statement::Switch { selector, body } => {
                self.line(&format!("switch ({}) {{", print_expr(selector)));
                self.body(body);
                self.line("}");
            }
            Statement::Case(Some(value)) => self.line(&format!("case {}:", print_expr(value))),
            Statement::Case(None) => self.line("default:"),
            Statement::While { condition, body } => {
                self.nested(&format!("while ({})", print_expr(condition)), body);
            }
            Statement::DoWhile { body, condition } => {
                self.nested("do", body);
                self.line(&format!("while ({});", print_expr(condition)));
            }
            Statement::For {
                init,
                condition,
                step,
                body,
            } => {
                let init = match init.as_deref() {
                    Some(Statement::Declaration(variable)) => inline_variable(variable),
                    Some(Statement::Expression(Some(expr))) => print_expr(expr),
                    _ => String::new(),
                };
                let condition = condition.as_ref().map(print_expr).unwrap_or_default();
                let step = step.as_ref().map(print_expr).unwrap_or_default();
                self.nested(&format!("for ({}; {}; {})", init, condition, step), body);
            }
            Statement::Break => self.line("break;"),
            Statement::Continue => self.line("continue;"),
            Statement::Discard => self.line("discard;"),
            Statement::Return(None) => self.line("return;"),
            Statement::Return(Some(value)) => self.line(&format!("return {};", print_expr(value))),
            Statement::Directive(directive) => self.directive(directive),
        }
    }
}

fn inline_variable(variable: &VariableDeclaration) -> String {
    format!(
        "{}{} {}",
        qualifiers_text(&variable.qualifiers),
        type_text(&variable.ty),
        declarators_text(&variable.declarators)
    )
}

/// Qualifiers followed by a trailing space, or an empty string.
fn qualifiers_text(qualifiers: &[TypeQualifier]) -> String {
    let mut text = String::new();
    for qualifier in qualifiers {
        match qualifier {
            TypeQualifier::Layout(entries) => {
                let entries = entries
                    .iter()
                    .map(|entry| match &entry.value {
                        Some(value) => format!("{} = {}", entry.name, print_expr(value)),
                        None => entry.name.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = write!(text, "layout({}) ", entries);
            }
            TypeQualifier::Keyword(keyword) => {
                text.push_str(keyword);
                text.push(' ');
            }
        }
    }
    text
}

fn type_text(ty: &TypeSpecifier) -> String {
    format!("{}{}", ty.name, array_text(&ty.array))
}

fn array_text(sizes: &[Option<Expr>]) -> String {
    sizes
        .iter()
        .map(|size| match size {
            Some(size) => format!("[{}]", print_expr(size)),
            None => "[]".to_string(),
        })
        .collect()
}

fn declarator_text(declarator: &Declarator) -> String {
    let mut text = format!("{}{}", declarator.name, array_text(&declarator.array));
    if let Some(initializer) = &declarator.initializer {
        text.push_str(" = ");
        write_initializer(&mut text, initializer);
    }
    text
}

fn declarators_text(declarators: &[Declarator]) -> String {
    declarators
        .iter()
        .map(declarator_text)
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_initializer(out: &mut String, initializer: &Initializer) {
    match initializer {
        Initializer::Expr(expr) => write_expr(out, expr),
        Initializer::List(items) => {
            out.push('{');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_initializer(out, item);
            }
            out.push('}');
        }
    }
}

fn unary_text(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Plus => "+",
        UnaryOp::Minus => "-",
        UnaryOp::Not => "!",
        UnaryOp::Complement => "~",
        UnaryOp::PreIncrement => "++",
        UnaryOp::PreDecrement => "--",
    }
}

fn binary_text(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Or => "||",
        BinaryOp::Xor => "^^",
        BinaryOp::And => "&&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::BitAnd => "&",
        BinaryOp::Equal => "==",
        BinaryOp::NotEqual => "!=",
        BinaryOp::Less => "<",
        BinaryOp::Greater => ">",
        BinaryOp::LessEqual => "<=",
        BinaryOp::GreaterEqual => ">=",
        BinaryOp::LeftShift => "<<",
        BinaryOp::RightShift => ">>",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
    }
}

fn assign_text(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Assign => "=",
        AssignOp::Add => "+=",
        AssignOp::Sub => "-=",
        AssignOp::Mul => "*=",
        AssignOp::Div => "/=",
        AssignOp::Mod => "%=",
        AssignOp::LeftShift => "<<=",
        AssignOp::RightShift => ">>=",
        AssignOp::And => "&=",
        AssignOp::Xor => "^=",
        AssignOp::Or => "|=",
    }
}

// Parentheses come from `Expr::Paren`, so nesting is printed as parsed.
fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Identifier(name) => out.push_str(name),
        Expr::IntConst(text) | Expr::FloatConst(text) => out.push_str(text),
        Expr::BoolConst(value) => out.push_str(if *value { "true" } else { "false" }),
        Expr::Unary(op, operand) => {
            out.push_str(unary_text(*op));
            // Keep `- -x` from collapsing into `--x`.
            if matches!(operand.as_ref(), Expr::Unary(..)) {
                out.push(' ');
            }
            write_expr(out, operand);
        }
        Expr::PostIncrement(operand) => {
            write_expr(out, operand);
            out.push_str("++");
        }
        Expr::PostDecrement(operand) => {
            write_expr(out, operand);
            out.push_str("--");
        }
        Expr::Binary(op, lhs, rhs) => {
            write_expr(out, lhs);
            let _ = write!(out, " {} ", binary_text(*op));
            write_expr(out, rhs);
        }
        Expr::Assign(op, lhs, rhs) => {
            write_expr(out, lhs);
            let _ = write!(out, " {} ", assign_text(*op));
            write_expr(out, rhs);
        }
        Expr::Ternary(condition, then, otherwise) => {
            write_expr(out, condition);
            out.push_str(" ? ");
            write_expr(out, then);
            out.push_str(" : ");
            write_expr(out, otherwise);
        }
        Expr::Call(function, args) => {
            write_expr(out, function);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, arg);
            }
            out.push(')');
        }
        Expr::Index(base, index) => {
            write_expr(out, base);
            out.push('[');
            if let Some(index) = index {
                write_expr(out, index);
            }
            out.push(']');
        }
        Expr::Field(base, field) => {
            write_expr(out, base);
            out.push('.');
            out.push_str(field);
        }
        Expr::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, item);
            }
        }
        Expr::Paren(inner) => {
            out.push('(');
            write_expr(out, inner);
            out.push(')');
        }
    }
}
