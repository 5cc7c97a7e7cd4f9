use super::{
    DEFAULT_PRIORITY, Function, InjectModification, ReplaceModification, ShaderModification,
};
use crate::error::ModificationSyntaxError;
use crate::id::ShaderId;

#[derive(Debug, Clone, PartialEq)]
enum HeaderToken {
    Word(String),
    Int(i64),
    Open,
    Close,
}

/// Tokens of a `[...]` section header with their 1-based columns.
fn tokenize_header(
    text: &str,
    line: usize,
    offset: usize,
) -> Result<Vec<(HeaderToken, usize)>, ModificationSyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        let column = offset + start + 1;
        if c.is_whitespace() {
            chars.next();
        } else if c == '(' {
            chars.next();
            tokens.push((HeaderToken::Open, column));
        } else if c == ')' {
            chars.next();
            tokens.push((HeaderToken::Close, column));
        } else if c.is_ascii_digit() || c == '-' {
            let mut end = start;
            while let Some(&(i, c)) = chars.peek() {
                if !(c.is_ascii_digit() || (c == '-' && i == start)) {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            let value = text[start..end]
                .parse()
                .map_err(|_| syntax(line, column, format!("invalid number '{}'", &text[start..end])))?;
            tokens.push((HeaderToken::Int(value), column));
        } else if c.is_alphanumeric() || c == '_' {
            let mut end = start;
            while let Some(&(i, c)) = chars.peek() {
                if !(c.is_alphanumeric() || c == '_') {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            tokens.push((HeaderToken::Word(text[start..end].to_string()), column));
        } else {
            return Err(syntax(line, column, format!("unexpected '{}'", c)));
        }
    }
    Ok(tokens)
}

fn syntax(line: usize, column: usize, message: impl Into<String>) -> ModificationSyntaxError {
    ModificationSyntaxError {
        line,
        column,
        message: message.into(),
    }
}

#[derive(Debug)]
enum SectionKind {
    Uniform,
    Output,
    Input,
    Function { name: String, parameters: i32, head: bool },
}

#[derive(Debug)]
struct Section {
    kind: SectionKind,
    line: usize,
    body: Vec<String>,
}

fn parse_section_header(
    text: &str,
    line: usize,
    offset: usize,
) -> Result<SectionKind, ModificationSyntaxError> {
    let tokens = tokenize_header(text, line, offset)?;
    let mut tokens = tokens.into_iter();
    let end_column = offset + text.len() + 1;
    let (first, column) = tokens
        .next()
        .ok_or_else(|| syntax(line, offset + 1, "empty section header"))?;
    let HeaderToken::Word(keyword) = first else {
        return Err(syntax(line, column, "expected section name"));
    };
    let kind = match keyword.as_str() {
        "UNIFORM" => SectionKind::Uniform,
        "OUTPUT" => SectionKind::Output,
        "INPUT" => SectionKind::Input,
        "FUNCTION" => {
            let name = match tokens.next() {
                Some((HeaderToken::Word(name), _)) => name,
                Some((_, column)) => return Err(syntax(line, column, "expected function name")),
                None => return Err(syntax(line, end_column, "expected function name")),
            };
            let mut next = tokens.next();
            let mut parameters = -1;
            if let Some((HeaderToken::Open, _)) = next {
                parameters = match tokens.next() {
                    Some((HeaderToken::Int(count), column)) => i32::try_from(count)
                        .ok()
                        .filter(|count| *count >= -1)
                        .ok_or_else(|| syntax(line, column, format!("invalid parameter count {}", count)))?,
                    Some((HeaderToken::Word(word), _)) if word == "any" => -1,
                    Some((_, column)) => {
                        return Err(syntax(line, column, "expected parameter count or 'any'"));
                    }
                    None => return Err(syntax(line, end_column, "expected parameter count")),
                };
                match tokens.next() {
                    Some((HeaderToken::Close, _)) => {}
                    Some((_, column)) => return Err(syntax(line, column, "expected ')'")),
                    None => return Err(syntax(line, end_column, "expected ')'")),
                }
                next = tokens.next();
            }
            let head = match next {
                Some((HeaderToken::Word(placement), _)) if placement == "HEAD" => true,
                Some((HeaderToken::Word(placement), _)) if placement == "TAIL" => false,
                Some((_, column)) => return Err(syntax(line, column, "expected HEAD or TAIL")),
                None => return Err(syntax(line, end_column, "expected HEAD or TAIL")),
            };
            SectionKind::Function {
                name,
                parameters,
                head,
            }
        }
        other => {
            return Err(syntax(line, column, format!("unknown section '{}'", other)));
        }
    };
    if let Some((_, column)) = tokens.next() {
        return Err(syntax(line, column, "unexpected trailing input"));
    }
    Ok(kind)
}

fn parse_id(text: &str, line: usize, column: usize) -> Result<ShaderId, ModificationSyntaxError> {
    text.trim()
        .parse()
        .map_err(|e| syntax(line, column, format!("invalid shader id: {}", e)))
}

pub(super) fn parse(input: &str) -> Result<ShaderModification, ModificationSyntaxError> {
    let mut priority: Option<i32> = None;
    let mut version = None;
    let mut includes = Vec::new();
    let mut replace: Option<(ShaderId, usize)> = None;
    let mut sections: Vec<Section> = Vec::new();

    for (index, raw) in input.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        let indent = raw.len() - raw.trim_start().len();

        if trimmed.starts_with('[') {
            let Some(header) = trimmed.strip_prefix('[').and_then(|t| t.strip_suffix(']')) else {
                return Err(syntax(line, indent + trimmed.len() + 1, "expected ']'"));
            };
            sections.push(Section {
                kind: parse_section_header(header, line, indent + 1)?,
                line,
                body: Vec::new(),
            });
            continue;
        }

        if let Some(section) = sections.last_mut() {
            section.body.push(raw.to_string());
            continue;
        }

        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        let Some(directive) = trimmed.strip_prefix('#') else {
            return Err(syntax(line, indent + 1, "expected a directive or a section"));
        };
        let name_end = directive
            .find(char::is_whitespace)
            .unwrap_or(directive.len());
        let (name, argument) = directive.split_at(name_end);
        let column = indent + 2 + name_end + (argument.len() - argument.trim_start().len());
        let argument = argument.trim();
        match name {
            "priority" => {
                if priority.is_some() {
                    return Err(syntax(line, indent + 1, "duplicate #priority"));
                }
                priority = Some(
                    argument
                        .parse()
                        .map_err(|_| syntax(line, column, format!("invalid priority '{}'", argument)))?,
                );
            }
            "version" => {
                version = Some(
                    argument
                        .parse()
                        .map_err(|_| syntax(line, column, format!("invalid version '{}'", argument)))?,
                );
            }
            "include" => includes.push(parse_id(argument, line, column)?),
            "replace" => {
                if replace.is_some() {
                    return Err(syntax(line, indent + 1, "duplicate #replace"));
                }
                replace = Some((parse_id(argument, line, column)?, line));
            }
            other => {
                return Err(syntax(line, indent + 1, format!("unknown directive '#{}'", other)));
            }
        }
    }

    let priority = priority.unwrap_or(DEFAULT_PRIORITY);
    if let Some((shader, line)) = replace {
        if let Some(section) = sections.first() {
            return Err(syntax(
                section.line,
                1,
                "a replace modification cannot declare sections",
            ));
        }
        if version.is_some() || !includes.is_empty() {
            return Err(syntax(
                line,
                1,
                "a replace modification cannot declare #version or #include",
            ));
        }
        return Ok(ShaderModification::Replace(ReplaceModification { priority, shader }));
    }

    let mut inject = InjectModification::new(priority);
    inject.version = version;
    inject.includes = includes;
    for section in sections {
        let body = section.body.join("\n").trim().to_string();
        let target = match section.kind {
            SectionKind::Uniform => &mut inject.uniforms,
            SectionKind::Output => &mut inject.outputs,
            SectionKind::Input => &mut inject.inputs,
            SectionKind::Function {
                name,
                parameters,
                head,
            } => {
                let function = Function::create(&name, parameters, head, body)
                    .map_err(|e| syntax(section.line, 1, e.to_string()))?;
                inject.functions.push(function);
                continue;
            }
        };
        match target {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(&body);
            }
            None => *target = Some(body),
        }
    }
    Ok(ShaderModification::Inject(inject))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::Arity;

    #[test]
    fn test_parse_injection() {
        let modification = ShaderModification::parse(
            "#priority 500\n\
             #version 430\n\
             #include demo:lib/fog\n\
             \n\
             [UNIFORM]\n\
             uniform float fogDensity;\n\
             \n\
             [FUNCTION main(0) TAIL]\n\
             #out0 = applyFog(#out0, fogDensity);\n\
             [FUNCTION shade HEAD]\n\
             float x = 1.0;\n",
        )
        .unwrap();
        assert_eq!(modification.priority(), 500);
        let ShaderModification::Inject(inject) = modification else {
            panic!("expected injection");
        };
        assert_eq!(inject.version, Some(430));
        assert_eq!(inject.includes[0].to_string(), "demo:lib/fog");
        assert_eq!(inject.uniforms.as_deref(), Some("uniform float fogDensity;"));
        assert_eq!(inject.functions.len(), 2);
        assert_eq!(inject.functions[0].name(), "main");
        assert_eq!(inject.functions[0].arity(), Arity::Exact(0));
        assert!(!inject.functions[0].is_head());
        assert_eq!(inject.functions[0].code(), "#out0 = applyFog(#out0, fogDensity);");
        assert_eq!(inject.functions[1].arity(), Arity::Any);
        assert!(inject.functions[1].is_head());
    }

    #[test]
    fn test_parse_replace() {
        let modification = ShaderModification::parse("#replace demo:post/other\n").unwrap();
        assert_eq!(modification.priority(), DEFAULT_PRIORITY);
        assert!(matches!(
            modification,
            ShaderModification::Replace(ReplaceModification { ref shader, .. })
                if shader.to_string() == "demo:post/other"
        ));
    }

    #[test]
    fn test_arity_any_keyword() {
        let modification = ShaderModification::parse("[FUNCTION main(any) HEAD]\nx();").unwrap();
        let ShaderModification::Inject(inject) = modification else {
            panic!("expected injection");
        };
        assert_eq!(inject.functions[0].arity(), Arity::Any);
    }

    #[test]
    fn test_replace_with_sections_rejected() {
        let error = ShaderModification::parse("#replace demo:a\n[UNIFORM]\nuniform float x;")
            .unwrap_err();
        assert_eq!(error.line, 2);
    }

    #[test]
    fn test_syntax_error_positions() {
        let error = ShaderModification::parse("#priority high").unwrap_err();
        assert_eq!((error.line, error.column), (1, 11));

        let error = ShaderModification::parse("\n[FUNCTION main(0) MIDDLE]").unwrap_err();
        assert_eq!((error.line, error.column), (2, 19));

        let error = ShaderModification::parse("[SAMPLER]").unwrap_err();
        assert_eq!((error.line, error.column), (1, 2));

        let error = ShaderModification::parse("[FUNCTION main(-2) HEAD]").unwrap_err();
        assert_eq!(error.line, 1);
        assert!(error.message.contains("-2"));

        let error = ShaderModification::parse("uniform float x;").unwrap_err();
        assert_eq!((error.line, error.column), (1, 1));
    }
}
