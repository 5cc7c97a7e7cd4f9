use super::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(String),
    Float(String),
    Punct(&'static str),
    /// A whole preprocessor line, continuation lines joined, comments removed.
    Directive(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

// Longest first so that greedy matching picks `<<=` over `<<` over `<`.
const PUNCTUATION: &[&str] = &[
    "<<=", ">>=", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "^^", "+=", "-=",
    "*=", "/=", "%=", "&=", "|=", "^=", "(", ")", "[", "]", "{", "}", ".", ",", ";", ":", "?",
    "=", "+", "-", "*", "/", "%", "<", ">", "!", "~", "&", "|", "^",
];

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        line_start: true,
    }
    .run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    line_start: bool,
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn run(mut self) -> Result<Vec<Spanned>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                self.bump();
                self.line_start = true;
                continue;
            }
            if c.is_whitespace() {
                self.bump();
                continue;
            }
            if c == '/' && self.peek(1) == Some('/') {
                self.skip_line_comment();
                continue;
            }
            if c == '/' && self.peek(1) == Some('*') {
                self.skip_block_comment()?;
                continue;
            }

            let line = self.line;
            let token = if c == '#' {
                if !self.line_start {
                    return Err(ParseError::new(line, "'#' must start a preprocessor line"));
                }
                self.directive()
            } else if c.is_ascii_alphabetic() || c == '_' {
                self.identifier()
            } else if c.is_ascii_digit() || (c == '.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) {
                self.number()
            } else {
                self.punctuation()?
            };
            self.line_start = matches!(token, Token::Directive(_));
            tokens.push(Spanned { token, line });
        }
        Ok(tokens)
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ParseError> {
        let line = self.line;
        self.pos += 2;
        loop {
            match self.bump() {
                Some('*') if self.peek(0) == Some('/') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => {}
                None => return Err(ParseError::new(line, "unterminated block comment")),
            }
        }
    }

    fn directive(&mut self) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek(0) {
            match c {
                '\n' => break,
                '\\' if self.peek(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                    text.push(' ');
                }
                '\\' if self.peek(1) == Some('\r') && self.peek(2) == Some('\n') => {
                    self.bump();
                    self.bump();
                    self.bump();
                    text.push(' ');
                }
                '/' if self.peek(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek(1) == Some('*') => {
                    // A block comment inside a directive may not span lines here.
                    self.pos += 2;
                    while let Some(c) = self.peek(0) {
                        if c == '*' && self.peek(1) == Some('/') {
                            self.pos += 2;
                            break;
                        }
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                    text.push(' ');
                }
                _ => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        Token::Directive(text.trim_end().to_string())
    }

    fn identifier(&mut self) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Token::Ident(text)
    }

    fn number(&mut self) -> Token {
        let mut text = String::new();
        let mut float = false;

        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x' | 'X')) {
            text.push(self.bump().unwrap_or('0'));
            text.push(self.bump().unwrap_or('x'));
            while let Some(c) = self.peek(0) {
                if c.is_ascii_hexdigit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        } else {
            while let Some(c) = self.peek(0) {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else if c == '.' && !float {
                    float = true;
                    text.push(c);
                    self.bump();
                } else if matches!(c, 'e' | 'E')
                    && (self.peek(1).is_some_and(|n| n.is_ascii_digit())
                        || (matches!(self.peek(1), Some('+' | '-'))
                            && self.peek(2).is_some_and(|n| n.is_ascii_digit())))
                {
                    float = true;
                    text.push(c);
                    self.bump();
                    if let Some(sign @ ('+' | '-')) = self.peek(0) {
                        text.push(sign);
                        self.bump();
                    }
                } else {
                    break;
                }
            }
        }

        // Type suffixes: u/U for unsigned, f/F and lf/LF for floats.
        match (self.peek(0), self.peek(1)) {
            (Some('u' | 'U'), _) if !float => {
                text.push(self.bump().unwrap_or('u'));
            }
            (Some('f' | 'F'), _) => {
                float = true;
                text.push(self.bump().unwrap_or('f'));
            }
            (Some('l' | 'L'), Some('f' | 'F')) => {
                float = true;
                text.push(self.bump().unwrap_or('l'));
                text.push(self.bump().unwrap_or('f'));
            }
            _ => {}
        }

        if float {
            Token::Float(text)
        } else {
            Token::Int(text)
        }
    }

    fn punctuation(&mut self) -> Result<Token, ParseError> {
        for punct in PUNCTUATION {
            let matches = punct
                .chars()
                .enumerate()
                .all(|(i, expected)| self.peek(i) == Some(expected));
            if matches {
                self.pos += punct.len();
                return Ok(Token::Punct(punct));
            }
        }
        let c = self.peek(0).unwrap_or(' ');
        Err(ParseError::new(
            self.line,
            format!("unexpected character '{}'", c),
        ))
    }
}
