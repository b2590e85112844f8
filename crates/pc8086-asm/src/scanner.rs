//! Character stream to lexemes.

use serde::Serialize;

/// A value tagged with the 1-based source line it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Located<T> {
    pub line: usize,
    pub value: T,
}

impl<T> Located<T> {
    pub fn new(line: usize, value: T) -> Self {
        Self { line, value }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Located<U> {
        Located {
            line: self.line,
            value: f(self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Lexeme {
    Comment(String),
    Identifier(String),
    Numeric(String),
    Str(String),
    Comma,
    /// One of `[ ] + - :`.
    Punct(char),
    Newline,
    Unknown(char),
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '_' | '.' | '@' | '?')
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '?')
}

/// Split `source` into lexemes. Whitespace other than newlines is skipped;
/// a string runs to its closing quote or to the end of the line.
pub fn scan(source: &str) -> Vec<Located<Lexeme>> {
    let mut out = Vec::new();
    let mut line = 1;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        let lexeme = match c {
            '\n' => {
                out.push(Located::new(line, Lexeme::Newline));
                line += 1;
                continue;
            }
            c if c.is_whitespace() => continue,
            ';' => {
                let mut text = String::new();
                while let Some(&n) = chars.peek() {
                    if n == '\n' {
                        break;
                    }
                    text.push(n);
                    chars.next();
                }
                Lexeme::Comment(text.trim().to_string())
            }
            '"' | '\'' => {
                let mut text = String::new();
                while let Some(&n) = chars.peek() {
                    if n == '\n' {
                        break;
                    }
                    chars.next();
                    if n == c {
                        break;
                    }
                    text.push(n);
                }
                Lexeme::Str(text)
            }
            ',' => Lexeme::Comma,
            '[' | ']' | '+' | '-' | ':' => Lexeme::Punct(c),
            c if c.is_ascii_digit() => {
                let mut text = c.to_string();
                while let Some(&n) = chars.peek() {
                    if !n.is_ascii_alphanumeric() {
                        break;
                    }
                    text.push(n);
                    chars.next();
                }
                Lexeme::Numeric(text)
            }
            c if is_ident_start(c) => {
                let mut text = c.to_string();
                while let Some(&n) = chars.peek() {
                    if !is_ident_char(n) {
                        break;
                    }
                    text.push(n);
                    chars.next();
                }
                Lexeme::Identifier(text)
            }
            other => Lexeme::Unknown(other),
        };
        out.push(Located::new(line, lexeme));
    }
    out
}
