//! Token stream to statements.
//!
//! Each source line yields at most one statement. Labels on a line of their
//! own carry over to the next statement; labels at the very end of the
//! source produce an [`StatementKind::Empty`] statement so they still get an
//! address.

use crate::scanner::Located;
use crate::tokenizer::Token;
use pc8086_rs::isa::opcode::Mnemonic;
use pc8086_rs::isa::operand::{Disp, Immediate, MemoryOperand, Operand, Placeholder};
use pc8086_rs::isa::register::{Reg, Width};
use pc8086_rs::isa::table::{Directive, Prefix};
use serde::Serialize;

/// A directive parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Param {
    Number(Immediate),
    Str(String),
    Label(String),
    /// `segment:label`
    Far(String, String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StatementKind {
    Directive {
        directive: Directive,
        params: Vec<Param>,
    },
    Instruction {
        prefix: Option<Prefix>,
        mnemonic: Mnemonic,
        operands: Vec<Operand>,
    },
    /// Unparseable line, with the reason when one is known.
    Unknown(Option<String>),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub labels: Vec<String>,
    pub kind: StatementKind,
    pub line: usize,
}

struct Line<'a> {
    tokens: &'a [Located<Token>],
    pos: usize,
}

type Parsed<T> = Result<T, String>;

impl<'a> Line<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|t| &t.value)
    }

    fn peek_at(&self, n: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + n).map(|t| &t.value)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, want: &Token) -> bool {
        if self.peek() == Some(want) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, want: char) -> Parsed<()> {
        match self.next() {
            Some(Token::Punct(c)) if *c == want => Ok(()),
            Some(other) => Err(format!("expected '{want}', found {}", describe(other))),
            None => Err(format!("expected '{want}'")),
        }
    }

    fn done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn labels(&mut self) -> Vec<String> {
        let mut labels = Vec::new();
        while let Some(Token::Label(name)) = self.peek() {
            let colon = self.peek_at(1) == Some(&Token::Punct(':'));
            let label_only = self.peek_at(1).is_none();
            let before_keyword = matches!(
                self.peek_at(1),
                Some(Token::Directive(_) | Token::Instruction(_) | Token::Prefix(_) | Token::Label(_))
            );
            if !(colon || label_only || before_keyword) {
                break;
            }
            labels.push(name.clone());
            self.pos += 1;
            if colon {
                self.pos += 1;
            }
        }
        labels
    }

    fn statement(&mut self) -> Parsed<Option<StatementKind>> {
        let Some(first) = self.next() else {
            return Ok(None);
        };
        let kind = match first {
            Token::Directive(d) => StatementKind::Directive {
                directive: *d,
                params: self.params()?,
            },
            Token::Prefix(p) => match self.next() {
                Some(Token::Instruction(m)) => StatementKind::Instruction {
                    prefix: Some(*p),
                    mnemonic: *m,
                    operands: self.operands()?,
                },
                _ => return Err(format!("{} must precede an instruction", p.name())),
            },
            Token::Instruction(m) => StatementKind::Instruction {
                prefix: None,
                mnemonic: *m,
                operands: self.operands()?,
            },
            other => return Err(format!("unexpected {}", describe(other))),
        };
        Ok(Some(kind))
    }

    fn params(&mut self) -> Parsed<Vec<Param>> {
        let mut params = Vec::new();
        if self.done() {
            return Ok(params);
        }
        loop {
            let param = match self.next() {
                Some(Token::Number(n)) => Param::Number(*n),
                Some(Token::Punct('-')) => match self.next() {
                    Some(Token::Number(n)) => Param::Number(n.negated()),
                    _ => return Err("expected a number after '-'".into()),
                },
                Some(Token::Str(s)) => Param::Str(s.clone()),
                Some(Token::Label(name)) => {
                    if self.eat(&Token::Punct(':')) {
                        match self.next() {
                            Some(Token::Label(target)) => Param::Far(name.clone(), target.clone()),
                            _ => return Err(format!("expected a label after '{name}:'")),
                        }
                    } else {
                        Param::Label(name.clone())
                    }
                }
                Some(other) => return Err(format!("unexpected {} in parameter list", describe(other))),
                None => return Err("missing parameter after ','".into()),
            };
            params.push(param);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        match self.peek() {
            None => Ok(params),
            Some(t) => Err(format!("unexpected {} after parameters", describe(t))),
        }
    }

    fn operands(&mut self) -> Parsed<Vec<Operand>> {
        let mut ops = Vec::new();
        if self.done() {
            return Ok(ops);
        }
        loop {
            ops.push(self.operand()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        match self.peek() {
            None => Ok(ops),
            Some(t) => Err(format!("unexpected {} after operands", describe(t))),
        }
    }

    fn operand(&mut self) -> Parsed<Operand> {
        let width = match self.peek() {
            Some(Token::Size(w)) => {
                self.pos += 1;
                self.eat(&Token::Ptr);
                Some(*w)
            }
            _ => None,
        };
        match self.next() {
            Some(Token::Register(seg)) if seg.is_segment() && self.eat(&Token::Punct(':')) => {
                self.expect('[')?;
                self.memory(Some(*seg), width)
            }
            Some(Token::Register(r)) if width.is_none() => Ok(Operand::Reg(*r)),
            Some(Token::Punct('[')) => self.memory(None, width),
            Some(Token::Number(n)) => Ok(Operand::Imm(sized(*n, width))),
            Some(Token::Punct('-')) => match self.next() {
                Some(Token::Number(n)) => Ok(Operand::Imm(sized(n.negated(), width))),
                _ => Err("expected a number after '-'".into()),
            },
            Some(Token::Str(s)) if s.chars().count() == 1 => {
                let c = s.chars().next().map_or(0, |c| c as i64);
                Ok(Operand::Imm(sized(Immediate::new(c), width)))
            }
            Some(Token::Label(name)) if width.is_none() => Ok(Operand::Placeholder(Placeholder::new(name.clone()))),
            Some(other) => Err(format!("unexpected {} in operand", describe(other))),
            None => Err("missing operand".into()),
        }
    }

    /// Parse the inside of `[...]`; the opening bracket is already consumed.
    fn memory(&mut self, segment: Option<Reg>, width: Option<Width>) -> Parsed<Operand> {
        let mut m = MemoryOperand {
            segment,
            width,
            ..Default::default()
        };
        let mut negative = false;
        loop {
            match self.next() {
                Some(Token::Register(r)) if !negative => m.add_register(*r).map_err(|e| e.to_string())?,
                Some(Token::Number(n)) => {
                    let v = if negative { n.negated() } else { *n };
                    m.add_disp(Disp::Imm(v)).map_err(|e| e.to_string())?
                }
                Some(Token::Label(name)) if !negative => m
                    .add_disp(Disp::Label(Placeholder::new(name.clone())))
                    .map_err(|e| e.to_string())?,
                Some(other) => return Err(format!("unexpected {} in memory operand", describe(other))),
                None => return Err("unterminated memory operand".into()),
            }
            match self.next() {
                Some(Token::Punct(']')) => break,
                Some(Token::Punct('+')) => negative = false,
                Some(Token::Punct('-')) => negative = true,
                Some(other) => return Err(format!("unexpected {} in memory operand", describe(other))),
                None => return Err("unterminated memory operand".into()),
            }
        }
        Ok(Operand::Mem(m))
    }
}

fn sized(imm: Immediate, width: Option<Width>) -> Immediate {
    match width {
        Some(w) => imm.with_width(w),
        None => imm,
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Prefix(p) => format!("prefix {}", p.name()),
        Token::Instruction(m) => format!("instruction {m}"),
        Token::Directive(d) => format!("directive {d}"),
        Token::Register(r) => format!("register {r}"),
        Token::Size(w) => format!("size {w}"),
        Token::Ptr => "PTR".into(),
        Token::Label(l) => format!("label '{l}'"),
        Token::Number(n) => format!("number {n}"),
        Token::Str(s) => format!("string \"{s}\""),
        Token::Comma => "','".into(),
        Token::Punct(c) => format!("'{c}'"),
        Token::Newline => "end of line".into(),
        Token::Unknown(s) => format!("'{s}'"),
    }
}

/// Group tokens into statements, one per source line.
pub fn parse(tokens: Vec<Located<Token>>) -> Vec<Statement> {
    let mut statements = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut last_line = 1;

    for chunk in tokens.split(|t| t.value == Token::Newline) {
        let Some(first) = chunk.first() else { continue };
        last_line = first.line;
        let mut line = Line { tokens: chunk, pos: 0 };
        pending.extend(line.labels());
        let kind = match line.statement() {
            Ok(Some(kind)) => kind,
            Ok(None) => continue,
            Err(reason) => StatementKind::Unknown(Some(reason)),
        };
        statements.push(Statement {
            labels: std::mem::take(&mut pending),
            kind,
            line: first.line,
        });
    }

    if !pending.is_empty() {
        statements.push(Statement {
            labels: pending,
            kind: StatementKind::Empty,
            line: last_line,
        });
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;
    use crate::tokenizer::tokenize;
    use pretty_assertions::assert_eq;

    fn parse_src(src: &str) -> Vec<Statement> {
        parse(tokenize(scan(src)))
    }

    fn operands(src: &str) -> Vec<Operand> {
        match parse_src(src).remove(0).kind {
            StatementKind::Instruction { operands, .. } => operands,
            other => panic!("not an instruction: {other:?}"),
        }
    }

    #[test]
    fn labels_carry_over_to_next_statement() {
        let st = parse_src("a:\nb: c: mov ax, bx\nmsg db 1\nend:");
        assert_eq!(st.len(), 3);
        assert_eq!(st[0].labels, vec!["a", "b", "c"]);
        assert_eq!(st[0].line, 2);
        assert_eq!(st[1].labels, vec!["msg"]);
        assert!(matches!(st[1].kind, StatementKind::Directive { directive: Directive::Db, .. }));
        assert_eq!(st[2].labels, vec!["end"]);
        assert_eq!(st[2].kind, StatementKind::Empty);
    }

    #[test]
    fn memory_operand_with_override_and_size() {
        let ops = operands("mov word ptr es:[bp+di-4], 7");
        let Operand::Mem(m) = &ops[0] else { panic!() };
        assert_eq!(m.base, Some(Reg::BP));
        assert_eq!(m.index, Some(Reg::DI));
        assert_eq!(m.segment, Some(Reg::ES));
        assert_eq!(m.width, Some(Width::Word));
        assert_eq!(m.disp, Some(Disp::Imm(Immediate::new(-4))));
        assert_eq!(ops[1], Operand::Imm(Immediate::new(7)));
    }

    #[test]
    fn label_operands_become_placeholders() {
        let ops = operands("mov dx, msg");
        assert_eq!(ops[1], Operand::Placeholder(Placeholder::new("msg")));
        let ops = operands("mov al, [table+bx]");
        let Operand::Mem(m) = &ops[1] else { panic!() };
        assert_eq!(m.placeholder().map(|p| p.label.as_str()), Some("table"));
    }

    #[test]
    fn prefixes_and_far_params() {
        let st = parse_src("rep stosb\nentry code:start\nformat MZ");
        assert!(matches!(
            st[0].kind,
            StatementKind::Instruction { prefix: Some(Prefix::Rep), mnemonic: Mnemonic::Stosb, .. }
        ));
        assert_eq!(
            st[1].kind,
            StatementKind::Directive {
                directive: Directive::Entry,
                params: vec![Param::Far("code".into(), "start".into())],
            }
        );
        assert_eq!(
            st[2].kind,
            StatementKind::Directive {
                directive: Directive::Format,
                params: vec![Param::Label("MZ".into())],
            }
        );
    }

    #[test]
    fn malformed_lines_are_unknown_statements() {
        let st = parse_src("mov ax, [bx+bp]\nfoo bar baz ,\n[\nnop");
        assert!(matches!(&st[0].kind, StatementKind::Unknown(Some(r)) if r.contains("base")));
        assert!(matches!(st[1].kind, StatementKind::Unknown(_)));
        assert!(matches!(st[2].kind, StatementKind::Unknown(_)));
        assert!(matches!(st[3].kind, StatementKind::Instruction { mnemonic: Mnemonic::Nop, .. }));
    }

    #[test]
    fn char_literal_and_negative_immediates() {
        let ops = operands("mov al, 'A'");
        assert_eq!(ops[1], Operand::Imm(Immediate::new(65)));
        let ops = operands("add ax, -2");
        assert_eq!(ops[1], Operand::Imm(Immediate::new(-2)));
    }
}
