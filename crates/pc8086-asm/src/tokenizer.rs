//! Lexemes to semantic tokens via the shared keyword registry.

use crate::scanner::{Lexeme, Located};
use pc8086_rs::isa::opcode::Mnemonic;
use pc8086_rs::isa::operand::{Immediate, Radix};
use pc8086_rs::isa::register::{Reg, Width};
use pc8086_rs::isa::table::{keyword, Directive, Keyword, Prefix};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Prefix(Prefix),
    Instruction(Mnemonic),
    Directive(Directive),
    Register(Reg),
    Size(Width),
    Ptr,
    Label(String),
    Number(Immediate),
    Str(String),
    Comma,
    Punct(char),
    Newline,
    Unknown(String),
}

/// Parse a numeric literal: `0x` prefix or `h` suffix for hex, `b` suffix
/// (or `0b` prefix) for binary, `o`/`q` for octal, optional `d` for decimal.
pub fn parse_number(text: &str) -> Option<Immediate> {
    let t = text.to_ascii_lowercase();
    let (digits, radix) = if let Some(hex) = t.strip_prefix("0x") {
        (hex, Radix::Hex)
    } else if let Some(hex) = t.strip_suffix('h') {
        (hex, Radix::Hex)
    } else if let Some(bin) = t.strip_suffix('b').filter(|b| b.chars().all(|c| c == '0' || c == '1')) {
        (bin, Radix::Binary)
    } else if let Some(oct) = t.strip_suffix('o').or_else(|| t.strip_suffix('q')) {
        (oct, Radix::Octal)
    } else if let Some(dec) = t.strip_suffix('d') {
        (dec, Radix::Decimal)
    } else if let Some(bin) = t.strip_prefix("0b") {
        (bin, Radix::Binary)
    } else {
        (t.as_str(), Radix::Decimal)
    };
    let base = match radix {
        Radix::Binary => 2,
        Radix::Octal => 8,
        Radix::Decimal => 10,
        Radix::Hex => 16,
    };
    if digits.is_empty() {
        return None;
    }
    i64::from_str_radix(digits, base)
        .ok()
        .map(|v| Immediate::with_radix(v, radix))
}

fn classify(word: String) -> Token {
    match keyword(&word) {
        Some(Keyword::Prefix(p)) => Token::Prefix(p),
        Some(Keyword::Instruction(i)) => Token::Instruction(i.mnemonic),
        Some(Keyword::Directive(d)) => Token::Directive(d),
        Some(Keyword::Register(r)) => Token::Register(r),
        Some(Keyword::Size(w)) => Token::Size(w),
        Some(Keyword::Ptr) => Token::Ptr,
        None => Token::Label(word),
    }
}

/// Map lexemes to tokens. Comments are dropped, runs of newlines collapse
/// to one and leading newlines are skipped.
pub fn tokenize(lexemes: Vec<Located<Lexeme>>) -> Vec<Located<Token>> {
    let mut out: Vec<Located<Token>> = Vec::with_capacity(lexemes.len());
    for lexeme in lexemes {
        let token = lexeme.map(|l| match l {
            Lexeme::Comment(_) => None,
            Lexeme::Identifier(word) => Some(classify(word)),
            Lexeme::Numeric(text) => Some(match parse_number(&text) {
                Some(imm) => Token::Number(imm),
                None => Token::Unknown(text),
            }),
            Lexeme::Str(s) => Some(Token::Str(s)),
            Lexeme::Comma => Some(Token::Comma),
            Lexeme::Punct(c) => Some(Token::Punct(c)),
            Lexeme::Newline => Some(Token::Newline),
            Lexeme::Unknown(c) => Some(Token::Unknown(c.to_string())),
        });
        let Some(value) = token.value else { continue };
        if value == Token::Newline
            && out.last().map_or(true, |t| t.value == Token::Newline)
        {
            continue;
        }
        out.push(Located::new(token.line, value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;
    use pretty_assertions::assert_eq;

    fn tokens(src: &str) -> Vec<Token> {
        tokenize(scan(src)).into_iter().map(|t| t.value).collect()
    }

    #[test]
    fn number_radixes() {
        let v = |s: &str| parse_number(s).map(|i| (i.value, i.radix));
        assert_eq!(v("09h"), Some((9, Radix::Hex)));
        assert_eq!(v("0B800h"), Some((0xB800, Radix::Hex)));
        assert_eq!(v("0x1f"), Some((0x1F, Radix::Hex)));
        assert_eq!(v("1010b"), Some((10, Radix::Binary)));
        assert_eq!(v("0b11"), Some((3, Radix::Binary)));
        assert_eq!(v("17o"), Some((15, Radix::Octal)));
        assert_eq!(v("17q"), Some((15, Radix::Octal)));
        assert_eq!(v("42d"), Some((42, Radix::Decimal)));
        assert_eq!(v("42"), Some((42, Radix::Decimal)));
        assert_eq!(v("12b"), None);
        assert_eq!(v("0xg"), None);
    }

    #[test]
    fn keywords_and_labels() {
        assert_eq!(
            tokens("REP movsb\nmsg: DB word ptr es"),
            vec![
                Token::Prefix(Prefix::Rep),
                Token::Instruction(Mnemonic::Movsb),
                Token::Newline,
                Token::Label("msg".into()),
                Token::Punct(':'),
                Token::Directive(Directive::Db),
                Token::Size(Width::Word),
                Token::Ptr,
                Token::Register(Reg::ES),
            ]
        );
        assert_eq!(tokens("repnz")[0], Token::Prefix(Prefix::Repne));
    }

    #[test]
    fn newlines_collapse_and_comments_vanish() {
        assert_eq!(
            tokens("\n\n; header\nnop ; x\n\n\nhlt\n"),
            vec![
                Token::Instruction(Mnemonic::Nop),
                Token::Newline,
                Token::Instruction(Mnemonic::Hlt),
                Token::Newline,
            ]
        );
    }
}
