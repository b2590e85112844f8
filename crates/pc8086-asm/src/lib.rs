//! Assembler for the 8086 subset modelled by `pc8086-rs`.
//!
//! `scan` → `tokenize` → `parse` → [`Assembler`]; [`assemble`] runs the
//! whole pipeline over a source text.

pub mod assembler;
pub mod error;
pub mod format;
pub mod parser;
pub mod scanner;
pub mod tokenizer;

pub use assembler::{assemble, hex_dump, Assembler, Assembly, Label};
pub use error::{AsmError, AsmErrorKind, Site};
pub use format::{Com, Format, Mz};
pub use parser::{parse, Param, Statement, StatementKind};
pub use scanner::{scan, Lexeme, Located};
pub use tokenizer::{tokenize, Token};
