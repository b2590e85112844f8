use pc8086_rs::isa::opcode::EncodeError;
use pc8086_rs::isa::table::Directive;
use serde::{Serialize, Serializer};
use std::fmt::Display;

/// Statement index and source line an error is attributed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Site {
    pub statement: usize,
    pub line: usize,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AsmErrorKind {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("unknown label '{0}'")]
    UnknownLabel(String),
    #[error("label '{0}' is defined more than once")]
    AmbiguousLabel(String),
    #[error("'{label}' is {distance} bytes away, out of short jump range")]
    OutOfRange { label: String, distance: i64 },
    #[error("{directive} is not allowed in {format} output")]
    NotInFormat {
        directive: Directive,
        format: &'static str,
    },
    #[error("{directive}: {reason}")]
    Params {
        directive: Directive,
        reason: &'static str,
    },
    #[error("FORMAT must come before any code or data")]
    FormatAfterOutput,
    #[error("unknown output format '{0}'")]
    UnknownFormat(String),
    #[error("segment value of '{0}' needs a relocatable format")]
    Relocation(String),
    #[error("'{0}' is not a segment")]
    NotASegment(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize)]
#[error("line {}: {kind}", .site.line)]
pub struct AsmError {
    #[serde(flatten)]
    pub site: Site,
    #[serde(serialize_with = "as_text")]
    pub kind: AsmErrorKind,
}

impl AsmError {
    pub fn new(site: Site, kind: AsmErrorKind) -> Self {
        Self { site, kind }
    }
}

fn as_text<T: Display, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(value)
}
