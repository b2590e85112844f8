//! Statements to machine code.
//!
//! The first pass encodes every statement in order, writing zeros for label
//! values and recording a fixup for each. [`Assembler::resolve`] then fills
//! the fixups in from the label table. It always starts from the recorded
//! zero-valued operands, so running it twice yields the same bytes.

use crate::error::{AsmError, AsmErrorKind, Site};
use crate::format::{self, Com, Format};
use crate::parser::{parse, Param, Statement, StatementKind};
use crate::scanner::scan;
use crate::tokenizer::tokenize;
use pc8086_rs::isa::opcode::{EncodeError, Field, Mnemonic, OpCode, Slot};
use pc8086_rs::isa::operand::{Disp, Immediate, Operand, Placeholder};
use pc8086_rs::isa::register::Width;
use pc8086_rs::isa::table::{instruction, segment_prefix, Directive, Prefix};
use pc8086_rs::memory::ADDRESS_MASK;
use serde::Serialize;
use std::fmt::Write as _;
use tracing::{debug, trace};

/// A label bound to a body offset. Segment labels come from `SEGMENT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    pub name: String,
    pub pos: usize,
    pub segment: bool,
}

/// A pending label value in the output.
#[derive(Debug, Clone)]
enum Fixup {
    /// An instruction with label operands, re-encoded once they resolve.
    Instruction {
        site: Site,
        at: usize,
        len: usize,
        opcode: &'static OpCode,
        operands: Vec<Operand>,
        fields: Vec<Field>,
    },
    /// A label named in a `D*` directive.
    Data {
        site: Site,
        at: usize,
        label: String,
        width: Width,
    },
}

/// Result of assembling one source text.
#[derive(Debug, Clone, Serialize)]
pub struct Assembly {
    pub format: &'static str,
    pub origin: u32,
    pub bytes: Vec<u8>,
    pub errors: Vec<AsmError>,
    pub hex: String,
}

impl Assembly {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Assemble `source` with COM output unless it selects another format.
pub fn assemble(source: &str) -> Assembly {
    let statements = parse(tokenize(scan(source)));
    let mut asm = Assembler::new();
    for (index, st) in statements.iter().enumerate() {
        asm.statement(index, st);
    }
    asm.finish()
}

#[derive(Debug)]
pub struct Assembler {
    format: Box<dyn Format>,
    out: Vec<u8>,
    labels: Vec<Label>,
    fixups: Vec<Fixup>,
    errors: Vec<AsmError>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            format: Box::new(Com::default()),
            out: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Output body so far, without any format header.
    pub fn output(&self) -> &[u8] {
        &self.out
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Errors from the first pass.
    pub fn errors(&self) -> &[AsmError] {
        &self.errors
    }

    pub fn statement(&mut self, index: usize, st: &Statement) {
        let site = Site {
            statement: index,
            line: st.line,
        };
        for name in &st.labels {
            self.labels.push(Label {
                name: name.clone(),
                pos: self.out.len(),
                segment: false,
            });
        }
        let result = match &st.kind {
            StatementKind::Directive { directive, params } => self.directive(site, *directive, params),
            StatementKind::Instruction {
                prefix,
                mnemonic,
                operands,
            } => self.instruction(site, *prefix, *mnemonic, operands),
            StatementKind::Unknown(reason) => Err(AsmErrorKind::Syntax(
                reason.clone().unwrap_or_else(|| "unrecognized statement".into()),
            )),
            StatementKind::Empty => Ok(()),
        };
        if let Err(kind) = result {
            debug!(line = st.line, error = %kind, "statement rejected");
            self.errors.push(AsmError::new(site, kind));
        }
    }

    fn instruction(
        &mut self,
        site: Site,
        prefix: Option<Prefix>,
        mnemonic: Mnemonic,
        operands: &[Operand],
    ) -> Result<(), AsmErrorKind> {
        let instruction = instruction(mnemonic).ok_or_else(|| {
            AsmErrorKind::Encode(EncodeError::NoMatch {
                mnemonic: mnemonic.name(),
                operands: String::new(),
            })
        })?;
        let (opcode, encoded) = instruction.encode(operands)?;

        if let Some(p) = prefix {
            self.out.push(p.byte());
        }
        let segment = operands.iter().find_map(|op| match op {
            Operand::Mem(m) => m.segment,
            _ => None,
        });
        self.out.extend(segment.and_then(segment_prefix));

        let at = self.out.len();
        trace!(at, %mnemonic, bytes = ?encoded.bytes, "encoded");
        if !encoded.fields.is_empty() {
            self.fixups.push(Fixup::Instruction {
                site,
                at,
                len: encoded.bytes.len(),
                opcode,
                operands: operands.to_vec(),
                fields: encoded.fields,
            });
        }
        self.out.extend(encoded.bytes);
        Ok(())
    }

    fn directive(&mut self, site: Site, directive: Directive, params: &[Param]) -> Result<(), AsmErrorKind> {
        if directive == Directive::Format {
            return self.select_format(params);
        }
        if !self.format.accepts(directive) {
            return Err(AsmErrorKind::NotInFormat {
                directive,
                format: self.format.name(),
            });
        }
        if let Some(size) = directive.data_size() {
            return self.data(site, directive, size, params);
        }
        if let Some(size) = directive.reserve_size() {
            let count = usize::try_from(format::number(directive, params)?).map_err(|_| {
                AsmErrorKind::Params {
                    directive,
                    reason: "count must not be negative",
                }
            })?;
            let len = count
                .checked_mul(size)
                .and_then(|n| n.checked_add(self.out.len()))
                .filter(|len| *len <= ADDRESS_MASK as usize + 1)
                .ok_or(AsmErrorKind::Params {
                    directive,
                    reason: "reserve count too large",
                })?;
            self.out.resize(len, 0);
            return Ok(());
        }
        self.format.apply(site, directive, params, &mut self.out)?;
        if let (Directive::Segment, [Param::Label(name)]) = (directive, params) {
            self.labels.push(Label {
                name: name.clone(),
                pos: self.out.len(),
                segment: true,
            });
        }
        Ok(())
    }

    fn select_format(&mut self, params: &[Param]) -> Result<(), AsmErrorKind> {
        let name = match params {
            [Param::Label(name)] => name,
            _ => {
                return Err(AsmErrorKind::Params {
                    directive: Directive::Format,
                    reason: "expects a format name",
                })
            }
        };
        if !self.out.is_empty() || !self.labels.is_empty() {
            return Err(AsmErrorKind::FormatAfterOutput);
        }
        self.format = format::by_name(name).ok_or_else(|| AsmErrorKind::UnknownFormat(name.clone()))?;
        debug!(format = self.format.name(), "output format selected");
        Ok(())
    }

    fn data(&mut self, site: Site, directive: Directive, size: usize, params: &[Param]) -> Result<(), AsmErrorKind> {
        if params.is_empty() {
            return Err(AsmErrorKind::Params {
                directive,
                reason: "expects at least one value",
            });
        }
        for param in params {
            match param {
                Param::Number(n) => push_sized(n, size, &mut self.out)?,
                Param::Str(s) => {
                    self.out.extend(s.bytes());
                    let pad = s.len().next_multiple_of(size) - s.len();
                    self.out.extend(std::iter::repeat(0).take(pad));
                }
                Param::Label(label) => {
                    self.fixups.push(Fixup::Data {
                        site,
                        at: self.out.len(),
                        label: label.clone(),
                        width: if size == 1 { Width::Byte } else { Width::Word },
                    });
                    self.out.extend(std::iter::repeat(0).take(size));
                }
                Param::Far(..) => {
                    return Err(AsmErrorKind::Params {
                        directive,
                        reason: "segment:label is only valid for ENTRY",
                    })
                }
            }
        }
        Ok(())
    }

    /// Fill every fixup in from the label table. Safe to call repeatedly;
    /// returns the errors of this pass only.
    pub fn resolve(&mut self) -> Vec<AsmError> {
        self.format.reset();
        let mut errors = Vec::new();
        for fixup in &self.fixups {
            let result = match fixup {
                Fixup::Instruction {
                    at,
                    len,
                    opcode,
                    operands,
                    fields,
                    ..
                } => resolve_instruction(
                    &self.labels,
                    self.format.as_mut(),
                    &mut self.out,
                    *at,
                    *len,
                    opcode,
                    operands,
                    fields,
                ),
                Fixup::Data { at, label, width, .. } => {
                    value(&self.labels, self.format.as_mut(), label, None, *at).and_then(|v| {
                        let mut bytes = Vec::with_capacity(2);
                        Immediate::new(v).push_le(*width, &mut bytes)?;
                        self.out[*at..*at + bytes.len()].copy_from_slice(&bytes);
                        Ok(())
                    })
                }
            };
            if let Err(kind) = result {
                let site = match fixup {
                    Fixup::Instruction { site, .. } | Fixup::Data { site, .. } => *site,
                };
                errors.push(AsmError::new(site, kind));
            }
        }
        errors
    }

    pub fn finish(mut self) -> Assembly {
        let mut errors = std::mem::take(&mut self.errors);
        errors.extend(self.resolve());
        let (bytes, format_errors) = self.format.finish(&self.out, &self.labels);
        errors.extend(format_errors);
        errors.sort_by_key(|e| e.site.statement);
        let origin = self.format.origin();
        Assembly {
            format: self.format.name(),
            origin,
            hex: hex_dump(&bytes, origin),
            bytes,
            errors,
        }
    }
}

/// Value of `label`: relative to `next` when given, otherwise absolute.
/// `at` is the body offset of the field receiving it.
fn value(
    labels: &[Label],
    format: &mut dyn Format,
    label: &str,
    next: Option<usize>,
    at: usize,
) -> Result<i64, AsmErrorKind> {
    let mut hits = labels.iter().filter(|l| l.name == label);
    let target = match (hits.next(), hits.next()) {
        (Some(l), None) => l,
        (None, _) => return Err(AsmErrorKind::UnknownLabel(label.to_string())),
        _ => return Err(AsmErrorKind::AmbiguousLabel(label.to_string())),
    };
    if let Some(next) = next {
        return Ok(target.pos as i64 - next as i64);
    }
    if target.segment {
        format.relocate(label, at)?;
        return Ok((target.pos / 16) as i64);
    }
    Ok(format.address(target.pos))
}

#[allow(clippy::too_many_arguments)]
fn resolve_instruction(
    labels: &[Label],
    format: &mut dyn Format,
    out: &mut [u8],
    at: usize,
    len: usize,
    opcode: &OpCode,
    operands: &[Operand],
    fields: &[Field],
) -> Result<(), AsmErrorKind> {
    let mut resolved = operands.to_vec();
    let mut failure = None;
    for field in fields {
        let slot = opcode.slots[field.operand];
        let placeholder: &mut Placeholder = match &mut resolved[field.operand] {
            Operand::Placeholder(p) => p,
            Operand::Mem(m) => match &mut m.disp {
                Some(Disp::Label(p)) => p,
                _ => continue,
            },
            _ => continue,
        };
        let next = slot.is_relative().then_some(at + len);
        let v = match value(labels, format, &placeholder.label, next, at + field.offset) {
            Ok(v) => v,
            Err(e) => {
                failure.get_or_insert(e);
                continue;
            }
        };
        if slot == Slot::Rel(Width::Byte) && !(-128..=127).contains(&v) {
            failure.get_or_insert(AsmErrorKind::OutOfRange {
                label: placeholder.label.clone(),
                distance: v,
            });
            continue;
        }
        let v = match field.width {
            Width::Byte => v as i8 as i64,
            Width::Word => v as u16 as i64,
        };
        placeholder.value = Immediate::new(v);
    }
    let encoded = opcode.encode(&resolved)?;
    if encoded.bytes.len() != len {
        return Err(EncodeError::Shape(0).into());
    }
    out[at..at + len].copy_from_slice(&encoded.bytes);
    failure.map_or(Ok(()), Err)
}

fn push_sized(n: &Immediate, size: usize, out: &mut Vec<u8>) -> Result<(), AsmErrorKind> {
    let bits = (size * 8).min(64) as u32;
    let fits = bits >= 64 || {
        let min = -(1i128 << (bits - 1));
        let max = (1i128 << bits) - 1;
        (min..=max).contains(&i128::from(n.value))
    };
    if !fits {
        let width = if size == 1 { Width::Byte } else { Width::Word };
        return Err(EncodeError::TooWide { value: n.value, width }.into());
    }
    let fill = if n.value < 0 { 0xFF } else { 0 };
    out.extend((0..size).map(|i| n.value.to_le_bytes().get(i).copied().unwrap_or(fill)));
    Ok(())
}

/// Sixteen bytes per row, addresses starting at `origin`.
pub fn hex_dump(bytes: &[u8], origin: u32) -> String {
    let mut text = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        if row > 0 {
            text.push('\n');
        }
        let _ = write!(text, "{:04X}:", origin as usize + row * 16);
        for b in chunk {
            let _ = write!(text, " {b:02X}");
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn data_directives_emit_little_endian() {
        let asm = assemble("db 1, -1, \"ok\"\ndw 1234h\ndd -2\nrb 3");
        assert!(asm.is_ok(), "{:?}", asm.errors);
        assert_eq!(
            asm.bytes,
            vec![1, 0xFF, b'o', b'k', 0x34, 0x12, 0xFE, 0xFF, 0xFF, 0xFF, 0, 0, 0]
        );
    }

    #[test]
    fn data_value_too_wide() {
        let asm = assemble("db 300");
        assert_eq!(asm.errors.len(), 1);
        assert!(matches!(asm.errors[0].kind, AsmErrorKind::Encode(EncodeError::TooWide { .. })));
    }

    #[test]
    fn oversized_reserve_is_an_error() {
        let asm = assemble("rt 7FFFFFFFFFFFFFFFh\nrb 10000000000\nrb 100000h\nnop");
        assert_eq!(asm.errors.len(), 2);
        for (err, line) in asm.errors.iter().zip([1, 2]) {
            assert_eq!(err.site.line, line);
            assert!(matches!(
                err.kind,
                AsmErrorKind::Params { reason: "reserve count too large", .. }
            ));
        }
        assert_eq!(asm.bytes.len(), 0x100000 + 1);
        assert_eq!(asm.bytes.last(), Some(&0x90));
    }

    #[test]
    fn hex_dump_rows() {
        let bytes: Vec<u8> = (0..18).collect();
        assert_eq!(
            hex_dump(&bytes, 0x100),
            "0100: 00 01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F\n0110: 10 11"
        );
    }

    #[test]
    fn prefixes_precede_the_opcode() {
        let asm = assemble("rep movsb\nmov al, es:[di]\nlock inc word [bx]");
        assert!(asm.is_ok(), "{:?}", asm.errors);
        assert_eq!(asm.bytes, vec![0xF3, 0xA4, 0x26, 0x8A, 0x05, 0xF0, 0xFF, 0x07]);
    }
}
