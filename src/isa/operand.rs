use super::register::{Reg, RegKind, Width};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OperandError {
    #[error("memory operand already has base register {0}")]
    SecondBase(Reg),
    #[error("memory operand already has index register {0}")]
    SecondIndex(Reg),
    #[error("memory operand already has a displacement")]
    SecondDisplacement,
    #[error("{0} cannot address memory")]
    NotAddressable(Reg),
}

bitflags! {
    /// Operand classes an opcode slot may accept.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Tags: u8 {
        /// general purpose register
        const G = 1 << 0;
        /// segment register
        const S = 1 << 1;
        /// register or memory (ModRM `rm`)
        const E = 1 << 2;
        /// immediate
        const I = 1 << 3;
        /// memory only
        const M = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Radix {
    Binary,
    Octal,
    Decimal,
    Hex,
}

/// A literal value together with the radix it was written in.
///
/// Equality compares only the numeric value. `fixed` pins the encoding
/// width when a `byte`/`word` keyword or a decoded field determined it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Immediate {
    pub value: i64,
    pub radix: Radix,
    pub fixed: Option<Width>,
}

impl PartialEq for Immediate {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Immediate {
    pub fn new(value: i64) -> Self {
        Self::with_radix(value, Radix::Decimal)
    }

    pub fn with_radix(value: i64, radix: Radix) -> Self {
        Self {
            value,
            radix,
            fixed: None,
        }
    }

    pub fn with_width(mut self, width: Width) -> Self {
        self.fixed = Some(width);
        self
    }

    pub fn negated(self) -> Self {
        Self {
            value: -self.value,
            ..self
        }
    }

    /// True when the value is representable in `width` bits, read either
    /// as signed or unsigned.
    pub fn fits(&self, width: Width) -> bool {
        match width {
            Width::Byte => (-128..=255).contains(&self.value),
            Width::Word => (-32768..=65535).contains(&self.value),
        }
    }

    pub fn fits_i8(&self) -> bool {
        (-128..=127).contains(&self.value)
    }

    /// Pinned width, or the narrowest width that holds the value.
    pub fn width(&self) -> Option<Width> {
        if let Some(w) = self.fixed {
            return Some(w);
        }
        if self.fits(Width::Byte) {
            Some(Width::Byte)
        } else if self.fits(Width::Word) {
            Some(Width::Word)
        } else {
            None
        }
    }

    pub fn push_le(&self, width: Width, out: &mut Vec<u8>) -> Result<(), super::opcode::EncodeError> {
        if !self.fits(width) {
            return Err(super::opcode::EncodeError::TooWide {
                value: self.value,
                width,
            });
        }
        let v = self.value as u16;
        out.push(v as u8);
        if width == Width::Word {
            out.push((v >> 8) as u8);
        }
        Ok(())
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.value < 0 { "-" } else { "" };
        let abs = self.value.unsigned_abs();
        match self.radix {
            Radix::Decimal => write!(f, "{}{}", sign, abs),
            Radix::Binary => write!(f, "{}{:b}b", sign, abs),
            Radix::Octal => write!(f, "{}{:o}o", sign, abs),
            Radix::Hex => {
                let digits = format!("{:X}", abs);
                let pad = digits.len() == 1 || digits.starts_with(|c: char| c.is_ascii_alphabetic());
                write!(f, "{}{}{}h", sign, if pad { "0" } else { "" }, digits)
            }
        }
    }
}

/// A reference to a label whose value is not yet known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placeholder {
    pub label: String,
    pub value: Immediate,
}

impl Placeholder {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: Immediate::new(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Disp {
    Imm(Immediate),
    Label(Placeholder),
}

impl fmt::Display for Disp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disp::Imm(i) => i.fmt(f),
            Disp::Label(p) => f.write_str(&p.label),
        }
    }
}

/// `[base + index + disp]` with optional segment override and size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryOperand {
    pub base: Option<Reg>,
    pub index: Option<Reg>,
    pub disp: Option<Disp>,
    pub segment: Option<Reg>,
    pub width: Option<Width>,
}

impl MemoryOperand {
    pub fn add_base(&mut self, reg: Reg) -> Result<(), OperandError> {
        if self.base.is_some() {
            return Err(OperandError::SecondBase(reg));
        }
        self.base = Some(reg);
        Ok(())
    }

    pub fn add_index(&mut self, reg: Reg) -> Result<(), OperandError> {
        if self.index.is_some() {
            return Err(OperandError::SecondIndex(reg));
        }
        self.index = Some(reg);
        Ok(())
    }

    /// Routes BX/BP to the base slot and SI/DI to the index slot.
    pub fn add_register(&mut self, reg: Reg) -> Result<(), OperandError> {
        match reg {
            Reg::BX | Reg::BP => self.add_base(reg),
            Reg::SI | Reg::DI => self.add_index(reg),
            other => Err(OperandError::NotAddressable(other)),
        }
    }

    pub fn add_disp(&mut self, disp: Disp) -> Result<(), OperandError> {
        if self.disp.is_some() {
            return Err(OperandError::SecondDisplacement);
        }
        self.disp = Some(disp);
        Ok(())
    }

    pub fn is_direct(&self) -> bool {
        self.base.is_none() && self.index.is_none()
    }

    /// ModRM `rm` value for this base/index pair.
    pub fn rm(&self) -> u8 {
        match (self.base, self.index) {
            (Some(Reg::BX), Some(Reg::SI)) => 0b000,
            (Some(Reg::BX), Some(Reg::DI)) => 0b001,
            (Some(Reg::BP), Some(Reg::SI)) => 0b010,
            (Some(Reg::BP), Some(Reg::DI)) => 0b011,
            (None, Some(Reg::SI)) => 0b100,
            (None, Some(Reg::DI)) => 0b101,
            (Some(Reg::BP), None) => 0b110,
            (Some(Reg::BX), None) => 0b111,
            _ => 0b110,
        }
    }

    /// BP-based addressing defaults to SS, everything else to DS.
    pub fn default_segment(&self) -> Reg {
        if self.base == Some(Reg::BP) {
            Reg::SS
        } else {
            Reg::DS
        }
    }

    pub fn placeholder(&self) -> Option<&Placeholder> {
        match &self.disp {
            Some(Disp::Label(p)) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(w) = self.width {
            write!(f, "{} ", w)?;
        }
        if let Some(s) = self.segment {
            write!(f, "{}:", s)?;
        }
        f.write_str("[")?;
        let mut first = true;
        for r in [self.base, self.index].into_iter().flatten() {
            if !first {
                f.write_str("+")?;
            }
            write!(f, "{}", r)?;
            first = false;
        }
        match &self.disp {
            Some(Disp::Imm(i)) if !first && i.value < 0 => write!(f, "{}", i)?,
            Some(d) if !first => write!(f, "+{}", d)?,
            Some(d) => write!(f, "{}", d)?,
            None if first => f.write_str("0")?,
            None => {}
        }
        f.write_str("]")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Reg(Reg),
    Imm(Immediate),
    Placeholder(Placeholder),
    Mem(MemoryOperand),
}

impl Operand {
    pub fn tags(&self) -> Tags {
        match self {
            Operand::Reg(r) if r.kind() == RegKind::Segment => Tags::S,
            Operand::Reg(_) => Tags::G | Tags::E,
            Operand::Imm(_) | Operand::Placeholder(_) => Tags::I,
            Operand::Mem(_) => Tags::E | Tags::M,
        }
    }

    /// Bit width the operand forces on the instruction, if any.
    pub fn width(&self) -> Option<Width> {
        match self {
            Operand::Reg(r) => Some(r.width()),
            Operand::Mem(m) => m.width,
            Operand::Imm(i) => i.fixed,
            Operand::Placeholder(_) => Some(Width::Word),
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Operand::Placeholder(p) => Some(&p.label),
            Operand::Mem(m) => m.placeholder().map(|p| p.label.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => r.fmt(f),
            Operand::Imm(i) => i.fmt(f),
            Operand::Placeholder(p) => f.write_str(&p.label),
            Operand::Mem(m) => m.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_width_inference() {
        assert_eq!(Immediate::new(255).width(), Some(Width::Byte));
        assert_eq!(Immediate::new(-128).width(), Some(Width::Byte));
        assert_eq!(Immediate::new(-129).width(), Some(Width::Word));
        assert_eq!(Immediate::new(65535).width(), Some(Width::Word));
        assert_eq!(Immediate::new(65536).width(), None);
        assert_eq!(Immediate::new(1).with_width(Width::Word).width(), Some(Width::Word));
    }

    #[test]
    fn immediate_equality_ignores_radix() {
        let a = Immediate::with_radix(16, Radix::Hex);
        let b = Immediate::new(16);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "10h");
        assert_eq!(Immediate::with_radix(0xB800, Radix::Hex).to_string(), "0B800h");
        assert_eq!(Immediate::with_radix(5, Radix::Binary).to_string(), "101b");
    }

    #[test]
    fn memory_operand_rejects_duplicates() {
        let mut m = MemoryOperand::default();
        m.add_register(Reg::BX).unwrap();
        assert_eq!(m.add_register(Reg::BP), Err(OperandError::SecondBase(Reg::BP)));
        m.add_register(Reg::SI).unwrap();
        assert_eq!(m.add_register(Reg::DI), Err(OperandError::SecondIndex(Reg::DI)));
        m.add_disp(Disp::Imm(Immediate::new(4))).unwrap();
        assert_eq!(
            m.add_disp(Disp::Imm(Immediate::new(1))),
            Err(OperandError::SecondDisplacement)
        );
        assert_eq!(m.add_register(Reg::AX), Err(OperandError::NotAddressable(Reg::AX)));
        assert_eq!(m.rm(), 0);
        assert_eq!(m.to_string(), "[BX+SI+4]");
    }

    #[test]
    fn bp_defaults_to_stack_segment() {
        let mut m = MemoryOperand::default();
        m.add_register(Reg::BP).unwrap();
        assert_eq!(m.default_segment(), Reg::SS);
        let mut n = MemoryOperand::default();
        n.add_register(Reg::DI).unwrap();
        assert_eq!(n.default_segment(), Reg::DS);
    }
}
