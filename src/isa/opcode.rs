use super::operand::{Disp, Immediate, MemoryOperand, Operand, Tags};
use super::register::{Reg, Width};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("no encoding of {mnemonic} accepts operands ({operands})")]
    NoMatch {
        mnemonic: &'static str,
        operands: String,
    },
    #[error("value {value} does not fit in a {width} field")]
    TooWide { value: i64, width: Width },
    #[error("operand {0} does not fit the slot it matched")]
    Shape(usize),
}

/// One operand position of an encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Implicit register, not encoded.
    Fixed(Reg),
    /// Implicit constant 1 (shift/rotate by one).
    One,
    /// General register folded into the low three opcode bits.
    RegOp(Width),
    G(Width),
    S,
    E(Width),
    M,
    I(Width),
    /// Byte immediate sign-extended into a word operation.
    Ibs,
    Rel(Width),
}

impl Slot {
    pub fn tag(self) -> Tags {
        match self {
            Slot::Fixed(r) if r.is_segment() => Tags::S,
            Slot::Fixed(_) | Slot::RegOp(_) | Slot::G(_) => Tags::G,
            Slot::S => Tags::S,
            Slot::E(_) => Tags::E,
            Slot::M => Tags::M,
            Slot::One | Slot::I(_) | Slot::Ibs | Slot::Rel(_) => Tags::I,
        }
    }

    pub fn accepts(self, op: &Operand) -> bool {
        if !op.tags().contains(self.tag()) {
            return false;
        }
        match (self, op) {
            (Slot::Fixed(r), Operand::Reg(o)) => r == *o,
            (Slot::Fixed(_), _) => false,
            (Slot::One, Operand::Imm(i)) => i.value == 1 && i.fixed.is_none(),
            (Slot::One, _) => false,
            (Slot::RegOp(w) | Slot::G(w) | Slot::E(w), Operand::Reg(r)) => r.width() == w,
            (Slot::E(w), Operand::Mem(m)) => m.width.map_or(true, |mw| mw == w),
            (Slot::S, _) | (Slot::M, _) => true,
            (Slot::I(w) | Slot::Rel(w), Operand::Imm(i)) => {
                i.fixed.map_or(true, |f| f == w)
                    && if matches!(self, Slot::Rel(Width::Byte)) {
                        i.fits_i8()
                    } else {
                        i.fits(w)
                    }
            }
            (Slot::I(w) | Slot::Rel(w), Operand::Placeholder(_)) => {
                w == Width::Word || matches!(self, Slot::Rel(_))
            }
            (Slot::Ibs, Operand::Imm(i)) => i.fits_i8() && i.fixed != Some(Width::Word),
            _ => false,
        }
    }

    pub fn is_relative(self) -> bool {
        matches!(self, Slot::Rel(_))
    }

    fn in_modrm(self) -> bool {
        matches!(self, Slot::G(_) | Slot::S | Slot::E(_) | Slot::M)
    }
}

/// A concrete encoding: primary opcode byte, optional ModRM `/digit`
/// extension and the operand slots it takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCode {
    pub code: u8,
    pub ext: Option<u8>,
    pub slots: &'static [Slot],
}

/// Where a value field landed inside an encoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub operand: usize,
    pub offset: usize,
    pub width: Width,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    /// Fields written for label placeholders.
    pub fields: Vec<Field>,
}

impl OpCode {
    pub const fn plain(code: u8, slots: &'static [Slot]) -> Self {
        Self {
            code,
            ext: None,
            slots,
        }
    }

    pub const fn modrm(code: u8, ext: u8, slots: &'static [Slot]) -> Self {
        Self {
            code,
            ext: Some(ext),
            slots,
        }
    }

    pub fn has_modrm(&self) -> bool {
        self.ext.is_some() || self.slots.iter().any(|s| s.in_modrm())
    }

    pub fn has_reg_op(&self) -> bool {
        self.slots.iter().any(|s| matches!(s, Slot::RegOp(_)))
    }

    pub fn matches(&self, operands: &[Operand]) -> bool {
        self.slots.len() == operands.len()
            && self.slots.iter().zip(operands).all(|(s, o)| s.accepts(o))
    }

    /// Width of the operation, taken from the first sized slot.
    pub fn width(&self) -> Width {
        self.slots
            .iter()
            .find_map(|s| match s {
                Slot::Fixed(r) if !r.is_segment() => Some(r.width()),
                Slot::RegOp(w) | Slot::G(w) | Slot::E(w) => Some(*w),
                _ => None,
            })
            .unwrap_or(Width::Word)
    }

    /// Encode `operands` into opcode, ModRM, displacement and immediate
    /// bytes. Label placeholders encode as zeros and are reported in
    /// `fields`.
    pub fn encode(&self, operands: &[Operand]) -> Result<Encoded, EncodeError> {
        let mut bytes = vec![self.code];
        let mut fields = Vec::new();

        for (slot, op) in self.slots.iter().zip(operands) {
            if let (Slot::RegOp(_), Operand::Reg(r)) = (slot, op) {
                bytes[0] |= r.code();
            }
        }

        if self.has_modrm() {
            let mut reg = self.ext.unwrap_or(0);
            let mut rm: Option<(usize, &Operand)> = None;
            for (i, (slot, op)) in self.slots.iter().zip(operands).enumerate() {
                match (slot, op) {
                    (Slot::G(_) | Slot::S, Operand::Reg(r)) => reg = r.code(),
                    (Slot::E(_) | Slot::M, _) => rm = Some((i, op)),
                    _ => {}
                }
            }
            match rm {
                Some((_, Operand::Reg(r))) => bytes.push(0b1100_0000 | (reg << 3) | r.code()),
                Some((i, Operand::Mem(m))) => encode_mem(i, reg, m, &mut bytes, &mut fields)?,
                Some((i, _)) => return Err(EncodeError::Shape(i)),
                None => return Err(EncodeError::Shape(0)),
            }
        }

        for (i, (slot, op)) in self.slots.iter().zip(operands).enumerate() {
            let width = match slot {
                Slot::I(w) | Slot::Rel(w) => *w,
                Slot::Ibs => Width::Byte,
                _ => continue,
            };
            match op {
                Operand::Imm(imm) => {
                    if matches!(slot, Slot::Ibs | Slot::Rel(Width::Byte)) && !imm.fits_i8() {
                        return Err(EncodeError::TooWide {
                            value: imm.value,
                            width: Width::Byte,
                        });
                    }
                    imm.push_le(width, &mut bytes)?;
                }
                Operand::Placeholder(p) => {
                    fields.push(Field {
                        operand: i,
                        offset: bytes.len(),
                        width,
                    });
                    p.value.push_le(width, &mut bytes)?;
                }
                _ => return Err(EncodeError::Shape(i)),
            }
        }

        Ok(Encoded { bytes, fields })
    }
}

fn encode_mem(
    operand: usize,
    reg: u8,
    m: &MemoryOperand,
    bytes: &mut Vec<u8>,
    fields: &mut Vec<Field>,
) -> Result<(), EncodeError> {
    let rm = m.rm();
    if m.is_direct() {
        bytes.push((reg << 3) | 0b110);
        return push_disp16(operand, m.disp.as_ref(), bytes, fields);
    }
    match &m.disp {
        None if rm != 0b110 => bytes.push((reg << 3) | rm),
        Some(Disp::Imm(i)) if i.value == 0 && rm != 0b110 => bytes.push((reg << 3) | rm),
        None => {
            bytes.push(0b0100_0000 | (reg << 3) | rm);
            bytes.push(0);
        }
        Some(Disp::Imm(i)) if i.fits_i8() => {
            bytes.push(0b0100_0000 | (reg << 3) | rm);
            bytes.push(i.value as u8);
        }
        disp => {
            bytes.push(0b1000_0000 | (reg << 3) | rm);
            push_disp16(operand, disp.as_ref(), bytes, fields)?;
        }
    }
    Ok(())
}

fn push_disp16(
    operand: usize,
    disp: Option<&Disp>,
    bytes: &mut Vec<u8>,
    fields: &mut Vec<Field>,
) -> Result<(), EncodeError> {
    match disp {
        None => Immediate::new(0).push_le(Width::Word, bytes),
        Some(Disp::Imm(i)) => i.push_le(Width::Word, bytes),
        Some(Disp::Label(p)) => {
            fields.push(Field {
                operand,
                offset: bytes.len(),
                width: Width::Word,
            });
            p.value.push_le(Width::Word, bytes)
        }
    }
}

macro_rules! mnemonics {
    ($($name:ident => $text:literal),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Mnemonic {
            $($name),*
        }

        impl Mnemonic {
            pub const ALL: &'static [Mnemonic] = &[$(Mnemonic::$name),*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Mnemonic::$name => $text),*
                }
            }
        }
    };
}

mnemonics! {
    Add => "ADD", Or => "OR", Adc => "ADC", Sbb => "SBB",
    And => "AND", Sub => "SUB", Xor => "XOR", Cmp => "CMP",
    Mov => "MOV", Inc => "INC", Dec => "DEC", Push => "PUSH", Pop => "POP",
    Pushf => "PUSHF", Popf => "POPF", Xchg => "XCHG", Nop => "NOP", Test => "TEST",
    Not => "NOT", Neg => "NEG", Mul => "MUL", Imul => "IMUL", Div => "DIV", Idiv => "IDIV",
    Rol => "ROL", Ror => "ROR", Rcl => "RCL", Rcr => "RCR",
    Shl => "SHL", Sal => "SAL", Shr => "SHR", Sar => "SAR",
    Jmp => "JMP", Call => "CALL", Ret => "RET", Retf => "RETF", Iret => "IRET",
    Jo => "JO", Jno => "JNO", Jb => "JB", Jc => "JC", Jnae => "JNAE",
    Jae => "JAE", Jnb => "JNB", Jnc => "JNC", Je => "JE", Jz => "JZ",
    Jne => "JNE", Jnz => "JNZ", Jbe => "JBE", Jna => "JNA", Ja => "JA", Jnbe => "JNBE",
    Js => "JS", Jns => "JNS", Jp => "JP", Jpe => "JPE", Jnp => "JNP", Jpo => "JPO",
    Jl => "JL", Jnge => "JNGE", Jge => "JGE", Jnl => "JNL",
    Jle => "JLE", Jng => "JNG", Jg => "JG", Jnle => "JNLE",
    Loop => "LOOP", Loope => "LOOPE", Loopz => "LOOPZ", Loopne => "LOOPNE", Loopnz => "LOOPNZ",
    Jcxz => "JCXZ", Int => "INT", Int3 => "INT3", Into => "INTO",
    In => "IN", Out => "OUT",
    Clc => "CLC", Stc => "STC", Cmc => "CMC", Cli => "CLI", Sti => "STI", Cld => "CLD", Std => "STD",
    Hlt => "HLT", Lea => "LEA", Cbw => "CBW", Cwd => "CWD", Lahf => "LAHF", Sahf => "SAHF",
    Movsb => "MOVSB", Movsw => "MOVSW", Cmpsb => "CMPSB", Cmpsw => "CMPSW",
    Stosb => "STOSB", Stosw => "STOSW", Lodsb => "LODSB", Lodsw => "LODSW",
    Scasb => "SCASB", Scasw => "SCASW",
}

impl std::fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A mnemonic and its encodings, tried in order.
#[derive(Debug)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub opcodes: &'static [OpCode],
}

impl Instruction {
    /// First encoding whose slots accept `operands`.
    pub fn find(&self, operands: &[Operand]) -> Option<&'static OpCode> {
        self.opcodes.iter().find(|op| op.matches(operands))
    }

    pub fn encode(&self, operands: &[Operand]) -> Result<(&'static OpCode, Encoded), EncodeError> {
        let opcode = self.find(operands).ok_or_else(|| EncodeError::NoMatch {
            mnemonic: self.mnemonic.name(),
            operands: operands
                .iter()
                .map(|o| o.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })?;
        Ok((opcode, opcode.encode(operands)?))
    }
}
