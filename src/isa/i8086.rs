use crate::decoder::{Decoded, Decoder};
use crate::isa::opcode::{Instruction, OpCode, Slot};
use crate::isa::operand::{Disp, Immediate, MemoryOperand, Operand, Radix};
use crate::isa::register::{Reg, Width};
use crate::isa::table::{Prefix, INSTRUCTIONS};
use std::sync::OnceLock;

type Entry = (&'static Instruction, &'static OpCode);

/// Reverse index from primary opcode byte to candidate encodings, built
/// once from the shared instruction table.
fn index() -> &'static [Vec<Entry>] {
    static INDEX: OnceLock<Vec<Vec<Entry>>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut index: Vec<Vec<Entry>> = vec![Vec::new(); 256];
        for instr in INSTRUCTIONS {
            for op in instr.opcodes {
                let span = if op.has_reg_op() { 8 } else { 1 };
                for b in op.code..op.code + span {
                    let slot = &mut index[b as usize];
                    // aliases and swapped operand orders share bytes; first wins
                    if !slot.iter().any(|(_, o)| o.ext == op.ext) {
                        slot.push((instr, op));
                    }
                }
            }
        }
        index
    })
}

/// 8086 decoder driven by the same table the assembler encodes with.
pub struct I8086Decoder;

impl I8086Decoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for I8086Decoder {
    fn default() -> Self {
        Self::new()
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn u8(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn u16(&mut self) -> Option<u16> {
        let lo = self.u8()?;
        let hi = self.u8()?;
        Some(u16::from_le_bytes([lo, hi]))
    }
}

impl Decoder for I8086Decoder {
    fn decode(&self, bytes: &[u8]) -> Option<Decoded> {
        let mut cur = Cursor { bytes, pos: 0 };
        let mut segment = None;
        let mut rep = None;
        let mut lock = false;

        let code = loop {
            match cur.u8()? {
                0x26 => segment = Some(Reg::ES),
                0x2E => segment = Some(Reg::CS),
                0x36 => segment = Some(Reg::SS),
                0x3E => segment = Some(Reg::DS),
                0xF0 => lock = true,
                0xF2 => rep = Some(Prefix::Repne),
                0xF3 => rep = Some(Prefix::Rep),
                b => break b,
            }
        };

        let candidates = &index()[code as usize];
        let first = candidates.first()?;
        let modrm = if first.1.has_modrm() { Some(cur.u8()?) } else { None };
        let reg_field = modrm.map(|m| (m >> 3) & 7).unwrap_or(0);
        let (instr, opcode) = *candidates
            .iter()
            .find(|(_, op)| op.ext.map_or(true, |e| e == reg_field))?;

        let mut operands = Vec::with_capacity(opcode.slots.len());
        for slot in opcode.slots {
            let op = match *slot {
                Slot::Fixed(r) => Operand::Reg(r),
                Slot::One => Operand::Imm(Immediate::new(1)),
                Slot::RegOp(w) => Operand::Reg(Reg::general(w, code)),
                Slot::G(w) => Operand::Reg(Reg::general(w, reg_field)),
                Slot::S => Operand::Reg(Reg::segment(reg_field)),
                Slot::E(w) => rm_operand(&mut cur, modrm?, Some(w), segment)?,
                Slot::M => match rm_operand(&mut cur, modrm?, None, segment)? {
                    Operand::Mem(m) => Operand::Mem(m),
                    _ => return None,
                },
                Slot::I(Width::Byte) => Operand::Imm(hex(cur.u8()? as i64).with_width(Width::Byte)),
                Slot::I(Width::Word) => Operand::Imm(hex(cur.u16()? as i64).with_width(Width::Word)),
                Slot::Ibs => Operand::Imm(hex(cur.u8()? as i8 as i64)),
                Slot::Rel(Width::Byte) => Operand::Imm(hex(cur.u8()? as i8 as i64)),
                Slot::Rel(Width::Word) => Operand::Imm(hex(cur.u16()? as i16 as i64)),
            };
            operands.push(op);
        }

        Some(Decoded {
            mnemonic: instr.mnemonic,
            opcode,
            operands,
            len: cur.pos as u8,
            segment,
            rep,
            lock,
        })
    }
}

fn hex(value: i64) -> Immediate {
    Immediate::with_radix(value, Radix::Hex)
}

fn rm_operand(cur: &mut Cursor<'_>, modrm: u8, width: Option<Width>, segment: Option<Reg>) -> Option<Operand> {
    let md = modrm >> 6;
    let rm = modrm & 7;
    if md == 0b11 {
        return Some(Operand::Reg(Reg::general(width.unwrap_or(Width::Word), rm)));
    }
    let (base, index) = match rm {
        0 => (Some(Reg::BX), Some(Reg::SI)),
        1 => (Some(Reg::BX), Some(Reg::DI)),
        2 => (Some(Reg::BP), Some(Reg::SI)),
        3 => (Some(Reg::BP), Some(Reg::DI)),
        4 => (None, Some(Reg::SI)),
        5 => (None, Some(Reg::DI)),
        6 if md == 0 => (None, None),
        6 => (Some(Reg::BP), None),
        _ => (Some(Reg::BX), None),
    };
    let disp = match md {
        0 if rm == 6 => Some(hex(cur.u16()? as i64)),
        0 => None,
        1 => Some(hex(cur.u8()? as i8 as i64)),
        _ => Some(hex(cur.u16()? as i16 as i64)),
    };
    // [bp] has no disp-less form; hide the forced zero
    let disp = match disp {
        Some(d) if md == 1 && rm == 6 && d.value == 0 => None,
        d => d,
    };
    Some(Operand::Mem(MemoryOperand {
        base,
        index,
        disp: disp.map(Disp::Imm),
        segment,
        width,
    }))
}
