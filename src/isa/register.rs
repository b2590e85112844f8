use serde::{Deserialize, Serialize};
use std::fmt;

/// Operand width. The 8086 only moves bytes and words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Width {
    Byte,
    Word,
}

impl Width {
    pub const fn bits(self) -> u32 {
        match self {
            Width::Byte => 8,
            Width::Word => 16,
        }
    }

    pub const fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
        }
    }

    pub const fn mask(self) -> u16 {
        match self {
            Width::Byte => 0x00FF,
            Width::Word => 0xFFFF,
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Width::Byte => f.write_str("BYTE"),
            Width::Word => f.write_str("WORD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegKind {
    General,
    Segment,
}

/// Every architectural register that can appear as an operand.
///
/// Discriminants follow the hardware encoding: the low three bits are the
/// value placed in a ModRM `reg`/`rm` field or folded into an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Reg {
    AL = 0,
    CL,
    DL,
    BL,
    AH,
    CH,
    DH,
    BH,
    AX = 8,
    CX,
    DX,
    BX,
    SP,
    BP,
    SI,
    DI,
    ES = 16,
    CS,
    SS,
    DS,
}

const BYTE_REGS: [Reg; 8] = [
    Reg::AL,
    Reg::CL,
    Reg::DL,
    Reg::BL,
    Reg::AH,
    Reg::CH,
    Reg::DH,
    Reg::BH,
];
const WORD_REGS: [Reg; 8] = [
    Reg::AX,
    Reg::CX,
    Reg::DX,
    Reg::BX,
    Reg::SP,
    Reg::BP,
    Reg::SI,
    Reg::DI,
];
const SEGMENT_REGS: [Reg; 4] = [Reg::ES, Reg::CS, Reg::SS, Reg::DS];

impl Reg {
    pub const ALL: [Reg; 20] = [
        Reg::AL,
        Reg::CL,
        Reg::DL,
        Reg::BL,
        Reg::AH,
        Reg::CH,
        Reg::DH,
        Reg::BH,
        Reg::AX,
        Reg::CX,
        Reg::DX,
        Reg::BX,
        Reg::SP,
        Reg::BP,
        Reg::SI,
        Reg::DI,
        Reg::ES,
        Reg::CS,
        Reg::SS,
        Reg::DS,
    ];

    /// 3-bit hardware encoding (2 bits for segment registers).
    pub const fn code(self) -> u8 {
        (self as u8) & 0b111
    }

    pub const fn width(self) -> Width {
        if (self as u8) < 8 {
            Width::Byte
        } else {
            Width::Word
        }
    }

    pub const fn kind(self) -> RegKind {
        if (self as u8) >= 16 {
            RegKind::Segment
        } else {
            RegKind::General
        }
    }

    pub const fn is_segment(self) -> bool {
        matches!(self.kind(), RegKind::Segment)
    }

    /// Slot in the CPU register file: 8-bit codes 0–7 and 16-bit codes 0–7
    /// index their own namespaces, segment registers live at 0b1000 + code.
    pub const fn file_code(self) -> u8 {
        match self.kind() {
            RegKind::General => self.code(),
            RegKind::Segment => 0b1000 | self.code(),
        }
    }

    pub fn general(width: Width, code: u8) -> Reg {
        match width {
            Width::Byte => BYTE_REGS[(code & 7) as usize],
            Width::Word => WORD_REGS[(code & 7) as usize],
        }
    }

    pub fn segment(code: u8) -> Reg {
        SEGMENT_REGS[(code & 3) as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            Reg::AL => "AL",
            Reg::CL => "CL",
            Reg::DL => "DL",
            Reg::BL => "BL",
            Reg::AH => "AH",
            Reg::CH => "CH",
            Reg::DH => "DH",
            Reg::BH => "BH",
            Reg::AX => "AX",
            Reg::CX => "CX",
            Reg::DX => "DX",
            Reg::BX => "BX",
            Reg::SP => "SP",
            Reg::BP => "BP",
            Reg::SI => "SI",
            Reg::DI => "DI",
            Reg::ES => "ES",
            Reg::CS => "CS",
            Reg::SS => "SS",
            Reg::DS => "DS",
        }
    }

    pub fn from_name(name: &str) -> Option<Reg> {
        Reg::ALL
            .iter()
            .copied()
            .find(|r| r.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
