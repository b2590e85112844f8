use crate::isa::opcode::{Mnemonic, OpCode};
use crate::isa::operand::Operand;
use crate::isa::register::{Reg, Width};
use crate::isa::table::Prefix;

/// One decoded instruction, prefixes included.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub mnemonic: Mnemonic,
    pub opcode: &'static OpCode,
    pub operands: Vec<Operand>,
    pub len: u8, // bytes consumed, prefixes included
    pub segment: Option<Reg>,
    pub rep: Option<Prefix>,
    pub lock: bool,
}

impl Decoded {
    pub fn width(&self) -> Width {
        self.opcode.width()
    }
}

pub trait Decoder {
    /// Decode the instruction starting at `bytes[0]`. `None` when the
    /// opcode is unknown or the window is too short.
    fn decode(&self, bytes: &[u8]) -> Option<Decoded>;
}
