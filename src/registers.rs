use crate::cpu::Flags;
use crate::isa::register::{Reg, Width};
use serde::{Deserialize, Serialize};

pub const IP: u8 = 0b1100;
pub const FLAGS: u8 = 0b1101;

const SLOTS: usize = 14;
// bits 12-15 and bit 1 read as one, bits 3 and 5 as zero
const FLAGS_SET: u16 = 0xF002;
const FLAGS_CLEAR: u16 = 0x0028;

/// Byte-addressable register file.
///
/// 16-bit slots are indexed by code: general registers 0–7, segment
/// registers 0b1000 + code, then IP and FLAGS. 8-bit codes 0–3 alias the
/// low byte of slots 0–3 and codes 4–7 their high byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFile {
    bytes: [u8; SLOTS * 2],
}

impl Default for RegisterFile {
    fn default() -> Self {
        let mut regs = Self {
            bytes: [0; SLOTS * 2],
        };
        regs.set16(FLAGS, 0);
        regs
    }
}

impl RegisterFile {
    pub fn get16(&self, code: u8) -> u16 {
        let i = code as usize * 2;
        u16::from_le_bytes([self.bytes[i], self.bytes[i + 1]])
    }

    pub fn set16(&mut self, code: u8, value: u16) {
        let value = if code == FLAGS {
            (value | FLAGS_SET) & !FLAGS_CLEAR
        } else {
            value
        };
        let i = code as usize * 2;
        self.bytes[i..i + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn byte_offset(code: u8) -> usize {
        let code = (code & 7) as usize;
        if code < 4 {
            code * 2
        } else {
            (code - 4) * 2 + 1
        }
    }

    pub fn get8(&self, code: u8) -> u8 {
        self.bytes[Self::byte_offset(code)]
    }

    pub fn set8(&mut self, code: u8, value: u8) {
        self.bytes[Self::byte_offset(code)] = value;
    }

    pub fn get(&self, reg: Reg) -> u16 {
        match reg.width() {
            Width::Byte => self.get8(reg.code()) as u16,
            Width::Word => self.get16(reg.file_code()),
        }
    }

    pub fn set(&mut self, reg: Reg, value: u16) {
        match reg.width() {
            Width::Byte => self.set8(reg.code(), value as u8),
            Width::Word => self.set16(reg.file_code(), value),
        }
    }

    pub fn ip(&self) -> u16 {
        self.get16(IP)
    }

    pub fn set_ip(&mut self, ip: u16) {
        self.set16(IP, ip);
    }

    pub fn flags(&self) -> Flags {
        Flags::from_bits_retain(self.get16(FLAGS))
    }

    pub fn set_flags(&mut self, flags: Flags) {
        self.set16(FLAGS, flags.bits());
    }
}
