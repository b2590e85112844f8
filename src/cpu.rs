use crate::decoder::Decoder;
use crate::diag::DiagnosticSink;
use crate::disasm::fmt_decoded;
use crate::exec::Executor;
use crate::io::PortIo;
use crate::isa::register::Reg;
use crate::memory::{linear, Memory};
use crate::registers::RegisterFile;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Where execution starts after reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetVector {
    /// First byte of the BIOS image.
    ImageStart,
    /// FFFF:0000.
    Architectural,
    Explicit { cs: u16, ip: u16 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CpuConfig {
    pub reset_vector: ResetVector,
    pub trace: bool, // emit a trace record per instruction
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            reset_vector: ResetVector::ImageStart,
            trace: true,
        }
    }
}

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags: u16 {
const CF = 1 << 0;  // Carry
const PF = 1 << 2;  // Parity (even)
const AF = 1 << 4;  // Auxiliary carry
const ZF = 1 << 6;  // Zero
const SF = 1 << 7;  // Sign
const TF = 1 << 8;  // Trap
const IF = 1 << 9;  // Interrupt enable
const DF = 1 << 10; // Direction
const OF = 1 << 11; // Overflow
}
}

impl Flags {
    pub const ARITH: Flags = Flags::CF
        .union(Flags::PF)
        .union(Flags::AF)
        .union(Flags::ZF)
        .union(Flags::SF)
        .union(Flags::OF);
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("Invalid opcode {byte:#04x} at {cs:04X}:{ip:04X}")]
    InvalidOpcode { cs: u16, ip: u16, byte: u8 },
    #[error("Unsupported operands for {mnemonic} at {cs:04X}:{ip:04X}")]
    Unsupported {
        cs: u16,
        ip: u16,
        mnemonic: &'static str,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cpu {
    pub regs: RegisterFile,
    pub halted: bool,
    pub cfg: CpuConfig,
}

impl Cpu {
    pub fn new(cfg: CpuConfig) -> Self {
        Self {
            regs: RegisterFile::default(),
            halted: false,
            cfg,
        }
    }

    pub fn reset(&mut self, cs: u16, ip: u16) {
        self.regs = RegisterFile::default();
        self.regs.set(Reg::CS, cs);
        self.regs.set_ip(ip);
        self.halted = false;
    }

    pub fn reg(&self, reg: Reg) -> u16 {
        self.regs.get(reg)
    }

    pub fn set_reg(&mut self, reg: Reg, value: u16) {
        self.regs.set(reg, value);
    }

    pub fn ip(&self) -> u16 {
        self.regs.ip()
    }

    pub fn flags(&self) -> Flags {
        self.regs.flags()
    }

    pub fn flag(&self, f: Flags) -> bool {
        self.flags().contains(f)
    }

    pub fn set_flag(&mut self, f: Flags, on: bool) {
        let mut flags = self.flags();
        flags.set(f, on);
        self.regs.set_flags(flags);
    }

    /// Replace the bits in `affected` with those from `value`.
    pub fn update_flags(&mut self, value: Flags, affected: Flags) {
        let flags = (self.flags() - affected) | (value & affected);
        self.regs.set_flags(flags);
    }

    /// Linear address of the next instruction.
    pub fn pc(&self) -> u32 {
        linear(self.reg(Reg::CS), self.ip())
    }

    pub fn push<M: Memory>(&mut self, mem: &mut M, value: u16) {
        let sp = self.reg(Reg::SP).wrapping_sub(2);
        self.set_reg(Reg::SP, sp);
        mem.write_u16(linear(self.reg(Reg::SS), sp), value);
    }

    pub fn pop<M: Memory>(&mut self, mem: &mut M) -> u16 {
        let sp = self.reg(Reg::SP);
        let value = mem.read_u16(linear(self.reg(Reg::SS), sp));
        self.set_reg(Reg::SP, sp.wrapping_add(2));
        value
    }

    /// Enter interrupt `vector` through the table at 0000:0000. `ret_ip`
    /// is the offset pushed as the return address.
    pub fn interrupt<M: Memory>(&mut self, mem: &mut M, vector: u8, ret_ip: u16) {
        let flags = self.flags().bits();
        let cs = self.reg(Reg::CS);
        self.push(mem, flags);
        self.push(mem, cs);
        self.push(mem, ret_ip);
        self.set_flag(Flags::IF | Flags::TF, false);
        let entry = vector as u32 * 4;
        let ip = mem.read_u16(entry);
        let seg = mem.read_u16(entry + 2);
        self.set_reg(Reg::CS, seg);
        self.regs.set_ip(ip);
        self.halted = false;
        tracing::debug!(vector, cs = seg, ip, "interrupt");
    }

    /// Fetch, decode and run one instruction at CS:IP.
    pub fn execute<M: Memory, P: PortIo, D: Decoder, X: Executor, S: DiagnosticSink>(
        &mut self,
        mem: &mut M,
        io: &mut P,
        dec: &D,
        exec: &X,
        diag: &mut S,
    ) -> Result<(), Fault> {
        let cs = self.reg(Reg::CS);
        let ip = self.ip();
        // longest 8086 form plus a few prefixes
        let mut window = [0u8; 10];
        for (i, b) in window.iter_mut().enumerate() {
            *b = mem.read_u8(linear(cs, ip.wrapping_add(i as u16)));
        }

        let Some(d) = dec.decode(&window) else {
            let fault = Fault::InvalidOpcode {
                cs,
                ip,
                byte: window[0],
            };
            diag.fault(fault.to_string());
            return Err(fault);
        };

        if self.cfg.trace {
            let raw: String = window[..d.len as usize]
                .iter()
                .map(|b| format!("{b:02X}"))
                .collect();
            diag.trace(format!("{cs:04X}:{ip:04X}  {raw:<12} {}", fmt_decoded(&d)));
        }

        match exec.exec(self, mem, io, &d) {
            Ok(consumed) => {
                let next = self.ip().wrapping_add(consumed);
                self.regs.set_ip(next);
                Ok(())
            }
            Err(fault) => {
                diag.fault(fault.to_string());
                Err(fault)
            }
        }
    }
}
