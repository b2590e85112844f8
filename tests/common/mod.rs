#![allow(dead_code)]

use pc8086_rs::exec::IntExecutor;
use pc8086_rs::io::NullIo;
use pc8086_rs::isa::i8086::I8086Decoder;
use pc8086_rs::isa::register::Reg;
use pc8086_rs::memory::linear;
use pc8086_rs::{Cpu, CpuConfig, Diagnostics, MappedMemory, PortIo, Region};

pub const SEG: u16 = 0x1000;

/// CPU at SEG:0100 with every segment register on SEG and `code` loaded.
pub fn setup(code: &[u8]) -> (Cpu, MappedMemory) {
    let mut mem = MappedMemory::new();
    mem.map(Region::ram(0, 0x40000));
    mem.load(linear(SEG, 0x100), code);
    let mut cpu = Cpu::new(CpuConfig {
        trace: false,
        ..CpuConfig::default()
    });
    cpu.reset(SEG, 0x100);
    for r in [Reg::DS, Reg::ES, Reg::SS] {
        cpu.set_reg(r, SEG);
    }
    cpu.set_reg(Reg::SP, 0xFFFE);
    (cpu, mem)
}

pub fn step_io<P: PortIo>(cpu: &mut Cpu, mem: &mut MappedMemory, io: &mut P, n: usize) {
    let dec = I8086Decoder::new();
    let exec = IntExecutor;
    let mut diag = Diagnostics::new();
    for _ in 0..n {
        cpu.execute(mem, io, &dec, &exec, &mut diag).unwrap();
    }
}

pub fn step(cpu: &mut Cpu, mem: &mut MappedMemory, n: usize) {
    step_io(cpu, mem, &mut NullIo, n);
}
