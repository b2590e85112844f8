use crate::cpu::{Cpu, CpuConfig, Fault, Flags, ResetVector};
use crate::diag::{DiagnosticSink, Diagnostics};
use crate::exec::IntExecutor;
use crate::io::IoBus;
use crate::isa::i8086::I8086Decoder;
use crate::isa::register::Reg;
use crate::memory::{linear, MappedMemory, Region, ADDRESS_MASK};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub cpu: CpuConfig,
    pub ram_size: usize,
    /// Where the BIOS image is mapped; defaults to the top of the address space.
    pub bios_base: Option<u32>,
    pub pit_ticks_per_step: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            cpu: CpuConfig::default(),
            ram_size: 0xA0000,
            bios_base: None,
            pit_ticks_per_step: 1,
        }
    }
}

/// CPU, memory map, timer and interrupt controller wired together.
pub struct Machine<S = Diagnostics> {
    pub cpu: Cpu,
    pub memory: MappedMemory,
    pub io: IoBus,
    pub diag: S,
    cfg: MachineConfig,
    decoder: I8086Decoder,
    exec: IntExecutor,
    steps: u64,
}

impl Machine<Diagnostics> {
    pub fn new(cfg: MachineConfig, bios: Vec<u8>) -> Self {
        Self::with_sink(cfg, bios, Diagnostics::new())
    }
}

impl<S: DiagnosticSink> Machine<S> {
    pub fn with_sink(cfg: MachineConfig, bios: Vec<u8>, diag: S) -> Self {
        let mut memory = MappedMemory::new();
        memory.map(Region::ram(0, cfg.ram_size));
        let base = cfg
            .bios_base
            .unwrap_or_else(|| (ADDRESS_MASK + 1).saturating_sub(bios.len() as u32));
        memory.map(Region::rom(base, bios));

        let mut cpu = Cpu::new(cfg.cpu);
        let (cs, ip) = match cfg.cpu.reset_vector {
            ResetVector::ImageStart => ((base >> 4) as u16, (base & 0xF) as u16),
            ResetVector::Architectural => (0xFFFF, 0x0000),
            ResetVector::Explicit { cs, ip } => (cs, ip),
        };
        cpu.reset(cs, ip);
        tracing::info!(bios = format_args!("{base:05X}h"), cs, ip, "machine reset");

        Self {
            cpu,
            memory,
            io: IoBus::new(),
            diag,
            cfg,
            decoder: I8086Decoder::new(),
            exec: IntExecutor,
            steps: 0,
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.cfg
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Load a flat COM image at `segment:0100` and point every segment
    /// register and the stack at it.
    pub fn load_com(&mut self, segment: u16, image: &[u8]) {
        self.memory.load(linear(segment, 0x100), image);
        for r in [Reg::CS, Reg::DS, Reg::ES, Reg::SS] {
            self.cpu.set_reg(r, segment);
        }
        self.cpu.set_reg(Reg::SP, 0xFFFE);
        self.cpu.regs.set_ip(0x100);
        self.cpu.halted = false;
    }

    /// Advance the timer, deliver a pending interrupt if IF allows, then
    /// run one instruction unless the CPU is halted.
    pub fn step(&mut self) -> Result<(), Fault> {
        for _ in 0..self.cfg.pit_ticks_per_step {
            let before = self.io.pit.output(0);
            self.io.pit.tick();
            if !before && self.io.pit.output(0) {
                self.io.pic.set_interrupt(0);
            }
        }

        if self.cpu.flag(Flags::IF) {
            if let Some(irq) = self.io.pic.acknowledge_interrupt() {
                let vector = self.io.pic.vector(irq);
                let ip = self.cpu.ip();
                self.cpu.interrupt(&mut self.memory, vector, ip);
            }
        }

        self.steps += 1;
        if self.cpu.halted {
            return Ok(());
        }
        self.cpu.execute(
            &mut self.memory,
            &mut self.io,
            &self.decoder,
            &self.exec,
            &mut self.diag,
        )
    }

    /// Step until a fault or `max_steps`. Stops early once halted with
    /// interrupts disabled, since nothing can wake the CPU.
    pub fn run(&mut self, max_steps: u64) -> Result<u64, Fault> {
        let start = self.steps;
        while self.steps - start < max_steps {
            if self.cpu.halted && !self.cpu.flag(Flags::IF) {
                break;
            }
            self.step()?;
        }
        Ok(self.steps - start)
    }
}
