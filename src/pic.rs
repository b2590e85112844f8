//! Intel 8259 programmable interrupt controller (single, unchained).

use bitvec::prelude::*;

pub const PORT_COMMAND: u16 = 0x20;
pub const PORT_DATA: u16 = 0x21;

type IrqBits = BitArr!(for 8, in u8, Lsb0);

/// Position in the ICW1..ICW4 initialization sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Uninitialized,
    Icw2,
    Icw3,
    Icw4,
    Ready,
}

#[derive(Debug, Clone)]
pub struct Pic {
    imr: IrqBits,
    irr: IrqBits,
    isr: IrqBits,
    stage: InitStage,
    needs_icw4: bool,
    single: bool,
    level_triggered: bool,
    vector_base: u8,
    cascade: u8,
    auto_eoi: bool,
    buffered: bool,
    nested: bool,
    read_isr: bool,
}

impl Default for Pic {
    fn default() -> Self {
        Self::new()
    }
}

impl Pic {
    pub fn new() -> Self {
        Self {
            imr: IrqBits::ZERO,
            irr: IrqBits::ZERO,
            isr: IrqBits::ZERO,
            stage: InitStage::Uninitialized,
            needs_icw4: false,
            single: true,
            level_triggered: false,
            vector_base: 0,
            cascade: 0,
            auto_eoi: false,
            buffered: false,
            nested: false,
            read_isr: false,
        }
    }

    pub fn stage(&self) -> InitStage {
        self.stage
    }

    pub fn vector_base(&self) -> u8 {
        self.vector_base
    }

    pub fn mask(&self) -> u8 {
        self.imr.load_le::<u8>()
    }

    pub fn request(&self) -> u8 {
        self.irr.load_le::<u8>()
    }

    pub fn in_service(&self) -> u8 {
        self.isr.load_le::<u8>()
    }

    pub fn auto_eoi(&self) -> bool {
        self.auto_eoi
    }

    pub fn level_triggered(&self) -> bool {
        self.level_triggered
    }

    pub fn buffered(&self) -> bool {
        self.buffered
    }

    pub fn special_nested(&self) -> bool {
        self.nested
    }

    pub fn read(&mut self, port: u16) -> u8 {
        if port & 1 == 1 {
            self.mask()
        } else if self.read_isr {
            self.in_service()
        } else {
            self.request()
        }
    }

    pub fn write(&mut self, port: u16, value: u8) {
        if port & 1 == 1 {
            self.write_data(value);
        } else {
            self.write_command(value);
        }
    }

    fn write_command(&mut self, value: u8) {
        if value & 0x10 != 0 {
            // ICW1
            self.needs_icw4 = value & 0x01 != 0;
            self.single = value & 0x02 != 0;
            self.level_triggered = value & 0x08 != 0;
            self.imr.fill(false);
            self.irr.fill(false);
            self.isr.fill(false);
            self.auto_eoi = false;
            self.read_isr = false;
            self.stage = InitStage::Icw2;
            tracing::debug!(value, "pic icw1");
        } else if value & 0x08 != 0 {
            // OCW3
            if value & 0x02 != 0 {
                self.read_isr = value & 0x01 != 0;
            }
        } else if value & 0x20 != 0 {
            // OCW2 end of interrupt; rotation commands are not modelled
            if value & 0x40 != 0 {
                self.isr.set((value & 7) as usize, false);
            } else {
                self.eoi();
            }
        }
    }

    fn write_data(&mut self, value: u8) {
        match self.stage {
            InitStage::Icw2 => {
                self.vector_base = value & 0xF8;
                self.stage = if !self.single {
                    InitStage::Icw3
                } else if self.needs_icw4 {
                    InitStage::Icw4
                } else {
                    InitStage::Ready
                };
            }
            InitStage::Icw3 => {
                self.cascade = value;
                self.stage = if self.needs_icw4 {
                    InitStage::Icw4
                } else {
                    InitStage::Ready
                };
            }
            InitStage::Icw4 => {
                self.auto_eoi = value & 0x02 != 0;
                self.buffered = value & 0x08 != 0;
                self.nested = value & 0x10 != 0;
                self.stage = InitStage::Ready;
                tracing::debug!(base = self.vector_base, auto_eoi = self.auto_eoi, "pic ready");
            }
            InitStage::Uninitialized | InitStage::Ready => {
                self.imr.store_le(value);
            }
        }
    }

    /// Raise request line `irq`. Masked lines are dropped.
    pub fn set_interrupt(&mut self, irq: u8) {
        let irq = (irq & 7) as usize;
        if !self.imr[irq] {
            self.irr.set(irq, true);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.isr.not_any() && self.irr.iter_ones().any(|irq| !self.imr[irq])
    }

    /// Interrupt acknowledge: move the lowest-numbered unmasked request
    /// into service and return its line. Nothing is delivered while
    /// another interrupt is in service.
    pub fn acknowledge_interrupt(&mut self) -> Option<u8> {
        if self.isr.any() {
            return None;
        }
        let irq = self.irr.iter_ones().find(|&irq| !self.imr[irq])?;
        self.irr.set(irq, false);
        if !self.auto_eoi {
            self.isr.set(irq, true);
        }
        Some(irq as u8)
    }

    pub fn vector(&self, irq: u8) -> u8 {
        self.vector_base | (irq & 7)
    }

    pub fn eoi(&mut self) {
        self.isr.fill(false);
    }
}
