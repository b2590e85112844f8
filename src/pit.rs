//! Intel 8253 programmable interval timer.
//!
//! Three down-counters share a control port. Each channel is ticked by the
//! caller at the input clock rate; `tick` applies one clock edge.

use serde::{Deserialize, Serialize};

pub const PORT_CHANNEL0: u16 = 0x40;
pub const PORT_CONTROL: u16 = 0x43;
/// System control port B: bit 0 gates channel 2, bit 5 reflects its output.
pub const PORT_B: u16 = 0x61;

/// Order in which the two bytes of a count travel through the data port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    Latch,
    Low,
    High,
    LowHigh,
}

impl AccessMode {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => AccessMode::Latch,
            1 => AccessMode::Low,
            2 => AccessMode::High,
            _ => AccessMode::LowHigh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Half {
    Low,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    mode: u8,
    access: AccessMode,
    bcd: bool,
    gate: bool,
    out: bool,
    set: u16,
    count: u32,
    latch: u16,
    latched: bool,
    write_half: Half,
    read_half: Half,
    writing: bool,
    armed: bool,
    load_pending: bool,
    counting: bool,
    first_step: bool,
    terminal: bool,
}

impl Channel {
    pub fn new(gate: bool) -> Self {
        Self {
            mode: 0,
            access: AccessMode::LowHigh,
            bcd: false,
            gate,
            out: false,
            set: 0,
            count: 0,
            latch: 0,
            latched: false,
            write_half: Half::Low,
            read_half: Half::Low,
            writing: false,
            armed: false,
            load_pending: false,
            counting: false,
            first_step: false,
            terminal: false,
        }
    }

    pub fn mode(&self) -> u8 {
        self.mode
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access
    }

    pub fn output(&self) -> bool {
        self.out
    }

    pub fn gate(&self) -> bool {
        self.gate
    }

    /// Live counter value as the hardware would latch it.
    pub fn count(&self) -> u16 {
        self.count as u16
    }

    pub fn bcd(&self) -> bool {
        self.bcd
    }

    fn reload(&self) -> u32 {
        if self.set == 0 {
            0x10000
        } else {
            self.set as u32
        }
    }

    /// Latch mode snapshots the counter instead of changing the access mode.
    pub fn set_access_mode(&mut self, access: AccessMode) {
        if access == AccessMode::Latch {
            self.set_latch();
            return;
        }
        self.access = access;
        self.write_half = Half::Low;
        self.read_half = Half::Low;
        self.writing = false;
    }

    /// Modes 6 and 7 alias 2 and 3.
    pub fn set_timer_mode(&mut self, mode: u8) {
        let mode = match mode & 7 {
            6 => 2,
            7 => 3,
            m => m,
        };
        self.mode = mode;
        self.out = mode != 0;
        self.armed = false;
        self.load_pending = false;
        self.counting = false;
        self.terminal = false;
        self.latched = false;
    }

    pub fn set_bcd(&mut self, bcd: bool) {
        self.bcd = bcd;
    }

    pub fn set_latch(&mut self) {
        if !self.latched {
            self.latch = self.count as u16;
            self.latched = true;
            self.read_half = Half::Low;
        }
    }

    pub fn write_byte(&mut self, value: u8) {
        let v = value as u16;
        match (self.access, self.write_half) {
            (AccessMode::Latch, _) => return,
            (AccessMode::Low, _) => self.set = v,
            (AccessMode::High, _) => self.set = v << 8,
            (AccessMode::LowHigh, Half::Low) => {
                self.set = (self.set & 0xFF00) | v;
                self.write_half = Half::High;
                self.writing = true;
                return;
            }
            (AccessMode::LowHigh, Half::High) => {
                self.set = (self.set & 0x00FF) | (v << 8);
                self.write_half = Half::Low;
            }
        }
        self.writing = false;
        self.count_written();
    }

    fn count_written(&mut self) {
        tracing::trace!(mode = self.mode, count = self.set, "pit count written");
        self.armed = true;
        match self.mode {
            0 => {
                self.out = false;
                self.load_pending = true;
            }
            2 | 3 | 4 => self.load_pending = true,
            // modes 1 and 5 wait for a gate trigger
            _ => {}
        }
    }

    pub fn read_byte(&mut self) -> u8 {
        let value = if self.latched {
            self.latch
        } else {
            self.count as u16
        };
        let half = match self.access {
            AccessMode::Low => Half::Low,
            AccessMode::High => Half::High,
            AccessMode::LowHigh | AccessMode::Latch => {
                let h = self.read_half;
                self.read_half = match h {
                    Half::Low => Half::High,
                    Half::High => Half::Low,
                };
                h
            }
        };
        let done = match self.access {
            AccessMode::LowHigh | AccessMode::Latch => half == Half::High,
            _ => true,
        };
        if done {
            self.latched = false;
        }
        match half {
            Half::Low => value as u8,
            Half::High => (value >> 8) as u8,
        }
    }

    pub fn set_gate(&mut self, level: bool) {
        let rising = level && !self.gate;
        let falling = !level && self.gate;
        self.gate = level;
        match self.mode {
            1 | 5 if rising && self.armed => self.load_pending = true,
            2 | 3 if falling => self.out = true,
            2 | 3 if rising && self.armed => self.load_pending = true,
            _ => {}
        }
    }

    fn decrement(&mut self) {
        self.count = if self.count == 0 { 0xFFFF } else { self.count - 1 };
    }

    pub fn tick(&mut self) {
        if self.writing && matches!(self.mode, 0 | 2 | 3 | 4) {
            return;
        }

        if self.load_pending {
            self.load_pending = false;
            self.count = self.reload();
            self.counting = true;
            self.terminal = false;
            self.first_step = true;
            match self.mode {
                1 => self.out = false,
                2 | 3 => self.out = true,
                _ => {}
            }
            return;
        }

        if !self.counting {
            return;
        }

        match self.mode {
            0 => {
                if !self.gate {
                    return;
                }
                self.decrement();
                if self.count == 0 && !self.terminal {
                    self.out = true;
                    self.terminal = true;
                }
            }
            1 => {
                self.decrement();
                if self.count == 0 {
                    self.out = true;
                    self.counting = false;
                }
            }
            2 => {
                if !self.gate {
                    return;
                }
                if !self.out {
                    self.count = self.reload();
                    self.out = true;
                    return;
                }
                self.decrement();
                if self.count <= 1 {
                    self.out = false;
                }
            }
            3 => {
                if !self.gate {
                    return;
                }
                // odd counts: the high half runs one step longer than the low half
                let step = if self.first_step && self.reload() & 1 == 1 {
                    if self.out {
                        1
                    } else {
                        3
                    }
                } else {
                    2
                };
                self.first_step = false;
                self.count = self.count.saturating_sub(step);
                if self.count == 0 {
                    self.out = !self.out;
                    self.count = self.reload();
                    self.first_step = true;
                }
            }
            4 | 5 => {
                if self.mode == 4 && !self.gate {
                    return;
                }
                self.out = true;
                self.decrement();
                if self.count == 0 && !self.terminal {
                    self.out = false;
                    self.terminal = true;
                }
            }
            _ => {}
        }
    }
}

/// The timer chip: three channels plus the port B gate for channel 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pit {
    pub channels: [Channel; 3],
    port_b: u8,
}

impl Default for Pit {
    fn default() -> Self {
        Self::new()
    }
}

impl Pit {
    pub fn new() -> Self {
        Self {
            channels: [Channel::new(true), Channel::new(true), Channel::new(false)],
            port_b: 0,
        }
    }

    /// Map a port onto 0x40..=0x43, including the 0x50..=0x5F aliases.
    pub fn decode_port(port: u16) -> Option<u16> {
        match port {
            0x40..=0x43 | 0x50..=0x5F => Some(PORT_CHANNEL0 + (port & 3)),
            _ => None,
        }
    }

    pub fn claims(port: u16) -> bool {
        port == PORT_B || Self::decode_port(port).is_some()
    }

    pub fn read(&mut self, port: u16) -> u8 {
        if port == PORT_B {
            return (self.port_b & 0x1F) | ((self.channels[2].output() as u8) << 5);
        }
        match Self::decode_port(port) {
            Some(p) if p < PORT_CONTROL => self.channels[(p - PORT_CHANNEL0) as usize].read_byte(),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, port: u16, value: u8) {
        if port == PORT_B {
            self.port_b = value;
            self.channels[2].set_gate(value & 1 != 0);
            return;
        }
        match Self::decode_port(port) {
            Some(PORT_CONTROL) => self.control(value),
            Some(p) => self.channels[(p - PORT_CHANNEL0) as usize].write_byte(value),
            None => {}
        }
    }

    fn control(&mut self, value: u8) {
        let select = (value >> 6) as usize;
        if select == 3 {
            tracing::debug!(value, "pit read-back command ignored");
            return;
        }
        let ch = &mut self.channels[select];
        let access = AccessMode::from_bits(value >> 4);
        if access == AccessMode::Latch {
            ch.set_latch();
            return;
        }
        ch.set_access_mode(access);
        ch.set_timer_mode((value >> 1) & 7);
        ch.set_bcd(value & 1 != 0);
        tracing::debug!(channel = select, mode = ch.mode(), ?access, "pit programmed");
    }

    pub fn tick(&mut self) {
        for ch in &mut self.channels {
            ch.tick();
        }
    }

    pub fn output(&self, channel: usize) -> bool {
        self.channels.get(channel).map_or(false, Channel::output)
    }
}
