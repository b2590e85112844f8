use crate::isa::register::Width;
use crate::pic::{self, Pic};
use crate::pit::Pit;

/// Value read from ports nothing answers on.
pub const OPEN_BUS: u8 = 0xFF;

pub trait PortIo {
    fn read_u8(&mut self, port: u16) -> u8;
    fn write_u8(&mut self, port: u16, value: u8);

    /// Word access is two byte accesses at `port` and `port + 1`.
    fn read(&mut self, width: Width, port: u16) -> u16 {
        match width {
            Width::Byte => self.read_u8(port) as u16,
            Width::Word => {
                let lo = self.read_u8(port);
                let hi = self.read_u8(port.wrapping_add(1));
                u16::from_le_bytes([lo, hi])
            }
        }
    }

    fn write(&mut self, width: Width, port: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write_u8(port, lo);
        if width == Width::Word {
            self.write_u8(port.wrapping_add(1), hi);
        }
    }
}

/// Port space with the timer and interrupt controller attached.
#[derive(Debug, Clone, Default)]
pub struct IoBus {
    pub pit: Pit,
    pub pic: Pic,
}

impl IoBus {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_pic(port: u16) -> bool {
    port == pic::PORT_COMMAND || port == pic::PORT_DATA
}

fn is_reserved(port: u16) -> bool {
    // second controller
    matches!(port, 0xA0 | 0xA1)
}

impl PortIo for IoBus {
    fn read_u8(&mut self, port: u16) -> u8 {
        if Pit::claims(port) {
            self.pit.read(port)
        } else if is_pic(port) {
            self.pic.read(port)
        } else {
            if !is_reserved(port) {
                tracing::debug!(port = format_args!("{port:04X}h"), "read from unhandled port");
            }
            OPEN_BUS
        }
    }

    fn write_u8(&mut self, port: u16, value: u8) {
        if Pit::claims(port) {
            self.pit.write(port, value);
        } else if is_pic(port) {
            self.pic.write(port, value);
        } else if !is_reserved(port) {
            tracing::debug!(port = format_args!("{port:04X}h"), value, "write to unhandled port");
        }
    }
}

/// Port space with nothing attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullIo;

impl PortIo for NullIo {
    fn read_u8(&mut self, _port: u16) -> u8 {
        OPEN_BUS
    }

    fn write_u8(&mut self, _port: u16, _value: u8) {}
}
