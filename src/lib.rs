pub mod alu;
pub mod cpu;
pub mod decoder;
pub mod diag;
pub mod disasm;
pub mod exec;
pub mod io;
pub mod machine;
pub mod memory;
pub mod pic;
pub mod pit;
pub mod registers;

pub mod isa {
    pub mod i8086; // decoder over the shared table
    pub mod opcode;
    pub mod operand;
    pub mod register;
    pub mod table;
}

pub use cpu::{Cpu, CpuConfig, Fault, Flags, ResetVector};
pub use decoder::{Decoded, Decoder};
pub use diag::{Diagnostic, DiagnosticSink, Diagnostics, Severity, TracingSink};
pub use io::{IoBus, PortIo};
pub use machine::{Machine, MachineConfig};
pub use memory::{MappedMemory, Memory, Region};
