use thiserror::Error;

/// Conditions that halt the CPU.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CpuError {
    /// The byte at `pc` has no decode entry. PC is left on the opcode.
    #[error("unhandled opcode ${opcode:02X} at ${pc:04X}")]
    UnhandledOpcode { opcode: u8, pc: u16 },
}
