//! MOS 6502 CPU.
//!
//! Instruction-level core: [`Mos6502::step`] runs one whole instruction
//! against any [`emu_core::Bus`] and reports its cycle count, including
//! page-crossing and branch penalties. [`ExecPolicy`] layers budgets,
//! stop opcodes and breakpoints on top.

mod addressing;
mod cpu;
mod error;
mod evaluator;
pub mod flags;
pub mod opcodes;
mod registers;

pub use cpu::{IRQ_VECTOR, InstructionResult, Mos6502, NMI_VECTOR, RESET_VECTOR, StepKind};
pub use error::CpuError;
pub use evaluator::{
    Breakpoint, Control, ExecPolicy, ExecState, RunOutcome, StopKind, StopReason,
};
pub use flags::Status;
pub use opcodes::{AddressingMode, Mnemonic, OpCode, decode};
pub use registers::{Registers, STACK_PAGE};
