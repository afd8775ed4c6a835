//! Execution policies layered over [`Mos6502::step`].
//!
//! A policy decides how long to run; the CPU only knows how to run one
//! instruction. Budgets and the stop opcode are checked before each
//! instruction, the breakpoint after it, and the first condition that holds
//! ends the run with a [`StopReason`].

use std::fmt;

use emu_core::Bus;

use crate::cpu::{InstructionResult, Mos6502};
use crate::error::CpuError;

/// Predicate consulted after every instruction.
pub type Breakpoint = Box<dyn FnMut(&Mos6502, &ExecState) -> bool>;

/// Which condition ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopKind {
    CycleBudget,
    InstructionBudget,
    /// The stop opcode is at PC. It has not been executed.
    Opcode,
    Breakpoint,
    UnhandledOpcode,
    /// The program never acknowledged a finished frame.
    FrameAckTimeout,
}

impl fmt::Display for StopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CycleBudget => "cycle budget",
            Self::InstructionBudget => "instruction budget",
            Self::Opcode => "stop opcode",
            Self::Breakpoint => "breakpoint",
            Self::UnhandledOpcode => "unhandled opcode",
            Self::FrameAckTimeout => "frame acknowledge timeout",
        })
    }
}

/// Structured stop diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReason {
    pub kind: StopKind,
    pub message: String,
}

impl StopReason {
    #[must_use]
    pub fn new(kind: StopKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// True for stops that mean the program cannot make progress.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            StopKind::UnhandledOpcode | StopKind::FrameAckTimeout
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<CpuError> for StopReason {
    fn from(err: CpuError) -> Self {
        Self::new(StopKind::UnhandledOpcode, err.to_string())
    }
}

/// Counters for one policy invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecState {
    pub instructions: u64,
    pub cycles: u64,
    /// False once an opcode failed to decode.
    pub last_opcode_handled: bool,
    /// PC of the most recent opcode fetch, handled or not.
    pub pc_before_last_opcode: Option<u16>,
    pub last_result: Option<InstructionResult>,
}

impl ExecState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_opcode_handled: true,
            ..Self::default()
        }
    }
}

/// What the per-instruction hook wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// Return to the caller without a stop condition, e.g. at a frame edge.
    Yield,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Stopped(StopReason),
    Yielded,
}

/// Stop conditions for a run.
#[derive(Default)]
pub struct ExecPolicy {
    max_cycles: Option<u64>,
    max_instructions: Option<u64>,
    stop_opcode: Option<u8>,
    breakpoint: Option<Breakpoint>,
}

impl fmt::Debug for ExecPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecPolicy")
            .field("max_cycles", &self.max_cycles)
            .field("max_instructions", &self.max_instructions)
            .field("stop_opcode", &self.stop_opcode)
            .field("breakpoint", &self.breakpoint.is_some())
            .finish()
    }
}

impl ExecPolicy {
    /// Run until the hook yields or an instruction fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    #[must_use]
    pub fn with_max_instructions(mut self, instructions: u64) -> Self {
        self.max_instructions = Some(instructions);
        self
    }

    /// Stop before executing `opcode`.
    #[must_use]
    pub fn stop_on_opcode(mut self, opcode: u8) -> Self {
        self.stop_opcode = Some(opcode);
        self
    }

    /// Stop before executing BRK.
    #[must_use]
    pub fn stop_on_brk(self) -> Self {
        self.stop_on_opcode(0x00)
    }

    #[must_use]
    pub fn with_breakpoint<F>(mut self, predicate: F) -> Self
    where
        F: FnMut(&Mos6502, &ExecState) -> bool + 'static,
    {
        self.breakpoint = Some(Box::new(predicate));
        self
    }

    /// Breakpoint on reaching `address`.
    #[must_use]
    pub fn break_at(self, address: u16) -> Self {
        self.with_breakpoint(move |cpu, _| cpu.pc() == address)
    }

    fn check_budgets(
        &self,
        cpu: &Mos6502,
        bus: &(impl Bus + ?Sized),
        state: &ExecState,
    ) -> Option<StopReason> {
        if let Some(max) = self.max_cycles.filter(|&max| state.cycles >= max) {
            return Some(StopReason::new(
                StopKind::CycleBudget,
                format!("{} cycles consumed (budget {max})", state.cycles),
            ));
        }
        if let Some(max) = self.max_instructions.filter(|&max| state.instructions >= max) {
            return Some(StopReason::new(
                StopKind::InstructionBudget,
                format!("{} instructions executed (budget {max})", state.instructions),
            ));
        }
        let opcode = self.stop_opcode?;
        if cpu.interrupt_pending() || bus.peek(cpu.pc()) != opcode {
            return None;
        }
        Some(StopReason::new(
            StopKind::Opcode,
            format!("stop opcode ${opcode:02X} at ${:04X}", cpu.pc()),
        ))
    }

    fn check_breakpoint(&mut self, cpu: &Mos6502, state: &ExecState) -> Option<StopReason> {
        let breakpoint = self.breakpoint.as_mut()?;
        if !breakpoint(cpu, state) {
            return None;
        }
        Some(StopReason::new(
            StopKind::Breakpoint,
            format!("breakpoint at ${:04X}", cpu.pc()),
        ))
    }

    /// Execute one instruction, recording it in `state`.
    ///
    /// # Errors
    ///
    /// An [`StopKind::UnhandledOpcode`] stop if the opcode at PC is unknown.
    pub fn step(
        cpu: &mut Mos6502,
        bus: &mut (impl Bus + ?Sized),
        state: &mut ExecState,
    ) -> Result<InstructionResult, StopReason> {
        state.pc_before_last_opcode = Some(cpu.pc());
        match cpu.step(bus) {
            Ok(result) => {
                state.instructions += 1;
                state.cycles += u64::from(result.cycles);
                state.last_opcode_handled = true;
                state.last_result = Some(result);
                Ok(result)
            }
            Err(err) => {
                state.last_opcode_handled = false;
                Err(err.into())
            }
        }
    }

    /// Run under this policy. `after` sees every completed instruction and
    /// may yield; stop conditions are still checked around it.
    pub fn run<B, F>(
        &mut self,
        cpu: &mut Mos6502,
        bus: &mut B,
        state: &mut ExecState,
        mut after: F,
    ) -> RunOutcome
    where
        B: Bus + ?Sized,
        F: FnMut(&mut Mos6502, &mut B, &InstructionResult) -> Control,
    {
        loop {
            if let Some(reason) = self.check_budgets(cpu, bus, state) {
                log::debug!("stopped: {reason}");
                return RunOutcome::Stopped(reason);
            }
            let result = match Self::step(cpu, bus, state) {
                Ok(result) => result,
                Err(reason) => return RunOutcome::Stopped(reason),
            };
            let control = after(cpu, bus, &result);
            if let Some(reason) = self.check_breakpoint(cpu, state) {
                log::debug!("stopped: {reason}");
                return RunOutcome::Stopped(reason);
            }
            if control == Control::Yield {
                return RunOutcome::Yielded;
            }
        }
    }

    /// Run a bare CPU until a stop condition holds.
    pub fn run_to_stop(
        &mut self,
        cpu: &mut Mos6502,
        bus: &mut (impl Bus + ?Sized),
    ) -> (StopReason, ExecState) {
        let mut state = ExecState::new();
        loop {
            if let RunOutcome::Stopped(reason) =
                self.run(cpu, bus, &mut state, |_, _, _| Control::Continue)
            {
                return (reason, state);
            }
        }
    }
}
