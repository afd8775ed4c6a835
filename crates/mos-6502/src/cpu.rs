//! Instruction-stepped CPU.
//!
//! `step` executes one whole instruction (or interrupt entry) and reports
//! the cycles it took. There is no per-cycle state: peripherals are brought
//! up to date between instructions by the caller.

use emu_core::{Bus, Observable, Value};

use crate::addressing::Operand;
use crate::error::CpuError;
use crate::flags::{C, D, I, N, Status, V, Z};
use crate::opcodes::{Mnemonic, OpCode, decode};
use crate::registers::Registers;

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Cycles for the IRQ/NMI entry sequence.
const INTERRUPT_CYCLES: u32 = 7;

/// What a step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Instruction(OpCode),
    Irq,
    Nmi,
}

/// Outcome of one [`Mos6502::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionResult {
    /// Address of the opcode, or the PC that was interrupted.
    pub pc: u16,
    pub kind: StepKind,
    /// Base cycles plus page-cross and branch penalties.
    pub cycles: u32,
}

impl InstructionResult {
    /// Opcode byte, if an instruction was executed.
    #[must_use]
    pub fn opcode(&self) -> Option<u8> {
        match self.kind {
            StepKind::Instruction(op) => Some(op.code),
            StepKind::Irq | StepKind::Nmi => None,
        }
    }
}

/// NMOS 6502.
#[derive(Debug, Clone, Default)]
pub struct Mos6502 {
    pub regs: Registers,
    irq_line: bool,
    nmi_pending: bool,
    cycles: u64,
}

impl Mos6502 {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset and load PC from the reset vector.
    pub fn reset(&mut self, bus: &mut (impl Bus + ?Sized)) {
        let entry = Self::read_word(bus, RESET_VECTOR);
        self.reset_to(entry);
    }

    /// Reset with an explicit entry point.
    pub fn reset_to(&mut self, entry: u16) {
        self.regs = Registers::power_on();
        self.regs.pc = entry;
        self.irq_line = false;
        self.nmi_pending = false;
        log::debug!("cpu reset, pc=${entry:04X}");
    }

    #[must_use]
    pub fn pc(&self) -> u16 {
        self.regs.pc
    }

    /// Cycles consumed since construction.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Drive the IRQ input. Level-triggered: an asserted line is serviced at
    /// every boundary where I is clear.
    pub fn set_irq(&mut self, asserted: bool) {
        self.irq_line = asserted;
    }

    /// Latch an NMI edge for the next boundary.
    pub fn trigger_nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Whether the next step will enter an interrupt handler instead of
    /// executing the opcode at PC.
    #[must_use]
    pub fn interrupt_pending(&self) -> bool {
        self.nmi_pending || (self.irq_line && !self.regs.p.is_set(I))
    }

    /// Execute one instruction, or enter a pending interrupt handler.
    ///
    /// # Errors
    ///
    /// [`CpuError::UnhandledOpcode`] if the byte at PC has no decode entry.
    /// PC still points at it, so stepping again fails the same way.
    pub fn step(&mut self, bus: &mut (impl Bus + ?Sized)) -> Result<InstructionResult, CpuError> {
        if self.nmi_pending {
            self.nmi_pending = false;
            return Ok(self.enter_interrupt(bus, NMI_VECTOR, StepKind::Nmi));
        }
        if self.irq_line && !self.regs.p.is_set(I) {
            return Ok(self.enter_interrupt(bus, IRQ_VECTOR, StepKind::Irq));
        }

        let pc = self.regs.pc;
        let byte = bus.read(pc);
        let Some(op) = decode(byte) else {
            log::warn!("unhandled opcode ${byte:02X} at ${pc:04X}");
            return Err(CpuError::UnhandledOpcode { opcode: byte, pc });
        };
        self.regs.pc = pc.wrapping_add(1);

        let operand = self.resolve(bus, op.mode);
        let mut cycles = u32::from(op.cycles);
        if op.page_penalty && matches!(operand, Operand::Memory { page_crossed: true, .. }) {
            cycles += 1;
        }
        cycles += self.execute(bus, op.mnemonic, operand);
        self.cycles += u64::from(cycles);

        log::trace!(
            "${pc:04X} {} {:?} a={:02X} x={:02X} y={:02X} sp={:02X} p={}",
            op.mnemonic,
            op.mode,
            self.regs.a,
            self.regs.x,
            self.regs.y,
            self.regs.sp,
            self.regs.p
        );
        Ok(InstructionResult {
            pc,
            kind: StepKind::Instruction(*op),
            cycles,
        })
    }

    fn enter_interrupt(
        &mut self,
        bus: &mut (impl Bus + ?Sized),
        vector: u16,
        kind: StepKind,
    ) -> InstructionResult {
        let pc = self.regs.pc;
        self.push_word(bus, pc);
        self.push(bus, self.regs.p.to_pushed(false));
        self.regs.p.set_if(I, true);
        self.regs.pc = Self::read_word(bus, vector);
        self.cycles += u64::from(INTERRUPT_CYCLES);
        log::trace!("{kind:?} from ${pc:04X} to ${:04X}", self.regs.pc);
        InstructionResult {
            pc,
            kind,
            cycles: INTERRUPT_CYCLES,
        }
    }

    fn load(&self, bus: &mut (impl Bus + ?Sized), operand: Operand) -> u8 {
        match operand {
            Operand::Immediate(value) => value,
            Operand::Memory { address, .. } => bus.read(address),
            Operand::Accumulator | Operand::None | Operand::Branch { .. } => self.regs.a,
        }
    }

    fn store(bus: &mut (impl Bus + ?Sized), operand: Operand, value: u8) {
        if let Operand::Memory { address, .. } = operand {
            bus.write(address, value);
        }
    }

    /// Read-modify-write on A or memory.
    fn modify(
        &mut self,
        bus: &mut (impl Bus + ?Sized),
        operand: Operand,
        f: impl FnOnce(&mut Status, u8) -> u8,
    ) {
        let value = self.load(bus, operand);
        let result = f(&mut self.regs.p, value);
        self.regs.p.set_nz(result);
        if operand == Operand::Accumulator {
            self.regs.a = result;
        } else {
            Self::store(bus, operand, result);
        }
    }

    /// Take the branch if `condition`. Returns the extra cycles.
    fn branch(&mut self, operand: Operand, condition: bool) -> u32 {
        let Operand::Branch {
            target,
            page_crossed,
        } = operand
        else {
            return 0;
        };
        if !condition {
            return 0;
        }
        self.regs.pc = target;
        1 + u32::from(page_crossed)
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.regs.p.set_if(C, register >= value);
        self.regs.p.set_nz(register.wrapping_sub(value));
    }

    fn adc(&mut self, value: u8) {
        if self.regs.p.is_set(D) {
            self.adc_decimal(value);
        } else {
            self.adc_binary(value);
        }
    }

    fn adc_binary(&mut self, value: u8) {
        let a = self.regs.a;
        let sum = u16::from(a) + u16::from(value) + u16::from(self.regs.p.is_set(C));
        let [result, carry] = sum.to_le_bytes();
        self.regs.p.set_if(C, carry != 0);
        self.regs.p.set_if(V, (a ^ result) & (value ^ result) & 0x80 != 0);
        self.regs.p.set_nz(result);
        self.regs.a = result;
    }

    /// NMOS decimal add: Z from the binary sum, N and V from the
    /// intermediate high digit.
    fn adc_decimal(&mut self, value: u8) {
        let a = self.regs.a;
        let carry_in = u8::from(self.regs.p.is_set(C));

        let mut lo = (a & 0x0F) + (value & 0x0F) + carry_in;
        if lo > 9 {
            lo += 6;
        }
        let mut hi = (a >> 4) + (value >> 4) + u8::from(lo > 0x0F);

        let binary = a.wrapping_add(value).wrapping_add(carry_in);
        let intermediate = (hi << 4) | (lo & 0x0F);
        self.regs.p.set_if(Z, binary == 0);
        self.regs.p.set_if(N, intermediate & 0x80 != 0);
        self.regs.p.set_if(
            V,
            (a ^ value) & 0x80 == 0 && (a ^ intermediate) & 0x80 != 0,
        );

        if hi > 9 {
            hi += 6;
        }
        self.regs.p.set_if(C, hi > 0x0F);
        self.regs.a = (hi << 4) | (lo & 0x0F);
    }

    fn sbc(&mut self, value: u8) {
        let a = self.regs.a;
        let borrow = i16::from(!self.regs.p.is_set(C));
        // Flags follow the binary subtraction, decimal or not
        self.adc_binary(!value);
        if !self.regs.p.is_set(D) {
            return;
        }
        let mut lo = i16::from(a & 0x0F) - i16::from(value & 0x0F) - borrow;
        let mut hi = i16::from(a >> 4) - i16::from(value >> 4);
        if lo < 0 {
            lo -= 6;
            hi -= 1;
        }
        if hi < 0 {
            hi -= 6;
        }
        let result = (((hi << 4) & 0xF0) | (lo & 0x0F)) as u8;
        self.regs.a = result;
    }

    fn execute(&mut self, bus: &mut (impl Bus + ?Sized), mnemonic: Mnemonic, operand: Operand) -> u32 {
        let p = self.regs.p;
        match mnemonic {
            Mnemonic::Lda => {
                self.regs.a = self.load(bus, operand);
                self.regs.p.set_nz(self.regs.a);
            }
            Mnemonic::Ldx => {
                self.regs.x = self.load(bus, operand);
                self.regs.p.set_nz(self.regs.x);
            }
            Mnemonic::Ldy => {
                self.regs.y = self.load(bus, operand);
                self.regs.p.set_nz(self.regs.y);
            }
            Mnemonic::Sta => Self::store(bus, operand, self.regs.a),
            Mnemonic::Stx => Self::store(bus, operand, self.regs.x),
            Mnemonic::Sty => Self::store(bus, operand, self.regs.y),

            Mnemonic::Adc => {
                let value = self.load(bus, operand);
                self.adc(value);
            }
            Mnemonic::Sbc => {
                let value = self.load(bus, operand);
                self.sbc(value);
            }
            Mnemonic::And => {
                self.regs.a &= self.load(bus, operand);
                self.regs.p.set_nz(self.regs.a);
            }
            Mnemonic::Ora => {
                self.regs.a |= self.load(bus, operand);
                self.regs.p.set_nz(self.regs.a);
            }
            Mnemonic::Eor => {
                self.regs.a ^= self.load(bus, operand);
                self.regs.p.set_nz(self.regs.a);
            }
            Mnemonic::Cmp => {
                let value = self.load(bus, operand);
                self.compare(self.regs.a, value);
            }
            Mnemonic::Cpx => {
                let value = self.load(bus, operand);
                self.compare(self.regs.x, value);
            }
            Mnemonic::Cpy => {
                let value = self.load(bus, operand);
                self.compare(self.regs.y, value);
            }
            Mnemonic::Bit => {
                let value = self.load(bus, operand);
                self.regs.p.set_if(Z, self.regs.a & value == 0);
                self.regs.p.set_if(N, value & 0x80 != 0);
                self.regs.p.set_if(V, value & 0x40 != 0);
            }

            Mnemonic::Asl => self.modify(bus, operand, |p, v| {
                p.set_if(C, v & 0x80 != 0);
                v << 1
            }),
            Mnemonic::Lsr => self.modify(bus, operand, |p, v| {
                p.set_if(C, v & 0x01 != 0);
                v >> 1
            }),
            Mnemonic::Rol => self.modify(bus, operand, |p, v| {
                let carry_in = u8::from(p.is_set(C));
                p.set_if(C, v & 0x80 != 0);
                (v << 1) | carry_in
            }),
            Mnemonic::Ror => self.modify(bus, operand, |p, v| {
                let carry_in = u8::from(p.is_set(C)) << 7;
                p.set_if(C, v & 0x01 != 0);
                (v >> 1) | carry_in
            }),
            Mnemonic::Inc => self.modify(bus, operand, |_, v| v.wrapping_add(1)),
            Mnemonic::Dec => self.modify(bus, operand, |_, v| v.wrapping_sub(1)),
            Mnemonic::Inx => {
                self.regs.x = self.regs.x.wrapping_add(1);
                self.regs.p.set_nz(self.regs.x);
            }
            Mnemonic::Iny => {
                self.regs.y = self.regs.y.wrapping_add(1);
                self.regs.p.set_nz(self.regs.y);
            }
            Mnemonic::Dex => {
                self.regs.x = self.regs.x.wrapping_sub(1);
                self.regs.p.set_nz(self.regs.x);
            }
            Mnemonic::Dey => {
                self.regs.y = self.regs.y.wrapping_sub(1);
                self.regs.p.set_nz(self.regs.y);
            }

            Mnemonic::Tax => {
                self.regs.x = self.regs.a;
                self.regs.p.set_nz(self.regs.x);
            }
            Mnemonic::Tay => {
                self.regs.y = self.regs.a;
                self.regs.p.set_nz(self.regs.y);
            }
            Mnemonic::Txa => {
                self.regs.a = self.regs.x;
                self.regs.p.set_nz(self.regs.a);
            }
            Mnemonic::Tya => {
                self.regs.a = self.regs.y;
                self.regs.p.set_nz(self.regs.a);
            }
            Mnemonic::Tsx => {
                self.regs.x = self.regs.sp;
                self.regs.p.set_nz(self.regs.x);
            }
            Mnemonic::Txs => self.regs.sp = self.regs.x,

            Mnemonic::Pha => self.push(bus, self.regs.a),
            Mnemonic::Php => self.push(bus, p.to_pushed(true)),
            Mnemonic::Pla => {
                self.regs.a = self.pull(bus);
                self.regs.p.set_nz(self.regs.a);
            }
            Mnemonic::Plp => {
                let value = self.pull(bus);
                self.regs.p = Status::from_pulled(value);
            }

            Mnemonic::Bcc => return self.branch(operand, !p.is_set(C)),
            Mnemonic::Bcs => return self.branch(operand, p.is_set(C)),
            Mnemonic::Bne => return self.branch(operand, !p.is_set(Z)),
            Mnemonic::Beq => return self.branch(operand, p.is_set(Z)),
            Mnemonic::Bpl => return self.branch(operand, !p.is_set(N)),
            Mnemonic::Bmi => return self.branch(operand, p.is_set(N)),
            Mnemonic::Bvc => return self.branch(operand, !p.is_set(V)),
            Mnemonic::Bvs => return self.branch(operand, p.is_set(V)),

            Mnemonic::Jmp => {
                if let Operand::Memory { address, .. } = operand {
                    self.regs.pc = address;
                }
            }
            Mnemonic::Jsr => {
                if let Operand::Memory { address, .. } = operand {
                    let ret = self.regs.pc.wrapping_sub(1);
                    self.push_word(bus, ret);
                    self.regs.pc = address;
                }
            }
            Mnemonic::Rts => self.regs.pc = self.pull_word(bus).wrapping_add(1),
            Mnemonic::Rti => {
                let value = self.pull(bus);
                self.regs.p = Status::from_pulled(value);
                self.regs.pc = self.pull_word(bus);
            }
            Mnemonic::Brk => {
                // Return address skips the padding byte
                let ret = self.regs.pc.wrapping_add(1);
                self.push_word(bus, ret);
                self.push(bus, p.to_pushed(true));
                self.regs.p.set_if(I, true);
                self.regs.pc = Self::read_word(bus, IRQ_VECTOR);
            }

            Mnemonic::Clc => self.regs.p.set_if(C, false),
            Mnemonic::Sec => self.regs.p.set_if(C, true),
            Mnemonic::Cli => self.regs.p.set_if(I, false),
            Mnemonic::Sei => self.regs.p.set_if(I, true),
            Mnemonic::Cld => self.regs.p.set_if(D, false),
            Mnemonic::Sed => self.regs.p.set_if(D, true),
            Mnemonic::Clv => self.regs.p.set_if(V, false),
            Mnemonic::Nop => {}
        }
        0
    }
}

const QUERY_PATHS: &[&str] = &[
    "pc", "a", "x", "y", "sp", "p", "cycles", "irq", "nmi", "flags.n", "flags.v", "flags.b",
    "flags.d", "flags.i", "flags.z", "flags.c",
];

impl Observable for Mos6502 {
    fn query(&self, path: &str) -> Option<Value> {
        let value = match path {
            "pc" => self.regs.pc.into(),
            "a" => self.regs.a.into(),
            "x" => self.regs.x.into(),
            "y" => self.regs.y.into(),
            "sp" => self.regs.sp.into(),
            "p" => self.regs.p.0.into(),
            "cycles" => self.cycles.into(),
            "irq" => self.irq_line.into(),
            "nmi" => self.nmi_pending.into(),
            _ => {
                let flag = Status::flag_by_name(path.strip_prefix("flags.")?)?;
                self.regs.p.is_set(flag).into()
            }
        };
        Some(value)
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
