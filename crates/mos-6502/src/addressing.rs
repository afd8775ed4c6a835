//! Operand resolution.
//!
//! Each mode consumes its operand bytes at PC and produces either a value,
//! an effective address or a branch target. No dummy reads are issued: a
//! hooked register must only ever see the access the instruction performs.

use emu_core::Bus;

use crate::Mos6502;
use crate::opcodes::AddressingMode;

/// A resolved operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operand {
    None,
    Accumulator,
    Immediate(u8),
    Memory { address: u16, page_crossed: bool },
    /// Target of a relative branch, measured from the following instruction.
    Branch { target: u16, page_crossed: bool },
}

const fn crosses_page(from: u16, to: u16) -> bool {
    from & 0xFF00 != to & 0xFF00
}

impl Mos6502 {
    pub(crate) fn fetch(&mut self, bus: &mut (impl Bus + ?Sized)) -> u8 {
        let value = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    pub(crate) fn fetch_word(&mut self, bus: &mut (impl Bus + ?Sized)) -> u16 {
        let lo = self.fetch(bus);
        let hi = self.fetch(bus);
        u16::from_le_bytes([lo, hi])
    }

    pub(crate) fn read_word(bus: &mut (impl Bus + ?Sized), address: u16) -> u16 {
        let lo = bus.read(address);
        let hi = bus.read(address.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Pointer fetch that stays within one page: `$xxFF` takes its high byte
    /// from `$xx00`. Covers zero-page pointers and `JMP ($xxFF)`.
    fn read_word_in_page(bus: &mut (impl Bus + ?Sized), address: u16) -> u16 {
        let lo = bus.read(address);
        let hi = bus.read((address & 0xFF00) | (address.wrapping_add(1) & 0x00FF));
        u16::from_le_bytes([lo, hi])
    }

    pub(crate) fn push(&mut self, bus: &mut (impl Bus + ?Sized), value: u8) {
        let slot = self.regs.push_slot();
        bus.write(slot, value);
    }

    pub(crate) fn pull(&mut self, bus: &mut (impl Bus + ?Sized)) -> u8 {
        let slot = self.regs.pull_slot();
        bus.read(slot)
    }

    pub(crate) fn push_word(&mut self, bus: &mut (impl Bus + ?Sized), value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.push(bus, hi);
        self.push(bus, lo);
    }

    pub(crate) fn pull_word(&mut self, bus: &mut (impl Bus + ?Sized)) -> u16 {
        let lo = self.pull(bus);
        let hi = self.pull(bus);
        u16::from_le_bytes([lo, hi])
    }

    fn indexed(base: u16, index: u8) -> Operand {
        let address = base.wrapping_add(u16::from(index));
        Operand::Memory {
            address,
            page_crossed: crosses_page(base, address),
        }
    }

    /// Consume the operand bytes for `mode`, leaving PC at the next
    /// instruction.
    pub(crate) fn resolve(&mut self, bus: &mut (impl Bus + ?Sized), mode: AddressingMode) -> Operand {
        let direct = |address: u16| Operand::Memory {
            address,
            page_crossed: false,
        };
        match mode {
            AddressingMode::Implied => Operand::None,
            AddressingMode::Accumulator => Operand::Accumulator,
            AddressingMode::Immediate => Operand::Immediate(self.fetch(bus)),
            AddressingMode::ZeroPage => direct(u16::from(self.fetch(bus))),
            AddressingMode::ZeroPageX => {
                direct(u16::from(self.fetch(bus).wrapping_add(self.regs.x)))
            }
            AddressingMode::ZeroPageY => {
                direct(u16::from(self.fetch(bus).wrapping_add(self.regs.y)))
            }
            AddressingMode::Absolute => direct(self.fetch_word(bus)),
            AddressingMode::AbsoluteX => {
                let base = self.fetch_word(bus);
                Self::indexed(base, self.regs.x)
            }
            AddressingMode::AbsoluteY => {
                let base = self.fetch_word(bus);
                Self::indexed(base, self.regs.y)
            }
            AddressingMode::Indirect => {
                let pointer = self.fetch_word(bus);
                direct(Self::read_word_in_page(bus, pointer))
            }
            AddressingMode::IndirectX => {
                let pointer = self.fetch(bus).wrapping_add(self.regs.x);
                direct(Self::read_word_in_page(bus, u16::from(pointer)))
            }
            AddressingMode::IndirectY => {
                let pointer = self.fetch(bus);
                let base = Self::read_word_in_page(bus, u16::from(pointer));
                Self::indexed(base, self.regs.y)
            }
            AddressingMode::Relative => {
                let offset = self.fetch(bus) as i8;
                let next = self.regs.pc;
                let target = next.wrapping_add(i16::from(offset) as u16);
                Operand::Branch {
                    target,
                    page_crossed: crosses_page(next, target),
                }
            }
        }
    }
}
