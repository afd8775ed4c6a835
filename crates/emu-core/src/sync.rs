//! Peripheral synchronisation.
//!
//! Chips never count cycles against a frame themselves. After every CPU
//! instruction the [`Synchronizer`] forwards the cycles just consumed to each
//! attached peripheral, and once a frame's worth of cycles has accumulated it
//! calls every peripheral's end-of-frame hook.

use std::cell::RefCell;
use std::rc::Rc;

use crate::Bus;

/// CPU interrupt input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptLine {
    /// Maskable, level-triggered.
    Irq,
    /// Non-maskable, edge-triggered.
    Nmi,
}

/// A chip's connection to one interrupt line. `mask` identifies the chip
/// among the other sources wired to the same line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptSource {
    pub line: InterruptLine,
    pub mask: u8,
}

impl InterruptSource {
    #[must_use]
    pub const fn irq(mask: u8) -> Self {
        Self {
            line: InterruptLine::Irq,
            mask,
        }
    }

    #[must_use]
    pub const fn nmi(mask: u8) -> Self {
        Self {
            line: InterruptLine::Nmi,
            mask,
        }
    }
}

/// Open-collector interrupt lines. Each source pulls or releases its own bit;
/// the line is asserted while any source pulls it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptLines {
    irq_sources: u8,
    nmi_sources: u8,
    nmi_edge: bool,
}

impl InterruptLines {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            irq_sources: 0,
            nmi_sources: 0,
            nmi_edge: false,
        }
    }

    /// Pull (`active`) or release a source's line.
    pub fn set(&mut self, source: InterruptSource, active: bool) {
        match source.line {
            InterruptLine::Irq => {
                if active {
                    self.irq_sources |= source.mask;
                } else {
                    self.irq_sources &= !source.mask;
                }
            }
            InterruptLine::Nmi => {
                let was_low = self.nmi_sources != 0;
                if active {
                    self.nmi_sources |= source.mask;
                } else {
                    self.nmi_sources &= !source.mask;
                }
                if !was_low && self.nmi_sources != 0 {
                    self.nmi_edge = true;
                }
            }
        }
    }

    /// IRQ line level.
    #[must_use]
    pub fn irq(&self) -> bool {
        self.irq_sources != 0
    }

    /// Consume a pending NMI edge.
    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_edge)
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

/// What a peripheral sees while being synchronised.
pub struct SyncContext<'a> {
    pub bus: &'a mut dyn Bus,
    pub interrupts: &'a mut InterruptLines,
}

/// A chip advanced in lock-step with the CPU.
pub trait Peripheral {
    /// Called after every CPU instruction with the cycles it consumed.
    fn on_after_instruction(&mut self, cycles: u32, ctx: &mut SyncContext<'_>);

    /// Called once per frame, after the instruction that completed it.
    fn on_end_frame(&mut self, ctx: &mut SyncContext<'_>);
}

/// Running cycle count within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSync {
    cycles_per_frame: u32,
    cycles_in_frame: u32,
    frames: u64,
}

impl FrameSync {
    #[must_use]
    pub const fn new(cycles_per_frame: u32) -> Self {
        Self {
            cycles_per_frame,
            cycles_in_frame: 0,
            frames: 0,
        }
    }

    /// Account for `cycles`. Returns true when the frame boundary was
    /// reached; the overshoot carries into the next frame.
    pub fn add_cycles(&mut self, cycles: u32) -> bool {
        self.cycles_in_frame += cycles;
        if self.cycles_in_frame >= self.cycles_per_frame {
            self.cycles_in_frame -= self.cycles_per_frame;
            self.frames += 1;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub const fn cycles_per_frame(&self) -> u32 {
        self.cycles_per_frame
    }

    #[must_use]
    pub const fn cycles_in_frame(&self) -> u32 {
        self.cycles_in_frame
    }

    #[must_use]
    pub const fn cycles_until_frame_end(&self) -> u32 {
        self.cycles_per_frame - self.cycles_in_frame
    }

    /// Completed frames.
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    pub fn reset(&mut self) {
        self.cycles_in_frame = 0;
    }
}

/// Fans the CPU's "cycles consumed" notification out to the peripherals.
pub struct Synchronizer {
    peripherals: Vec<Rc<RefCell<dyn Peripheral>>>,
    frame: FrameSync,
}

impl Synchronizer {
    #[must_use]
    pub fn new(cycles_per_frame: u32) -> Self {
        Self {
            peripherals: Vec::new(),
            frame: FrameSync::new(cycles_per_frame),
        }
    }

    /// Attach a peripheral. Peripherals are notified in attach order.
    pub fn attach(&mut self, peripheral: Rc<RefCell<dyn Peripheral>>) {
        self.peripherals.push(peripheral);
    }

    /// Forward one instruction's cycles. Returns true if this instruction
    /// completed a frame, in which case every `on_end_frame` has run.
    pub fn after_instruction(&mut self, cycles: u32, ctx: &mut SyncContext<'_>) -> bool {
        for peripheral in &self.peripherals {
            peripheral.borrow_mut().on_after_instruction(cycles, ctx);
        }
        if !self.frame.add_cycles(cycles) {
            return false;
        }
        log::trace!("frame {} complete", self.frame.frames());
        for peripheral in &self.peripherals {
            peripheral.borrow_mut().on_end_frame(ctx);
        }
        true
    }

    #[must_use]
    pub fn frame(&self) -> &FrameSync {
        &self.frame
    }

    pub fn reset_frame(&mut self) {
        self.frame.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Memory;

    struct Counter {
        cycles: u64,
        frames: u32,
        source: InterruptSource,
    }

    impl Peripheral for Counter {
        fn on_after_instruction(&mut self, cycles: u32, ctx: &mut SyncContext<'_>) {
            self.cycles += u64::from(cycles);
            ctx.interrupts.set(self.source, self.cycles >= 10);
        }

        fn on_end_frame(&mut self, _ctx: &mut SyncContext<'_>) {
            self.frames += 1;
        }
    }

    #[test]
    fn end_frame_fires_once_per_frame_of_cycles() {
        let counter = Rc::new(RefCell::new(Counter {
            cycles: 0,
            frames: 0,
            source: InterruptSource::irq(0x01),
        }));
        let mut sync = Synchronizer::new(100);
        sync.attach(counter.clone());

        let mut memory = Memory::new();
        let mut interrupts = InterruptLines::new();
        let mut ctx = SyncContext {
            bus: &mut memory,
            interrupts: &mut interrupts,
        };

        let mut boundaries = 0;
        // 7-cycle instructions: boundaries land at 105 and 203
        for _ in 0..30 {
            if sync.after_instruction(7, &mut ctx) {
                boundaries += 1;
            }
        }
        assert_eq!(boundaries, 2);
        assert_eq!(counter.borrow().frames, 2);
        assert_eq!(counter.borrow().cycles, 210);
        assert_eq!(sync.frame().cycles_in_frame(), 10);
        assert!(ctx.interrupts.irq());
    }

    #[test]
    fn irq_is_wired_or_of_sources() {
        let mut lines = InterruptLines::new();
        let a = InterruptSource::irq(0x01);
        let b = InterruptSource::irq(0x02);
        lines.set(a, true);
        lines.set(b, true);
        lines.set(a, false);
        assert!(lines.irq());
        lines.set(b, false);
        assert!(!lines.irq());
    }

    #[test]
    fn nmi_latches_only_on_edge() {
        let mut lines = InterruptLines::new();
        let cia = InterruptSource::nmi(0x01);
        lines.set(cia, true);
        assert!(lines.take_nmi());
        // Still held: no new edge
        lines.set(cia, true);
        assert!(!lines.take_nmi());
        lines.set(cia, false);
        lines.set(cia, true);
        assert!(lines.take_nmi());
    }
}
