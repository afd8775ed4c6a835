//! MOS 6526 Complex Interface Adapter.
//!
//! Two interval timers, the interrupt control register and two 8-bit I/O
//! ports. Timers count the cycles reported by the peripheral synchroniser
//! rather than ticking themselves. Which CPU line the chip drives is fixed
//! at construction: on the C64, CIA1 pulls IRQ and CIA2 pulls NMI.
//!
//! | Reg | Read                 | Write                 |
//! |-----|----------------------|-----------------------|
//! | $0  | Port A               | Port A                |
//! | $1  | Port B               | Port B                |
//! | $2  | DDR A                | DDR A                 |
//! | $3  | DDR B                | DDR B                 |
//! | $4  | Timer A counter lo   | Timer A latch lo      |
//! | $5  | Timer A counter hi   | Timer A latch hi      |
//! | $6  | Timer B counter lo   | Timer B latch lo      |
//! | $7  | Timer B counter hi   | Timer B latch hi      |
//! | $8-$C | TOD, serial: read 0 | ignored              |
//! | $D  | ICR status, clears   | ICR mask set/clear    |
//! | $E  | CRA                  | CRA                   |
//! | $F  | CRB                  | CRB                   |

mod timer;

use emu_core::{InterruptSource, Observable, Peripheral, SyncContext, Value};

pub use timer::{CR_FORCE_LOAD, CR_ONE_SHOT, CR_START, Timer};

/// ICR source bits.
pub const ICR_TIMER_A: u8 = 0x01;
pub const ICR_TIMER_B: u8 = 0x02;
/// Set in an ICR read when any source is latched, enabled or not.
pub const ICR_ANY: u8 = 0x80;
/// Set in an ICR write to enable the named sources; clear to disable them.
pub const ICR_SET: u8 = 0x80;
const ICR_SOURCES: u8 = 0x1F;

/// CRB bits 5-6: what Timer B counts.
const CRB_INPUT_MASK: u8 = 0x60;
const CRB_INPUT_CNT: u8 = 0x20;

/// One I/O port: output latch, direction register and the levels external
/// hardware drives onto the pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    pub output: u8,
    /// 1 = output.
    pub ddr: u8,
    pub input: u8,
}

impl Default for Port {
    fn default() -> Self {
        Self {
            output: 0,
            ddr: 0,
            input: 0xFF,
        }
    }
}

impl Port {
    /// Pin levels: outputs drive their latch, inputs read the external level.
    #[must_use]
    pub fn value(&self) -> u8 {
        (self.output & self.ddr) | (self.input & !self.ddr)
    }

    /// What the chip drives; undriven pins float high.
    #[must_use]
    pub fn driven(&self) -> u8 {
        (self.output & self.ddr) | !self.ddr
    }
}

/// CIA instance.
#[derive(Debug, Clone)]
pub struct Cia {
    name: &'static str,
    pub port_a: Port,
    pub port_b: Port,
    timer_a: Timer,
    timer_b: Timer,
    icr_status: u8,
    icr_mask: u8,
    interrupt: InterruptSource,
}

impl Cia {
    #[must_use]
    pub fn new(name: &'static str, interrupt: InterruptSource) -> Self {
        Self {
            name,
            port_a: Port::default(),
            port_b: Port::default(),
            timer_a: Timer::default(),
            timer_b: Timer::default(),
            icr_status: 0,
            icr_mask: 0,
            interrupt,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn interrupt_source(&self) -> InterruptSource {
        self.interrupt
    }

    #[must_use]
    pub fn timer_a(&self) -> &Timer {
        &self.timer_a
    }

    #[must_use]
    pub fn timer_b(&self) -> &Timer {
        &self.timer_b
    }

    #[must_use]
    pub fn icr_status(&self) -> u8 {
        self.icr_status
    }

    #[must_use]
    pub fn icr_mask(&self) -> u8 {
        self.icr_mask
    }

    /// An enabled source is pending.
    #[must_use]
    pub fn irq_active(&self) -> bool {
        self.icr_status & self.icr_mask & ICR_SOURCES != 0
    }

    /// Advance both timers by `cycles`. Returns whether the chip is
    /// asserting its interrupt line afterwards.
    pub fn tick(&mut self, cycles: u32) -> bool {
        let a_underflows = self.timer_a.count(cycles);
        if a_underflows > 0 {
            self.icr_status |= ICR_TIMER_A;
        }

        let b_ticks = match self.timer_b.control() & CRB_INPUT_MASK {
            0 => cycles,
            CRB_INPUT_CNT => 0,
            // Timer A underflows, with CNT treated as always high
            _ => a_underflows,
        };
        if self.timer_b.count(b_ticks) > 0 {
            self.icr_status |= ICR_TIMER_B;
        }

        let active = self.irq_active();
        if active {
            log::trace!("{}: interrupt pending, icr={:02X}", self.name, self.icr_status);
        }
        active
    }

    /// Register read as seen by the CPU. Reading ICR acknowledges it.
    pub fn read(&mut self, reg: u8) -> u8 {
        let value = self.peek(reg);
        if reg & 0x0F == 0x0D {
            self.icr_status = 0;
        }
        value
    }

    /// Register read without side effects.
    #[must_use]
    pub fn peek(&self, reg: u8) -> u8 {
        let [a_lo, a_hi] = self.timer_a.counter().to_le_bytes();
        let [b_lo, b_hi] = self.timer_b.counter().to_le_bytes();
        match reg & 0x0F {
            0x00 => self.port_a.value(),
            0x01 => self.port_b.value(),
            0x02 => self.port_a.ddr,
            0x03 => self.port_b.ddr,
            0x04 => a_lo,
            0x05 => a_hi,
            0x06 => b_lo,
            0x07 => b_hi,
            0x0D => {
                let any = if self.icr_status & ICR_SOURCES != 0 {
                    ICR_ANY
                } else {
                    0
                };
                self.icr_status | any
            }
            0x0E => self.timer_a.control(),
            0x0F => self.timer_b.control(),
            _ => 0,
        }
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 0x0F {
            0x00 => self.port_a.output = value,
            0x01 => self.port_b.output = value,
            0x02 => self.port_a.ddr = value,
            0x03 => self.port_b.ddr = value,
            0x04 => self.timer_a.write_latch_lo(value),
            0x05 => self.timer_a.write_latch_hi(value),
            0x06 => self.timer_b.write_latch_lo(value),
            0x07 => self.timer_b.write_latch_hi(value),
            0x0D => {
                if value & ICR_SET != 0 {
                    self.icr_mask |= value & ICR_SOURCES;
                } else {
                    self.icr_mask &= !(value & ICR_SOURCES);
                }
            }
            0x0E => self.timer_a.write_control(value),
            0x0F => self.timer_b.write_control(value),
            _ => {}
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.name, self.interrupt);
    }
}

impl Peripheral for Cia {
    fn on_after_instruction(&mut self, cycles: u32, ctx: &mut SyncContext<'_>) {
        let active = self.tick(cycles);
        ctx.interrupts.set(self.interrupt, active);
    }

    fn on_end_frame(&mut self, _ctx: &mut SyncContext<'_>) {}
}

const QUERY_PATHS: &[&str] = &[
    "timer_a.counter",
    "timer_a.latch",
    "timer_a.running",
    "timer_b.counter",
    "timer_b.latch",
    "timer_b.running",
    "icr.status",
    "icr.mask",
    "port_a",
    "port_b",
];

impl Observable for Cia {
    fn query(&self, path: &str) -> Option<Value> {
        let (timer, field) = match path.split_once('.') {
            Some(("timer_a", field)) => (&self.timer_a, field),
            Some(("timer_b", field)) => (&self.timer_b, field),
            _ => {
                return match path {
                    "icr.status" => Some(self.icr_status.into()),
                    "icr.mask" => Some(self.icr_mask.into()),
                    "port_a" => Some(self.port_a.value().into()),
                    "port_b" => Some(self.port_b.value().into()),
                    _ => None,
                };
            }
        };
        match field {
            "counter" => Some(timer.counter().into()),
            "latch" => Some(timer.latch().into()),
            "running" => Some(timer.running().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
