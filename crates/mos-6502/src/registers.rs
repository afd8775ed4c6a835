//! Programmer-visible registers.

use crate::flags::Status;

/// Base of the hardware stack page.
pub const STACK_PAGE: u16 = 0x0100;

/// A, X, Y, S, PC and P.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    /// Stack pointer: low byte of the next free slot in page one.
    pub sp: u8,
    pub pc: u16,
    pub p: Status,
}

impl Default for Registers {
    fn default() -> Self {
        Self::power_on()
    }
}

impl Registers {
    /// Register contents after reset, before the vector is fetched. The
    /// hardware leaves A/X/Y undefined; they are zeroed here.
    #[must_use]
    pub const fn power_on() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            pc: 0,
            p: Status::power_on(),
        }
    }

    /// Address for the next push; moves SP down.
    pub fn push_slot(&mut self) -> u16 {
        let slot = STACK_PAGE | u16::from(self.sp);
        self.sp = self.sp.wrapping_sub(1);
        slot
    }

    /// Address of the byte to pull; moves SP up.
    pub fn pull_slot(&mut self) -> u16 {
        self.sp = self.sp.wrapping_add(1);
        STACK_PAGE | u16::from(self.sp)
    }
}
