//! Processor status register.

/// Carry.
pub const C: u8 = 0x01;
/// Zero.
pub const Z: u8 = 0x02;
/// IRQ disable.
pub const I: u8 = 0x04;
/// Decimal mode.
pub const D: u8 = 0x08;
/// Break. Only exists in the copy pushed to the stack.
pub const B: u8 = 0x10;
/// Unused, always reads as 1.
pub const U: u8 = 0x20;
/// Overflow.
pub const V: u8 = 0x40;
/// Negative.
pub const N: u8 = 0x80;

const NAMES: [(u8, char); 8] = [
    (N, 'N'),
    (V, 'V'),
    (U, '-'),
    (B, 'B'),
    (D, 'D'),
    (I, 'I'),
    (Z, 'Z'),
    (C, 'C'),
];

/// The P register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u8);

impl Default for Status {
    fn default() -> Self {
        Self::power_on()
    }
}

impl Status {
    /// State after reset: interrupts disabled.
    #[must_use]
    pub const fn power_on() -> Self {
        Self(U | I)
    }

    /// Status restored by PLP or RTI. B does not exist in the register.
    #[must_use]
    pub const fn from_pulled(value: u8) -> Self {
        Self((value | U) & !B)
    }

    /// Byte pushed by PHP/BRK (`brk = true`) or by an IRQ/NMI entry.
    #[must_use]
    pub const fn to_pushed(self, brk: bool) -> u8 {
        if brk { self.0 | U | B } else { (self.0 | U) & !B }
    }

    #[must_use]
    pub const fn is_set(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn set_if(&mut self, flag: u8, condition: bool) {
        if condition {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    /// N from bit 7, Z from zero.
    pub fn set_nz(&mut self, value: u8) {
        self.set_if(N, value & 0x80 != 0);
        self.set_if(Z, value == 0);
    }

    /// Look a flag up by its letter, case-insensitive.
    #[must_use]
    pub fn flag_by_name(name: &str) -> Option<u8> {
        let mut chars = name.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        if chars.next().is_some() || letter == '-' {
            return None;
        }
        NAMES.iter().find(|&&(_, c)| c == letter).map(|&(f, _)| f)
    }
}

impl std::fmt::Display for Status {
    /// `NV-BDIZC` with clear flags shown in lower case.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &(flag, name) in &NAMES {
            let c = if self.is_set(flag) {
                name
            } else {
                name.to_ascii_lowercase()
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
