//! Shadow copies of the write-only SID registers.
//!
//! The CPU can never read back what it wrote, so the chip keeps its own
//! copy of every register plus a flag recording whether the value changed
//! since the last end-of-frame check.

/// Writable registers, `$00`-`$18`.
pub const REGISTER_COUNT: usize = 0x19;

/// Registers per voice.
pub const VOICE_STRIDE: u8 = 7;

pub const FREQ_LO: u8 = 0x00;
pub const FREQ_HI: u8 = 0x01;
pub const PW_LO: u8 = 0x02;
pub const PW_HI: u8 = 0x03;
pub const CONTROL: u8 = 0x04;
pub const ATTACK_DECAY: u8 = 0x05;
pub const SUSTAIN_RELEASE: u8 = 0x06;
/// Master volume (low nibble) and filter mode.
pub const MODE_VOLUME: u8 = 0x18;

/// Control register bits.
pub const GATE: u8 = 0x01;
pub const RING_MOD: u8 = 0x04;
pub const TEST: u8 = 0x08;
pub const WAVEFORM_MASK: u8 = 0xF0;

/// Every write to these counts as a change, equal value or not: a gate
/// re-write is an edge the chip must act on.
const fn always_dirty(reg: u8) -> bool {
    reg == MODE_VOLUME || (reg < 3 * VOICE_STRIDE && reg % VOICE_STRIDE == CONTROL)
}

/// One voice's registers decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceRegisters {
    pub frequency: u16,
    /// 12 bits.
    pub pulse_width: u16,
    pub control: u8,
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
}

impl VoiceRegisters {
    #[must_use]
    pub fn waveform_selected(&self) -> bool {
        self.control & WAVEFORM_MASK != 0
    }

    #[must_use]
    pub fn gate(&self) -> bool {
        self.control & GATE != 0
    }
}

/// Which of a voice's registers changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceDeltas {
    pub control: bool,
    pub frequency: bool,
    pub pulse_width: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ShadowRegisters {
    values: [u8; REGISTER_COUNT],
    dirty: [bool; REGISTER_COUNT],
}

impl ShadowRegisters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a CPU write. Writes past `$18` target read-only registers and
    /// are dropped.
    pub fn write(&mut self, reg: u8, value: u8) {
        let Some(slot) = self.values.get_mut(usize::from(reg)) else {
            return;
        };
        if *slot != value || always_dirty(reg) {
            self.dirty[usize::from(reg)] = true;
        }
        *slot = value;
    }

    #[must_use]
    pub fn value(&self, reg: u8) -> u8 {
        self.values.get(usize::from(reg)).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn is_dirty(&self, reg: u8) -> bool {
        self.dirty.get(usize::from(reg)).copied().unwrap_or(false)
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = [false; REGISTER_COUNT];
    }

    #[must_use]
    pub fn volume(&self) -> u8 {
        self.value(MODE_VOLUME) & 0x0F
    }

    /// Decoded registers of voice `n` (0-2).
    #[must_use]
    pub fn voice(&self, n: u8) -> VoiceRegisters {
        let base = n * VOICE_STRIDE;
        let ad = self.value(base + ATTACK_DECAY);
        let sr = self.value(base + SUSTAIN_RELEASE);
        VoiceRegisters {
            frequency: u16::from_le_bytes([self.value(base + FREQ_LO), self.value(base + FREQ_HI)]),
            pulse_width: u16::from_le_bytes([self.value(base + PW_LO), self.value(base + PW_HI) & 0x0F]),
            control: self.value(base + CONTROL),
            attack: ad >> 4,
            decay: ad & 0x0F,
            sustain: sr >> 4,
            release: sr & 0x0F,
        }
    }

    /// Changes to voice `n` since the last [`ShadowRegisters::clear_dirty`].
    #[must_use]
    pub fn voice_deltas(&self, n: u8) -> VoiceDeltas {
        let base = n * VOICE_STRIDE;
        VoiceDeltas {
            control: self.is_dirty(base + CONTROL),
            frequency: self.is_dirty(base + FREQ_LO) || self.is_dirty(base + FREQ_HI),
            pulse_width: self.is_dirty(base + PW_LO) || self.is_dirty(base + PW_HI),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_value_is_not_a_change() {
        let mut regs = ShadowRegisters::new();
        regs.write(FREQ_LO, 0x10);
        assert!(regs.is_dirty(FREQ_LO));
        regs.clear_dirty();
        regs.write(FREQ_LO, 0x10);
        assert!(!regs.is_dirty(FREQ_LO));
    }

    #[test]
    fn control_and_volume_always_count_as_changed() {
        let mut regs = ShadowRegisters::new();
        for reg in [CONTROL, VOICE_STRIDE + CONTROL, 2 * VOICE_STRIDE + CONTROL, MODE_VOLUME] {
            regs.write(reg, 0);
            assert!(regs.is_dirty(reg), "${reg:02X}");
        }
        // Attack/decay of voice 2 is not special
        regs.write(VOICE_STRIDE + ATTACK_DECAY, 0);
        assert!(!regs.is_dirty(VOICE_STRIDE + ATTACK_DECAY));
    }

    #[test]
    fn voice_view_decodes_fields() {
        let mut regs = ShadowRegisters::new();
        let base = 2 * VOICE_STRIDE;
        regs.write(base + FREQ_LO, 0x34);
        regs.write(base + FREQ_HI, 0x12);
        regs.write(base + PW_HI, 0xF8);
        regs.write(base + ATTACK_DECAY, 0x9A);
        regs.write(base + SUSTAIN_RELEASE, 0xBC);
        let voice = regs.voice(2);
        assert_eq!(voice.frequency, 0x1234);
        assert_eq!(voice.pulse_width, 0x0800);
        assert_eq!((voice.attack, voice.decay), (0x9, 0xA));
        assert_eq!((voice.sustain, voice.release), (0xB, 0xC));
        assert!(regs.voice_deltas(2).frequency);
        assert!(!regs.voice_deltas(1).frequency);
    }

    #[test]
    fn read_only_registers_ignore_writes() {
        let mut regs = ShadowRegisters::new();
        regs.write(0x1B, 0xFF);
        assert_eq!(regs.value(0x1B), 0);
    }
}
