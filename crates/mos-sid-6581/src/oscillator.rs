//! Phase-accumulator oscillator and waveform selection.
//!
//! Stepped in blocks of cycles, once per output sample, so noise is clocked
//! by counting the bit-19 rising edges the block passed over.

use crate::registers::{RING_MOD, TEST};

const ACCUMULATOR_MASK: u32 = 0x00FF_FFFF;
const MSB: u32 = 0x0080_0000;
const NOISE_SEED: u32 = 0x7F_FFFF;

const TRIANGLE: u8 = 0x10;
const SAWTOOTH: u8 = 0x20;
const PULSE: u8 = 0x40;
const NOISE: u8 = 0x80;

/// Rising edges of bit 19 while counting from zero up to `count`.
fn bit19_rises_up_to(count: u64) -> u64 {
    const HALF: u64 = 1 << 19;
    if count < HALF { 0 } else { ((count - HALF) >> 20) + 1 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Oscillator {
    accumulator: u32,
    noise: u32,
}

impl Default for Oscillator {
    fn default() -> Self {
        Self {
            accumulator: 0,
            noise: NOISE_SEED,
        }
    }
}

impl Oscillator {
    #[must_use]
    pub fn accumulator(&self) -> u32 {
        self.accumulator
    }

    #[must_use]
    pub fn msb(&self) -> bool {
        self.accumulator & MSB != 0
    }

    /// Advance by `cycles` at `frequency`. The test bit holds the
    /// accumulator at zero and reseeds the noise register.
    pub fn clock(&mut self, frequency: u16, control: u8, cycles: u32) {
        if control & TEST != 0 {
            self.accumulator = 0;
            self.noise = NOISE_SEED;
            return;
        }
        let start = u64::from(self.accumulator);
        let end = start + u64::from(frequency) * u64::from(cycles);
        for _ in bit19_rises_up_to(start)..bit19_rises_up_to(end) {
            self.clock_noise();
        }
        let wrapped = (end as u32) & ACCUMULATOR_MASK;
        self.accumulator = wrapped;
    }

    fn clock_noise(&mut self) {
        let feedback = ((self.noise >> 22) ^ (self.noise >> 17)) & 1;
        self.noise = ((self.noise << 1) | feedback) & NOISE_SEED;
    }

    /// 12-bit output for `control`'s waveform bits. Combined waveforms AND
    /// together. `ring_source_msb` is the MSB of the ring-modulating voice.
    #[must_use]
    pub fn output(&self, control: u8, pulse_width: u16, ring_source_msb: bool) -> u16 {
        let acc = self.accumulator;
        let mut out: Option<u16> = None;
        let mut mix = |wave: u16| out = Some(out.map_or(wave, |o| o & wave));

        if control & TRIANGLE != 0 {
            let mut tri = acc;
            if control & RING_MOD != 0 && ring_source_msb {
                tri ^= MSB;
            }
            let folded = if tri & MSB != 0 { tri ^ 0x007F_FFFF } else { tri };
            mix(((folded >> 11) & 0xFFF) as u16);
        }
        let saw = (acc >> 12) as u16;
        if control & SAWTOOTH != 0 {
            mix(saw);
        }
        if control & PULSE != 0 {
            mix(if saw < (pulse_width & 0xFFF) { 0xFFF } else { 0 });
        }
        if control & NOISE != 0 {
            let n = self.noise;
            let bit = |from: u32, to: u32| ((n >> from) & 1) << to;
            let noise = bit(20, 11)
                | bit(18, 10)
                | bit(14, 9)
                | bit(11, 8)
                | bit(9, 7)
                | bit(5, 6)
                | bit(2, 5)
                | bit(0, 4);
            mix(noise as u16);
        }
        out.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sawtooth_tracks_accumulator() {
        let mut osc = Oscillator::default();
        osc.clock(0x1000, SAWTOOTH, 0x100);
        assert_eq!(osc.accumulator(), 0x10_0000);
        assert_eq!(osc.output(SAWTOOTH, 0, false), 0x100);
    }

    #[test]
    fn accumulator_wraps_at_24_bits() {
        let mut osc = Oscillator::default();
        osc.clock(0xFFFF, SAWTOOTH, 0x101);
        assert_eq!(osc.accumulator(), (0xFFFF * 0x101) & ACCUMULATOR_MASK);
    }

    #[test]
    fn test_bit_holds_at_zero() {
        let mut osc = Oscillator::default();
        osc.clock(0x4000, SAWTOOTH, 100);
        osc.clock(0x4000, SAWTOOTH | TEST, 100);
        assert_eq!(osc.accumulator(), 0);
    }

    #[test]
    fn pulse_compares_against_width() {
        let mut osc = Oscillator::default();
        osc.clock(0x1000, PULSE, 0x100);
        assert_eq!(osc.output(PULSE, 0x800, false), 0xFFF);
        assert_eq!(osc.output(PULSE, 0x080, false), 0);
    }

    #[test]
    fn noise_changes_as_bit_19_rises() {
        let mut osc = Oscillator::default();
        let before = osc.output(NOISE, 0, false);
        osc.clock(0x8000, NOISE, 0x20);
        assert_ne!(osc.output(NOISE, 0, false), before);
    }

    #[test]
    fn no_waveform_is_silent() {
        let osc = Oscillator::default();
        assert_eq!(osc.output(0, 0xFFF, true), 0);
    }
}
