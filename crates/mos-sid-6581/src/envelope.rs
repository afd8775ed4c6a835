//! ADSR envelope generator.
//!
//! Driven by voice commands rather than by watching the gate bit itself:
//! the voice state machine decides when attack and release begin. Levels
//! step linearly in attack and follow the 6581's piecewise exponential
//! curve in decay and release.

/// Cycles per level step for each 4-bit rate. Attack at rate 0 takes 2 ms
/// to climb 255 steps; decay and release share the table and are three
/// times slower through the exponential divider.
const RATE_PERIODS: [u16; 16] = [
    9, 32, 63, 95, 149, 220, 267, 313, 392, 977, 1954, 3126, 3907, 11_720, 19_532, 31_251,
];

/// Phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// Silent at level zero.
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// The four 4-bit rates from a voice's AD and SR registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Adsr {
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
}

impl Adsr {
    /// Sustain nibble scaled to a level, `$n` becoming `$nn`.
    #[must_use]
    pub fn sustain_level(&self) -> u8 {
        (self.sustain & 0x0F) * 0x11
    }
}

fn rate_period(rate: u8) -> u16 {
    RATE_PERIODS[usize::from(rate & 0x0F)]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Envelope {
    level: u8,
    phase: Phase,
    rate_counter: u16,
    exp_counter: u8,
}

impl Envelope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn level(&self) -> u8 {
        self.level
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Begin attack from the current level.
    pub fn start_attack(&mut self) {
        self.phase = Phase::Attack;
        self.rate_counter = 0;
        self.exp_counter = 0;
    }

    pub fn start_release(&mut self) {
        if self.phase != Phase::Idle {
            self.phase = Phase::Release;
            self.rate_counter = 0;
        }
    }

    /// Cut to silence.
    pub fn stop(&mut self) {
        *self = Self::default();
    }

    /// Advance by `cycles` CPU cycles. Returns true if a release reached
    /// zero during the span.
    pub fn advance(&mut self, adsr: Adsr, cycles: u32) -> bool {
        let mut finished = false;
        for _ in 0..cycles {
            if matches!(self.phase, Phase::Idle | Phase::Sustain) {
                break;
            }
            finished |= self.clock(adsr);
        }
        finished
    }

    fn clock(&mut self, adsr: Adsr) -> bool {
        let rate = match self.phase {
            Phase::Attack => adsr.attack,
            Phase::Decay => adsr.decay,
            Phase::Release => adsr.release,
            Phase::Idle | Phase::Sustain => return false,
        };
        self.rate_counter += 1;
        if self.rate_counter < rate_period(rate) {
            return false;
        }
        self.rate_counter = 0;

        if self.phase == Phase::Attack {
            self.level = self.level.saturating_add(1);
            if self.level == 0xFF {
                self.phase = Phase::Decay;
            }
            return false;
        }

        self.exp_counter += 1;
        if self.exp_counter < self.exp_period() {
            return false;
        }
        self.exp_counter = 0;

        match self.phase {
            Phase::Decay => {
                let sustain = adsr.sustain_level();
                if self.level > sustain {
                    self.level -= 1;
                }
                if self.level <= sustain {
                    self.phase = Phase::Sustain;
                }
                false
            }
            Phase::Release => {
                self.level = self.level.saturating_sub(1);
                if self.level == 0 {
                    self.phase = Phase::Idle;
                    return true;
                }
                false
            }
            Phase::Idle | Phase::Attack | Phase::Sustain => false,
        }
    }

    /// Rate-counter periods per level step at the current level.
    fn exp_period(&self) -> u8 {
        match self.level {
            0x5D..=0xFF => 1,
            0x36..=0x5C => 2,
            0x1A..=0x35 => 4,
            0x0E..=0x19 => 8,
            0x06..=0x0D => 16,
            _ => 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attack_at_rate_zero_peaks_in_about_two_milliseconds() {
        let mut env = Envelope::new();
        env.start_attack();
        let adsr = Adsr {
            sustain: 0xF,
            ..Adsr::default()
        };
        env.advance(adsr, 9 * 255);
        assert_eq!(env.level(), 0xFF);
        assert_eq!(env.phase(), Phase::Decay);
    }

    #[test]
    fn decay_settles_on_sustain_level() {
        let mut env = Envelope::new();
        env.start_attack();
        let adsr = Adsr {
            sustain: 0x8,
            ..Adsr::default()
        };
        env.advance(adsr, 100_000);
        assert_eq!(env.phase(), Phase::Sustain);
        assert_eq!(env.level(), 0x88);
    }

    #[test]
    fn release_reports_reaching_zero() {
        let mut env = Envelope::new();
        env.start_attack();
        let adsr = Adsr {
            sustain: 0xF,
            ..Adsr::default()
        };
        env.advance(adsr, 10_000);
        env.start_release();
        assert!(env.advance(adsr, 200_000));
        assert_eq!(env.level(), 0);
        assert_eq!(env.phase(), Phase::Idle);
    }

    #[test]
    fn stop_silences_immediately() {
        let mut env = Envelope::new();
        env.start_attack();
        env.advance(Adsr::default(), 500);
        assert!(env.level() > 0);
        env.stop();
        assert_eq!(env.level(), 0);
        assert_eq!(env.phase(), Phase::Idle);
    }
}
