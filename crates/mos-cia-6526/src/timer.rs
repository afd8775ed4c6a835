//! One interval timer.

/// Control register bits shared by CRA and CRB.
pub const CR_START: u8 = 0x01;
pub const CR_ONE_SHOT: u8 = 0x08;
/// Strobe: copy latch into counter. Never reads back as set.
pub const CR_FORCE_LOAD: u8 = 0x10;

/// 16-bit down-counter with a reload latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    counter: u16,
    latch: u16,
    control: u8,
}

impl Default for Timer {
    fn default() -> Self {
        Self {
            counter: 0xFFFF,
            latch: 0xFFFF,
            control: 0,
        }
    }
}

impl Timer {
    #[must_use]
    pub fn counter(&self) -> u16 {
        self.counter
    }

    #[must_use]
    pub fn latch(&self) -> u16 {
        self.latch
    }

    #[must_use]
    pub fn control(&self) -> u8 {
        self.control
    }

    #[must_use]
    pub fn running(&self) -> bool {
        self.control & CR_START != 0
    }

    #[must_use]
    pub fn one_shot(&self) -> bool {
        self.control & CR_ONE_SHOT != 0
    }

    pub fn write_latch_lo(&mut self, value: u8) {
        self.latch = (self.latch & 0xFF00) | u16::from(value);
    }

    /// A stopped timer also loads the new latch into its counter.
    pub fn write_latch_hi(&mut self, value: u8) {
        self.latch = (self.latch & 0x00FF) | (u16::from(value) << 8);
        if !self.running() {
            self.counter = self.latch;
        }
    }

    pub fn write_control(&mut self, value: u8) {
        let starting = !self.running() && value & CR_START != 0;
        self.control = value & !CR_FORCE_LOAD;
        if starting || value & CR_FORCE_LOAD != 0 {
            self.counter = self.latch;
        }
    }

    /// Count down by `ticks` and return how many times the counter reached
    /// zero. Continuous timers reload from the latch and carry the overshoot
    /// into the next period; one-shot timers reload and stop at the first
    /// underflow.
    pub fn count(&mut self, ticks: u32) -> u32 {
        if !self.running() || ticks == 0 {
            return 0;
        }
        // A zero counter still needs one tick to underflow
        let counter = u32::from(self.counter).max(1);
        if ticks < counter {
            let ticks = ticks as u16;
            self.counter -= ticks;
            return 0;
        }

        self.counter = self.latch;
        if self.one_shot() {
            self.control &= !CR_START;
            return 1;
        }

        let period = u32::from(self.latch).max(1);
        let overshoot = ticks - counter;
        let into_period = overshoot % period;
        if into_period != 0 {
            let remaining = (period - into_period) as u16;
            self.counter = remaining;
        }
        1 + overshoot / period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(latch: u16, control: u8) -> Timer {
        let mut timer = Timer::default();
        let [lo, hi] = latch.to_le_bytes();
        timer.write_latch_lo(lo);
        timer.write_latch_hi(hi);
        timer.write_control(control);
        timer
    }

    #[test]
    fn stopped_timer_loads_counter_on_high_byte() {
        let mut timer = Timer::default();
        timer.write_latch_lo(0x34);
        assert_eq!(timer.counter(), 0xFFFF);
        timer.write_latch_hi(0x12);
        assert_eq!(timer.counter(), 0x1234);
    }

    #[test]
    fn underflow_after_exactly_latch_ticks() {
        let mut timer = started(100, CR_START);
        let mut consumed = 0;
        loop {
            consumed += 1;
            if timer.count(1) > 0 {
                break;
            }
        }
        assert_eq!(consumed, 100);
        assert_eq!(timer.counter(), 100);
        assert!(timer.running());
    }

    #[test]
    fn continuous_mode_carries_overshoot() {
        let mut timer = started(10, CR_START);
        assert_eq!(timer.count(7), 0);
        assert_eq!(timer.counter(), 3);
        // 3 to reach zero, 10 more for a second underflow, 2 into the third period
        assert_eq!(timer.count(15), 2);
        assert_eq!(timer.counter(), 8);
    }

    #[test]
    fn one_shot_stops_and_reloads() {
        let mut timer = started(5, CR_START | CR_ONE_SHOT);
        assert_eq!(timer.count(8), 1);
        assert!(!timer.running());
        assert_eq!(timer.counter(), 5);
        assert_eq!(timer.count(50), 0);
    }

    #[test]
    fn force_load_is_a_strobe() {
        let mut timer = started(40, CR_START);
        timer.count(30);
        timer.write_control(CR_START | CR_FORCE_LOAD);
        assert_eq!(timer.counter(), 40);
        assert_eq!(timer.control() & CR_FORCE_LOAD, 0);
    }

    #[test]
    fn zero_latch_underflows_every_tick() {
        let mut timer = started(0, CR_START);
        assert_eq!(timer.count(4), 4);
        assert_eq!(timer.counter(), 0);
    }
}
