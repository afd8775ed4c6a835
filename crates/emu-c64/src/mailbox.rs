//! Memory-mapped one-byte mailboxes.
//!
//! The key-pressed and key-released bytes clear when the program reads
//! them, so they are serviced by hooks. The others are plain RAM the
//! system writes between instructions.

use std::cell::Cell;
use std::rc::Rc;

use emu_core::{Bus, BusError, Memory};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::MailboxConfig;

/// Frame status bit 0: a new frame was produced.
pub const FRAME_NEW: u8 = 0x01;
/// Frame status bit 1: the emulator finished the frame.
pub const FRAME_DONE: u8 = 0x02;

pub struct Mailboxes {
    config: MailboxConfig,
    pressed: Rc<Cell<u8>>,
    released: Rc<Cell<u8>>,
    rng: StdRng,
}

impl Mailboxes {
    #[must_use]
    pub fn new(config: MailboxConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            pressed: Rc::new(Cell::new(0)),
            released: Rc::new(Cell::new(0)),
            rng,
        }
    }

    /// Map the clear-on-read hooks.
    pub fn install(&self, memory: &mut Memory) -> Result<(), BusError> {
        for (address, cell) in [
            (self.config.key_pressed, &self.pressed),
            (self.config.key_released, &self.released),
        ] {
            let reader = Rc::clone(cell);
            memory.map_reader(address, move |_| reader.replace(0))?;
            let writer = Rc::clone(cell);
            memory.map_writer(address, move |_, value| writer.set(value))?;
        }
        Ok(())
    }

    /// Post a key transition.
    pub fn key_event(&self, memory: &mut Memory, code: u8, pressed: bool) {
        if pressed {
            self.pressed.set(code);
            memory.poke(self.config.key_down, code);
        } else {
            self.released.set(code);
            if memory.peek(self.config.key_down) == code {
                memory.poke(self.config.key_down, 0);
            }
        }
    }

    pub fn refresh_random(&mut self, memory: &mut Memory) {
        memory.poke(self.config.random, self.rng.r#gen());
    }

    #[must_use]
    pub fn frame_status(&self, memory: &Memory) -> u8 {
        memory.peek(self.config.frame_status)
    }

    pub fn set_frame_status(&self, memory: &mut Memory, value: u8) {
        memory.poke(self.config.frame_status, value);
    }

    /// Pending key-pressed value, without clearing it.
    #[must_use]
    pub fn peek_pressed(&self) -> u8 {
        self.pressed.get()
    }

    #[must_use]
    pub fn peek_released(&self) -> u8 {
        self.released.get()
    }

    pub fn clear(&self) {
        self.pressed.set(0);
        self.released.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Mailboxes, Memory) {
        let mailboxes = Mailboxes::new(MailboxConfig::default(), Some(7));
        let mut memory = Memory::new();
        mailboxes.install(&mut memory).expect("install");
        (mailboxes, memory)
    }

    #[test]
    fn key_pressed_clears_on_read() {
        let (mailboxes, mut memory) = setup();
        mailboxes.key_event(&mut memory, b'A', true);
        assert_eq!(memory.read(0xCF01), b'A');
        assert_eq!(memory.read(0xCF01), 0);
        // Held key stays visible
        assert_eq!(memory.read(0xCF02), b'A');
        assert_eq!(memory.read(0xCF02), b'A');
    }

    #[test]
    fn release_clears_key_down() {
        let (mailboxes, mut memory) = setup();
        mailboxes.key_event(&mut memory, b'A', true);
        mailboxes.key_event(&mut memory, b'A', false);
        assert_eq!(memory.read(0xCF02), 0);
        assert_eq!(memory.read(0xCF03), b'A');
        assert_eq!(memory.read(0xCF03), 0);
    }

    #[test]
    fn seeded_random_is_reproducible() {
        let (mut a, mut mem_a) = setup();
        let (mut b, mut mem_b) = setup();
        let mut seq_a = Vec::new();
        let mut seq_b = Vec::new();
        for _ in 0..8 {
            a.refresh_random(&mut mem_a);
            b.refresh_random(&mut mem_b);
            seq_a.push(mem_a.peek(0xCF04));
            seq_b.push(mem_b.peek(0xCF04));
        }
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn installing_twice_is_rejected() {
        let (mailboxes, mut memory) = setup();
        assert!(mailboxes.install(&mut memory).is_err());
    }
}
