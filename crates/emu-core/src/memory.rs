//! Flat 64K memory with per-address read and write hooks.
//!
//! An address without a hook reads and writes the backing array. An address
//! with a hook hands the access to the hook instead; the backing byte is not
//! touched. Hooks get the raw address, so one closure can service a whole
//! register window.

use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;

use thiserror::Error;

use crate::Bus;

/// Size of the addressable space.
pub const MEMORY_SIZE: usize = 0x1_0000;

const READ_HOOKED: u8 = 0x01;
const WRITE_HOOKED: u8 = 0x02;

type ReadHook = Box<dyn FnMut(u16) -> u8>;
type WriteHook = Box<dyn FnMut(u16, u8)>;

/// Which side of an access a hook intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDirection {
    Read,
    Write,
}

impl fmt::Display for HookDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// Bus contract violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("{direction} hook already mapped at ${address:04X}")]
    HookAlreadyMapped {
        address: u16,
        direction: HookDirection,
    },
}

/// 64K of RAM plus sparse hook tables.
pub struct Memory {
    ram: Box<[u8]>,
    /// Per-address `READ_HOOKED` / `WRITE_HOOKED` bits, so unhooked
    /// accesses never touch the maps.
    hook_flags: Box<[u8]>,
    readers: HashMap<u16, ReadHook>,
    writers: HashMap<u16, WriteHook>,
}

impl Memory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: vec![0; MEMORY_SIZE].into_boxed_slice(),
            hook_flags: vec![0; MEMORY_SIZE].into_boxed_slice(),
            readers: HashMap::new(),
            writers: HashMap::new(),
        }
    }

    /// Route reads of `address` to `hook`.
    pub fn map_reader<F>(&mut self, address: u16, hook: F) -> Result<(), BusError>
    where
        F: FnMut(u16) -> u8 + 'static,
    {
        if self.has_reader(address) {
            return Err(BusError::HookAlreadyMapped {
                address,
                direction: HookDirection::Read,
            });
        }
        self.readers.insert(address, Box::new(hook));
        self.hook_flags[usize::from(address)] |= READ_HOOKED;
        Ok(())
    }

    /// Route writes of `address` to `hook`.
    pub fn map_writer<F>(&mut self, address: u16, hook: F) -> Result<(), BusError>
    where
        F: FnMut(u16, u8) + 'static,
    {
        if self.has_writer(address) {
            return Err(BusError::HookAlreadyMapped {
                address,
                direction: HookDirection::Write,
            });
        }
        self.writers.insert(address, Box::new(hook));
        self.hook_flags[usize::from(address)] |= WRITE_HOOKED;
        Ok(())
    }

    /// Map one reader over a contiguous window. Nothing is mapped if any
    /// address in the window already has a reader.
    pub fn map_reader_range<F>(
        &mut self,
        range: RangeInclusive<u16>,
        hook: F,
    ) -> Result<(), BusError>
    where
        F: FnMut(u16) -> u8 + Clone + 'static,
    {
        if let Some(address) = range.clone().find(|&a| self.has_reader(a)) {
            return Err(BusError::HookAlreadyMapped {
                address,
                direction: HookDirection::Read,
            });
        }
        for address in range {
            self.map_reader(address, hook.clone())?;
        }
        Ok(())
    }

    /// Map one writer over a contiguous window. Nothing is mapped if any
    /// address in the window already has a writer.
    pub fn map_writer_range<F>(
        &mut self,
        range: RangeInclusive<u16>,
        hook: F,
    ) -> Result<(), BusError>
    where
        F: FnMut(u16, u8) + Clone + 'static,
    {
        if let Some(address) = range.clone().find(|&a| self.has_writer(a)) {
            return Err(BusError::HookAlreadyMapped {
                address,
                direction: HookDirection::Write,
            });
        }
        for address in range {
            self.map_writer(address, hook.clone())?;
        }
        Ok(())
    }

    /// Remove the reader at `address`. Returns whether one was mapped.
    pub fn unmap_reader(&mut self, address: u16) -> bool {
        self.hook_flags[usize::from(address)] &= !READ_HOOKED;
        self.readers.remove(&address).is_some()
    }

    /// Remove the writer at `address`. Returns whether one was mapped.
    pub fn unmap_writer(&mut self, address: u16) -> bool {
        self.hook_flags[usize::from(address)] &= !WRITE_HOOKED;
        self.writers.remove(&address).is_some()
    }

    #[must_use]
    pub fn has_reader(&self, address: u16) -> bool {
        self.hook_flags[usize::from(address)] & READ_HOOKED != 0
    }

    #[must_use]
    pub fn has_writer(&self, address: u16) -> bool {
        self.hook_flags[usize::from(address)] & WRITE_HOOKED != 0
    }

    /// Write `bytes` starting at `start`, wrapping at the top of memory.
    /// Hooks in the range see every byte.
    pub fn store_data(&mut self, start: u16, bytes: &[u8]) {
        let mut address = start;
        for &byte in bytes {
            self.write(address, byte);
            address = address.wrapping_add(1);
        }
    }

    /// Read `length` bytes starting at `start`, wrapping at the top of
    /// memory. Hooks in the range are invoked.
    pub fn read_data(&mut self, start: u16, length: usize) -> Vec<u8> {
        let mut address = start;
        let mut out = Vec::with_capacity(length);
        for _ in 0..length {
            out.push(self.read(address));
            address = address.wrapping_add(1);
        }
        out
    }

    /// Write the backing byte directly, bypassing any hook.
    pub fn poke(&mut self, address: u16, value: u8) {
        self.ram[usize::from(address)] = value;
    }

    /// Clear RAM to zero. Hooks stay mapped.
    pub fn clear(&mut self) {
        self.ram.fill(0);
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for Memory {
    fn read(&mut self, address: u16) -> u8 {
        if self.hook_flags[usize::from(address)] & READ_HOOKED != 0 {
            if let Some(hook) = self.readers.get_mut(&address) {
                return hook(address);
            }
        }
        self.ram[usize::from(address)]
    }

    fn write(&mut self, address: u16, value: u8) {
        if self.hook_flags[usize::from(address)] & WRITE_HOOKED != 0 {
            if let Some(hook) = self.writers.get_mut(&address) {
                hook(address, value);
                return;
            }
        }
        self.ram[usize::from(address)] = value;
    }

    fn peek(&self, address: u16) -> u8 {
        self.ram[usize::from(address)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn store_then_read_round_trips() {
        let mut mem = Memory::new();
        mem.store_data(0xC000, &[1, 2, 3, 4, 5]);
        assert_eq!(mem.read_data(0xC000, 5), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn bulk_access_wraps_at_top_of_memory() {
        let mut mem = Memory::new();
        mem.store_data(0xFFFE, &[0xAA, 0xBB, 0xCC]);
        assert_eq!(mem.peek(0xFFFE), 0xAA);
        assert_eq!(mem.peek(0xFFFF), 0xBB);
        assert_eq!(mem.peek(0x0000), 0xCC);
        assert_eq!(mem.read_data(0xFFFF, 2), vec![0xBB, 0xCC]);
    }

    #[test]
    fn reader_replaces_backing_storage() {
        let mut mem = Memory::new();
        mem.poke(0xD012, 0x11);
        mem.map_reader(0xD012, |_| 0x42).expect("map");
        assert_eq!(mem.read(0xD012), 0x42);
        // Backing byte untouched
        assert_eq!(mem.peek(0xD012), 0x11);
    }

    #[test]
    fn writer_receives_address_and_value() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut mem = Memory::new();
        let log = Rc::clone(&seen);
        mem.map_writer_range(0xD400..=0xD402, move |addr, value| {
            log.borrow_mut().push((addr, value));
        })
        .expect("map");

        mem.store_data(0xD400, &[7, 8, 9]);
        assert_eq!(*seen.borrow(), vec![(0xD400, 7), (0xD401, 8), (0xD402, 9)]);
        // Writes never reached RAM
        assert_eq!(mem.peek(0xD401), 0);
    }

    #[test]
    fn side_effecting_reader_clears_on_read() {
        let flag = Rc::new(Cell::new(0x41_u8));
        let mut mem = Memory::new();
        let hook_flag = Rc::clone(&flag);
        mem.map_reader(0xCF00, move |_| hook_flag.replace(0))
            .expect("map");

        assert_eq!(mem.read(0xCF00), 0x41);
        assert_eq!(mem.read(0xCF00), 0x00);
    }

    #[test]
    fn unhooked_status_byte_reads_are_idempotent() {
        let mut mem = Memory::new();
        mem.write(0x00FB, 0x03);
        assert_eq!(mem.read(0x00FB), mem.read(0x00FB));
    }

    #[test]
    fn second_hook_at_same_address_is_rejected() {
        let mut mem = Memory::new();
        mem.map_reader(0xDC0D, |_| 0).expect("first map");
        let err = mem.map_reader(0xDC0D, |_| 1).unwrap_err();
        assert_eq!(
            err,
            BusError::HookAlreadyMapped {
                address: 0xDC0D,
                direction: HookDirection::Read
            }
        );
        // A writer at the same address is a different direction
        assert!(mem.map_writer(0xDC0D, |_, _| {}).is_ok());
    }

    #[test]
    fn range_mapping_is_all_or_nothing() {
        let mut mem = Memory::new();
        mem.map_writer(0xD405, |_, _| {}).expect("map");
        assert!(mem.map_writer_range(0xD400..=0xD40F, |_, _| {}).is_err());
        assert!(!mem.has_writer(0xD400));
        assert!(mem.has_writer(0xD405));
    }

    #[test]
    fn unmapped_address_falls_back_to_ram() {
        let mut mem = Memory::new();
        mem.map_reader(0x1000, |_| 0xEE).expect("map");
        assert!(mem.unmap_reader(0x1000));
        mem.write(0x1000, 0x12);
        assert_eq!(mem.read(0x1000), 0x12);
        assert!(!mem.unmap_reader(0x1000));
    }
}
