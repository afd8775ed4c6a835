//! Memory and I/O bus interface.

/// Memory and I/O bus interface.
///
/// The CPU and the chips access memory through this trait. Addresses are
/// 16-bit; arithmetic on them wraps modulo 65536, so there is no such thing
/// as an out-of-range access.
pub trait Bus {
    /// Read a byte. May have side effects when the address is intercepted.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte.
    fn write(&mut self, address: u16, value: u8);

    /// Read the backing byte without triggering any side effect.
    fn peek(&self, address: u16) -> u8;
}
