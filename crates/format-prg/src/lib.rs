//! PRG program files.
//!
//! The simplest Commodore binary format: a 2-byte little-endian load
//! address followed by the bytes to place there.

use emu_core::Bus;
use thiserror::Error;

/// Header length.
pub const HEADER_LEN: usize = 2;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrgError {
    #[error("PRG too short: {len} bytes, need at least {HEADER_LEN} for the load address")]
    TooShort { len: usize },
}

/// A parsed PRG image borrowing its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prg<'a> {
    pub load_address: u16,
    pub data: &'a [u8],
}

/// Where a PRG ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadInfo {
    pub load_address: u16,
    /// Payload bytes written.
    pub len: usize,
}

impl LoadInfo {
    /// Address one past the last byte written, wrapping at the top of memory.
    #[must_use]
    pub fn end_address(&self) -> u16 {
        let len = self.len as u16;
        self.load_address.wrapping_add(len)
    }
}

impl<'a> Prg<'a> {
    /// Split a PRG file into load address and payload.
    ///
    /// # Errors
    ///
    /// [`PrgError::TooShort`] if there is no complete load address.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, PrgError> {
        let Some((header, data)) = bytes.split_first_chunk::<HEADER_LEN>() else {
            return Err(PrgError::TooShort { len: bytes.len() });
        };
        Ok(Self {
            load_address: u16::from_le_bytes(*header),
            data,
        })
    }

    /// Write the payload through `bus`. Hooks in the target range see every
    /// byte; addresses wrap past $FFFF.
    pub fn load_into(&self, bus: &mut (impl Bus + ?Sized)) -> LoadInfo {
        if usize::from(self.load_address) + self.data.len() > 0x1_0000 {
            log::warn!(
                "PRG at ${:04X} with {} bytes wraps past $FFFF",
                self.load_address,
                self.data.len()
            );
        }
        let mut address = self.load_address;
        for &byte in self.data {
            bus.write(address, byte);
            address = address.wrapping_add(1);
        }
        LoadInfo {
            load_address: self.load_address,
            len: self.data.len(),
        }
    }

    /// Serialise back to file form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.extend_from_slice(&self.load_address.to_le_bytes());
        out.extend_from_slice(self.data);
        out
    }
}

/// Parse `bytes` and load them into `bus`.
///
/// # Errors
///
/// [`PrgError::TooShort`] if `bytes` has no complete load address.
pub fn load(bus: &mut (impl Bus + ?Sized), bytes: &[u8]) -> Result<LoadInfo, PrgError> {
    let prg = Prg::parse(bytes)?;
    let info = prg.load_into(bus);
    log::debug!(
        "loaded {} bytes at ${:04X}-${:04X}",
        info.len,
        info.load_address,
        info.end_address().wrapping_sub(1)
    );
    Ok(info)
}
