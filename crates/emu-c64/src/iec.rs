//! IEC serial bus.
//!
//! Three open-collector lines: ATN, CLK, DATA. The host and every attached
//! device each hold a set of lines; a line is low while anybody holds it
//! and released otherwise. No party can set the observed level directly.
//!
//! Host polarity (CIA2 port A):
//!   Output: bit = 1 holds the line low (bit 3 = ATN, 4 = CLK, 5 = DATA)
//!   Input:  bit = 0 means the line is low (bit 6 = CLK IN, 7 = DATA IN)

use std::collections::BTreeMap;
use std::fmt;

use emu_core::{Observable, Value};

use crate::error::IecError;

/// Valid device numbers.
pub const DEVICE_NUMBERS: std::ops::RangeInclusive<u8> = 1..=15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IecLine {
    Attention,
    Clock,
    Data,
}

impl IecLine {
    pub const ALL: [IecLine; 3] = [Self::Attention, Self::Clock, Self::Data];

    const fn bit(self) -> u8 {
        match self {
            Self::Attention => 0x01,
            Self::Clock => 0x02,
            Self::Data => 0x04,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Low,
    Released,
}

impl fmt::Display for LineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Released => "released",
        })
    }
}

/// A device that takes part in the bus protocol by itself.
pub trait IecDevice {
    /// Called once per CPU instruction with the device's view of the bus.
    fn poll(&mut self, port: &mut IecPort<'_>);
}

/// One party's view of the bus: it sees every line but only changes its
/// own holds.
pub struct IecPort<'a> {
    holds: &'a mut u8,
    others: u8,
}

impl IecPort<'_> {
    #[must_use]
    pub fn line(&self, line: IecLine) -> LineState {
        if (*self.holds | self.others) & line.bit() != 0 {
            LineState::Low
        } else {
            LineState::Released
        }
    }

    #[must_use]
    pub fn is_low(&self, line: IecLine) -> bool {
        self.line(line) == LineState::Low
    }

    /// Hold (`true`) or release this party's pull on `line`.
    pub fn hold(&mut self, line: IecLine, low: bool) {
        if low {
            *self.holds |= line.bit();
        } else {
            *self.holds &= !line.bit();
        }
    }

    #[must_use]
    pub fn holding(&self, line: IecLine) -> bool {
        *self.holds & line.bit() != 0
    }
}

#[derive(Default)]
struct Slot {
    holds: u8,
    device: Option<Box<dyn IecDevice>>,
}

#[derive(Default)]
pub struct IecBus {
    host: u8,
    devices: BTreeMap<u8, Slot>,
}

impl IecBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check_number(number: u8) -> Result<(), IecError> {
        if DEVICE_NUMBERS.contains(&number) {
            Ok(())
        } else {
            Err(IecError::InvalidDeviceNumber(number))
        }
    }

    fn insert(&mut self, number: u8, slot: Slot) -> Result<(), IecError> {
        Self::check_number(number)?;
        if self.devices.contains_key(&number) {
            return Err(IecError::DuplicateDevice(number));
        }
        self.devices.insert(number, slot);
        log::debug!("iec: device {number} attached");
        Ok(())
    }

    /// Attach a passive device whose holds are driven through
    /// [`IecBus::port`].
    pub fn attach(&mut self, number: u8) -> Result<(), IecError> {
        self.insert(number, Slot::default())
    }

    /// Attach a device that polls the bus itself.
    pub fn attach_device(
        &mut self,
        number: u8,
        device: Box<dyn IecDevice>,
    ) -> Result<(), IecError> {
        self.insert(
            number,
            Slot {
                holds: 0,
                device: Some(device),
            },
        )
    }

    /// Detach a device, releasing its lines.
    pub fn detach(&mut self, number: u8) -> Result<(), IecError> {
        Self::check_number(number)?;
        self.devices
            .remove(&number)
            .ok_or(IecError::UnknownDevice(number))?;
        log::debug!("iec: device {number} detached");
        Ok(())
    }

    #[must_use]
    pub fn is_attached(&self, number: u8) -> bool {
        self.devices.contains_key(&number)
    }

    pub fn attached(&self) -> impl Iterator<Item = u8> + '_ {
        self.devices.keys().copied()
    }

    fn holds_except(&self, except: Option<u8>) -> u8 {
        let devices = self
            .devices
            .iter()
            .filter(|&(&n, _)| Some(n) != except)
            .fold(0, |acc, (_, slot)| acc | slot.holds);
        if except.is_some() {
            devices | self.host
        } else {
            devices
        }
    }

    #[must_use]
    pub fn line(&self, line: IecLine) -> LineState {
        if (self.host | self.holds_except(None)) & line.bit() != 0 {
            LineState::Low
        } else {
            LineState::Released
        }
    }

    /// The host's view.
    pub fn host_port(&mut self) -> IecPort<'_> {
        let others = self.holds_except(None);
        IecPort {
            holds: &mut self.host,
            others,
        }
    }

    /// Device `number`'s view.
    pub fn port(&mut self, number: u8) -> Result<IecPort<'_>, IecError> {
        Self::check_number(number)?;
        let others = self.holds_except(Some(number));
        let slot = self
            .devices
            .get_mut(&number)
            .ok_or(IecError::UnknownDevice(number))?;
        Ok(IecPort {
            holds: &mut slot.holds,
            others,
        })
    }

    /// Let every active device react to the current line levels.
    pub fn poll_devices(&mut self) {
        let numbers: Vec<u8> = self
            .devices
            .iter()
            .filter(|(_, slot)| slot.device.is_some())
            .map(|(&n, _)| n)
            .collect();
        for number in numbers {
            let others = self.holds_except(Some(number));
            if let Some(slot) = self.devices.get_mut(&number) {
                if let Some(device) = slot.device.as_mut() {
                    device.poll(&mut IecPort {
                        holds: &mut slot.holds,
                        others,
                    });
                }
            }
        }
    }

    /// Host holds from CIA2 port A's driven output.
    pub fn set_host_from_port(&mut self, port_a: u8) {
        self.host = (port_a >> 3) & 0x07;
    }

    /// CIA2 port A input bits 6 and 7 for the current line levels.
    #[must_use]
    pub fn host_input_bits(&self) -> u8 {
        let mut bits = 0;
        if self.line(IecLine::Clock) == LineState::Released {
            bits |= 0x40;
        }
        if self.line(IecLine::Data) == LineState::Released {
            bits |= 0x80;
        }
        bits
    }

    /// Release every line, keeping attached devices.
    pub fn release_all(&mut self) {
        self.host = 0;
        for slot in self.devices.values_mut() {
            slot.holds = 0;
        }
    }
}

const QUERY_PATHS: &[&str] = &["atn", "clk", "data", "devices"];

impl Observable for IecBus {
    fn query(&self, path: &str) -> Option<Value> {
        let line = match path {
            "atn" => IecLine::Attention,
            "clk" => IecLine::Clock,
            "data" => IecLine::Data,
            "devices" => {
                let list: Vec<String> = self.attached().map(|n| n.to_string()).collect();
                return Some(list.join(",").as_str().into());
            }
            _ => return None,
        };
        Some(self.line(line).to_string().as_str().into())
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
