//! Error types for system construction and host calls.

use emu_core::BusError;
use format_prg::PrgError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Every violation found, not just the first.
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("configuration is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// IEC bus contract violations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IecError {
    #[error("device number {0} is outside 1-15")]
    InvalidDeviceNumber(u8),
    #[error("device {0} is already attached")]
    DuplicateDevice(u8),
    #[error("no device {0} is attached")]
    UnknownDevice(u8),
}

#[derive(Debug, Error)]
pub enum C64Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Prg(#[from] PrgError),
    #[error(transparent)]
    Iec(#[from] IecError),
}
