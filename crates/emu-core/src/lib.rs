//! Core traits and types shared by the CPU, the chips and the system.
//!
//! Everything hangs off the memory bus. Chips intercept addresses through
//! hooks on [`Memory`], and advance in lock-step with the CPU through the
//! [`Peripheral`] contract driven by a [`Synchronizer`].

mod bus;
mod memory;
mod observable;
mod sync;

pub use bus::Bus;
pub use memory::{BusError, HookDirection, MEMORY_SIZE, Memory};
pub use observable::{Observable, Value, parse_address};
pub use sync::{
    FrameSync, InterruptLine, InterruptLines, InterruptSource, Peripheral, SyncContext,
    Synchronizer,
};
