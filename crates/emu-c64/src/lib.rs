//! Commodore 64-class system.
//!
//! Wires the 6502 to the VIC-II, two CIAs and the SID over one hooked
//! memory, with memory-mapped mailboxes for frame handshakes, keys and
//! random numbers, and an IEC serial bus on CIA2 port A.
//!
//! ```no_run
//! use emu_c64::{C64, C64Config};
//! use mos_6502::ExecPolicy;
//!
//! let mut c64 = C64::new(&C64Config::default())?;
//! c64.load_binary(&[0x00, 0xC0, 0xEE, 0x20, 0xD0, 0x4C, 0x00, 0xC0])?;
//! c64.reset(Some(0xC000));
//! let result = c64.run_one_frame(&mut ExecPolicy::new());
//! assert!(result.keep_running);
//! # Ok::<(), emu_c64::C64Error>(())
//! ```

mod c64;
pub mod capture;
pub mod config;
mod error;
pub mod iec;
pub mod iec_protocol;
pub mod input;
pub mod mailbox;

pub use c64::{C64, FrameResult};
pub use config::{C64Config, MailboxConfig};
pub use error::{C64Error, ConfigError, IecError};
pub use iec::{IecBus, IecDevice, IecLine, IecPort, LineState};
pub use input::{InputEvent, InputQueue};
pub use mailbox::Mailboxes;
pub use mos_6502::{ExecPolicy, ExecState, StopKind, StopReason};
