//! Byte transfer handshake over the IEC bus.
//!
//! [`Talker`] and [`Listener`] are poll-driven: each call to `poll` looks
//! at the lines through the party's [`IecPort`] and advances at most one
//! step. Every step waits for a line change made by the other side, except
//! inside the bit loop where the talker holds each phase for a fixed number
//! of polls, and the listener's end-of-input detection which is a timeout.
//!
//! ```text
//! talker                          listener
//! Start         hold CLK          Start           hold DATA, see CLK low
//! ReadyToSend   release CLK       ReadyToReceive  release DATA
//!               (EOI: wait)       EoiIntermission pulse DATA
//! CompletionBeforeSend hold CLK
//! Bit x8        DATA = bit, pulse CLK      sample DATA on CLK release
//! Acknowledge   wait DATA low     Acknowledge     hold DATA
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::iec::{IecDevice, IecLine, IecPort};

/// Polls the listener waits in ReadyToReceive before treating the pause
/// as end-or-identify.
pub const EOI_TIMEOUT_POLLS: u32 = 8;
/// Length of the listener's EOI acknowledge pulse.
pub const EOI_PULSE_POLLS: u32 = 4;
/// Polls per half bit.
pub const BIT_HOLD_POLLS: u32 = 2;
/// Polls the talker waits for a listener before giving up.
pub const RESPONSE_TIMEOUT_POLLS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TalkerState {
    Idle,
    /// Holding CLK until a listener holds DATA.
    Start { polls: u32 },
    /// CLK released, waiting for DATA released.
    ReadyToSend { polls: u32 },
    /// Waiting out the listener's DATA pulse.
    EoiIntermission { acknowledged: bool },
    CompletionBeforeSend,
    /// Bit on DATA with CLK held.
    BitSetup { bit: u8, polls: u32 },
    /// CLK released: bit valid.
    BitValid { bit: u8, polls: u32 },
    /// CLK held, waiting for the listener to hold DATA.
    Acknowledge { polls: u32 },
    Done,
    /// No listener responded.
    Failed,
}

/// Sending side of one byte transfer.
#[derive(Debug, Clone)]
pub struct Talker {
    state: TalkerState,
    byte: u8,
    eoi: bool,
}

impl Default for Talker {
    fn default() -> Self {
        Self::new()
    }
}

impl Talker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: TalkerState::Idle,
            byte: 0,
            eoi: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> TalkerState {
        self.state
    }

    /// Begin sending `byte`; `eoi` marks it as the last of a stream.
    pub fn send(&mut self, byte: u8, eoi: bool) {
        self.byte = byte;
        self.eoi = eoi;
        self.state = TalkerState::Start { polls: 0 };
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        !matches!(
            self.state,
            TalkerState::Idle | TalkerState::Done | TalkerState::Failed
        )
    }

    pub fn poll(&mut self, port: &mut IecPort<'_>) {
        self.state = match self.state {
            state @ (TalkerState::Idle | TalkerState::Done | TalkerState::Failed) => state,
            TalkerState::Start { polls } => {
                port.hold(IecLine::Clock, true);
                port.hold(IecLine::Data, false);
                if port.is_low(IecLine::Data) {
                    TalkerState::ReadyToSend { polls: 0 }
                } else {
                    Self::waiting(polls, |polls| TalkerState::Start { polls })
                }
            }
            TalkerState::ReadyToSend { polls } => {
                port.hold(IecLine::Clock, false);
                if port.is_low(IecLine::Data) {
                    Self::waiting(polls, |polls| TalkerState::ReadyToSend { polls })
                } else if self.eoi {
                    TalkerState::EoiIntermission {
                        acknowledged: false,
                    }
                } else {
                    TalkerState::CompletionBeforeSend
                }
            }
            TalkerState::EoiIntermission { acknowledged } => {
                let low = port.is_low(IecLine::Data);
                match (acknowledged, low) {
                    (false, true) => TalkerState::EoiIntermission { acknowledged: true },
                    (true, false) => TalkerState::CompletionBeforeSend,
                    _ => self.state,
                }
            }
            TalkerState::CompletionBeforeSend => {
                port.hold(IecLine::Clock, true);
                TalkerState::BitSetup { bit: 0, polls: 0 }
            }
            TalkerState::BitSetup { bit, polls } => {
                port.hold(IecLine::Clock, true);
                port.hold(IecLine::Data, self.byte & (1 << bit) == 0);
                if polls + 1 >= BIT_HOLD_POLLS {
                    TalkerState::BitValid { bit, polls: 0 }
                } else {
                    TalkerState::BitSetup {
                        bit,
                        polls: polls + 1,
                    }
                }
            }
            TalkerState::BitValid { bit, polls } => {
                port.hold(IecLine::Clock, false);
                if polls + 1 < BIT_HOLD_POLLS {
                    TalkerState::BitValid {
                        bit,
                        polls: polls + 1,
                    }
                } else if bit == 7 {
                    port.hold(IecLine::Clock, true);
                    port.hold(IecLine::Data, false);
                    TalkerState::Acknowledge { polls: 0 }
                } else {
                    TalkerState::BitSetup {
                        bit: bit + 1,
                        polls: 0,
                    }
                }
            }
            TalkerState::Acknowledge { polls } => {
                port.hold(IecLine::Clock, true);
                port.hold(IecLine::Data, false);
                if port.is_low(IecLine::Data) {
                    TalkerState::Done
                } else {
                    Self::waiting(polls, |polls| TalkerState::Acknowledge { polls })
                }
            }
        };
        if self.state == TalkerState::Failed {
            port.hold(IecLine::Clock, false);
            port.hold(IecLine::Data, false);
        }
    }

    fn waiting(polls: u32, next: impl FnOnce(u32) -> TalkerState) -> TalkerState {
        if polls + 1 >= RESPONSE_TIMEOUT_POLLS {
            log::debug!("iec: talker gave up after {RESPONSE_TIMEOUT_POLLS} polls");
            TalkerState::Failed
        } else {
            next(polls + 1)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Holding DATA, waiting for the talker to hold then release CLK.
    Start { clock_seen_low: bool },
    /// DATA released; counting polls until CLK is held.
    ReadyToReceive { polls: u32 },
    /// Pulsing DATA to acknowledge end-or-identify.
    EoiIntermission { polls: u32 },
    /// Receiving bit `index`; `sampled` once CLK has been released for it.
    Bits { index: u8, sampled: bool },
    /// Holding DATA after the eighth bit.
    Acknowledge,
}

/// A received byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    pub byte: u8,
    pub eoi: bool,
}

/// Receiving side; loops back to [`ListenerState::Start`] after each byte.
#[derive(Debug, Clone)]
pub struct Listener {
    state: ListenerState,
    shift: u8,
    eoi: bool,
}

impl Default for Listener {
    fn default() -> Self {
        Self::new()
    }
}

impl Listener {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ListenerState::Start {
                clock_seen_low: false,
            },
            shift: 0,
            eoi: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Advance one step. Returns a byte once its acknowledge is on the bus.
    pub fn poll(&mut self, port: &mut IecPort<'_>) -> Option<Received> {
        let clock_low = port.is_low(IecLine::Clock);
        let mut received = None;
        self.state = match self.state {
            ListenerState::Start { clock_seen_low } => {
                port.hold(IecLine::Data, true);
                if clock_seen_low && !clock_low {
                    port.hold(IecLine::Data, false);
                    self.shift = 0;
                    self.eoi = false;
                    ListenerState::ReadyToReceive { polls: 0 }
                } else {
                    ListenerState::Start {
                        clock_seen_low: clock_seen_low || clock_low,
                    }
                }
            }
            ListenerState::ReadyToReceive { polls } => {
                if clock_low {
                    ListenerState::Bits {
                        index: 0,
                        sampled: false,
                    }
                } else if polls + 1 >= EOI_TIMEOUT_POLLS {
                    self.eoi = true;
                    port.hold(IecLine::Data, true);
                    ListenerState::EoiIntermission { polls: 0 }
                } else {
                    ListenerState::ReadyToReceive { polls: polls + 1 }
                }
            }
            ListenerState::EoiIntermission { polls } => {
                if polls + 1 < EOI_PULSE_POLLS {
                    ListenerState::EoiIntermission { polls: polls + 1 }
                } else {
                    port.hold(IecLine::Data, false);
                    // Wait for the talker's CLK before the first bit
                    if clock_low {
                        ListenerState::Bits {
                            index: 0,
                            sampled: false,
                        }
                    } else {
                        ListenerState::EoiIntermission { polls }
                    }
                }
            }
            ListenerState::Bits { index, sampled } => {
                if !clock_low && !sampled {
                    if !port.is_low(IecLine::Data) {
                        self.shift |= 1 << index;
                    }
                    ListenerState::Bits {
                        index,
                        sampled: true,
                    }
                } else if clock_low && sampled {
                    if index == 7 {
                        port.hold(IecLine::Data, true);
                        received = Some(Received {
                            byte: self.shift,
                            eoi: self.eoi,
                        });
                        ListenerState::Acknowledge
                    } else {
                        ListenerState::Bits {
                            index: index + 1,
                            sampled: false,
                        }
                    }
                } else {
                    self.state
                }
            }
            ListenerState::Acknowledge => {
                port.hold(IecLine::Data, true);
                ListenerState::Start {
                    clock_seen_low: clock_low,
                }
            }
        };
        received
    }
}

/// Bytes collected by a [`ListenerDevice`].
pub type Inbox = Rc<RefCell<Vec<Received>>>;

/// Device that listens forever, collecting every byte.
pub struct ListenerDevice {
    listener: Listener,
    inbox: Inbox,
}

impl ListenerDevice {
    /// The device and a handle on what it receives.
    #[must_use]
    pub fn new() -> (Self, Inbox) {
        let inbox = Inbox::default();
        (
            Self {
                listener: Listener::new(),
                inbox: Rc::clone(&inbox),
            },
            inbox,
        )
    }
}

impl IecDevice for ListenerDevice {
    fn poll(&mut self, port: &mut IecPort<'_>) {
        if let Some(received) = self.listener.poll(port) {
            log::trace!(
                "iec: received ${:02X}{}",
                received.byte,
                if received.eoi { " (EOI)" } else { "" }
            );
            self.inbox.borrow_mut().push(received);
        }
    }
}

/// Device that talks a fixed stream, marking the last byte with EOI.
pub struct TalkerDevice {
    talker: Talker,
    pending: VecDeque<u8>,
}

impl TalkerDevice {
    #[must_use]
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            talker: Talker::new(),
            pending: bytes.iter().copied().collect(),
        }
    }
}

impl IecDevice for TalkerDevice {
    fn poll(&mut self, port: &mut IecPort<'_>) {
        if !self.talker.is_busy() && self.talker.state() != TalkerState::Failed {
            if let Some(byte) = self.pending.pop_front() {
                self.talker.send(byte, self.pending.is_empty());
            }
        }
        self.talker.poll(port);
    }
}
