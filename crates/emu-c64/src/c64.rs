//! Top-level C64 system.
//!
//! The CPU runs whole instructions against a flat hooked [`Memory`]. After
//! each one the [`Synchronizer`] hands the cycles it took to the VIC-II,
//! both CIAs and the SID, and once a frame's worth has gone by it tells them
//! the frame ended. Interrupt lines and the IEC wiring are settled before the
//! next instruction starts.
//!
//! # Frame acknowledge
//!
//! At every frame end the frame status mailbox gets bits 0 and 1 set, and
//! the next frame's input events and random byte are delivered. With
//! `wait_for_frame_ack` the CPU keeps running (chips still synced) until the
//! program clears bit 0; bit 1 is cleared when that is seen. A frame that
//! ends during the wait is announced the same way and ends the run; the
//! wait carries on in the next one.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;

use emu_core::{
    Bus, InterruptLines, InterruptSource, Memory, Observable, SyncContext, Synchronizer, Value,
    parse_address,
};
use format_prg::LoadInfo;
use mos_6502::{
    Control, ExecPolicy, ExecState, InstructionResult, Mos6502, RunOutcome, StopKind, StopReason,
};
use mos_cia_6526::Cia;
use mos_sid_6581::{AudioConsumer, Sid};
use mos_vic_ii::{Frame, FrameHandle, Vic};

use crate::config::C64Config;
use crate::error::C64Error;
use crate::iec::IecBus;
use crate::input::InputQueue;
use crate::mailbox::{FRAME_DONE, FRAME_NEW, Mailboxes};

const VIC_IRQ: InterruptSource = InterruptSource::irq(0x01);
const CIA1_IRQ: InterruptSource = InterruptSource::irq(0x02);
const CIA2_NMI: InterruptSource = InterruptSource::nmi(0x01);

/// CIA2 port A: bits 0-1 VIC bank, bits 3-5 IEC outputs.
const CIA2_DDR_A: u8 = 0x3F;
const CIA2_PORT_A: u8 = 0x03;
const CIA2_IEC_INPUTS: u8 = 0xC0;

const SID_WINDOW: u16 = 0x20;
const CIA_WINDOW: u16 = 0x10;

/// Outcome of [`C64::run_one_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameResult {
    /// False once a stop condition fired.
    pub keep_running: bool,
    pub stop: Option<StopReason>,
    pub cycles: u64,
    pub instructions: u64,
}

impl FrameResult {
    fn new(stop: Option<StopReason>, state: &ExecState) -> Self {
        Self {
            keep_running: stop.is_none(),
            stop,
            cycles: state.cycles,
            instructions: state.instructions,
        }
    }
}

/// How a frame acknowledge wait ended.
enum AckWait {
    Acknowledged,
    /// Another frame ended first; the wait resumes on the next run.
    FrameEnded,
    Stopped(StopReason),
}

/// Everything the per-instruction hook touches besides the CPU and memory.
struct Board {
    sync: Synchronizer,
    interrupts: InterruptLines,
    iec: IecBus,
    cia2: Rc<RefCell<Cia>>,
    master_clock: u64,
}

impl Board {
    /// Sync peripherals, then route interrupts and IEC lines. Returns true
    /// on a frame boundary.
    fn after_instruction(&mut self, cpu: &mut Mos6502, memory: &mut Memory, cycles: u32) -> bool {
        self.master_clock += u64::from(cycles);
        let frame_end = {
            let mut ctx = SyncContext {
                bus: memory,
                interrupts: &mut self.interrupts,
            };
            self.sync.after_instruction(cycles, &mut ctx)
        };
        cpu.set_irq(self.interrupts.irq());
        if self.interrupts.take_nmi() {
            cpu.trigger_nmi();
        }
        self.wire_iec();
        frame_end
    }

    fn wire_iec(&mut self) {
        let mut cia2 = self.cia2.borrow_mut();
        self.iec.set_host_from_port(cia2.port_a.driven());
        self.iec.poll_devices();
        cia2.port_a.input = (cia2.port_a.input & !CIA2_IEC_INPUTS) | self.iec.host_input_bits();
    }
}

/// C64 system.
pub struct C64 {
    config: C64Config,
    cpu: Mos6502,
    memory: Memory,
    board: Board,
    vic: Rc<RefCell<Vic>>,
    sid: Rc<RefCell<Sid>>,
    cia1: Rc<RefCell<Cia>>,
    mailboxes: Mailboxes,
    input_queue: InputQueue,
    /// Frame ended and the program has not acknowledged it yet.
    awaiting_ack: bool,
    /// Cycles spent waiting since the oldest unacknowledged frame end.
    ack_waited: u64,
    /// A frame boundary was crossed and not yet announced.
    frame_pending: bool,
    /// Frame whose input and random byte have been delivered.
    started_frame: Option<u64>,
}

impl C64 {
    /// Build a system from a validated configuration. The CPU starts at the
    /// reset vector, which reads as zero until something is loaded there.
    ///
    /// # Errors
    ///
    /// [`C64Error::Config`] listing every configuration violation, or
    /// [`C64Error::Bus`] if a register window could not be hooked.
    pub fn new(config: &C64Config) -> Result<Self, C64Error> {
        config.validate()?;

        let vic = Rc::new(RefCell::new(Vic::new(config.vic(), VIC_IRQ)));
        let sid = Rc::new(RefCell::new(Sid::new(
            config.timing.cpu_clock_hz(),
            config.sample_rate,
        )));
        let cia1 = Rc::new(RefCell::new(Cia::new("cia1", CIA1_IRQ)));
        let cia2 = Rc::new(RefCell::new(Cia::new("cia2", CIA2_NMI)));

        let mut memory = Memory::new();
        map_window(
            &mut memory,
            config.vic_base,
            mos_vic_ii::REGISTER_WINDOW,
            &vic,
            Vic::read,
            Vic::write,
        )?;
        map_window(
            &mut memory,
            config.sid_base,
            SID_WINDOW,
            &sid,
            |sid: &mut Sid, reg| sid.read(reg),
            Sid::write,
        )?;
        map_window(&mut memory, config.cia1_base, CIA_WINDOW, &cia1, Cia::read, Cia::write)?;
        map_window(&mut memory, config.cia2_base, CIA_WINDOW, &cia2, Cia::read, Cia::write)?;

        let mailboxes = Mailboxes::new(config.mailboxes, config.random_seed);
        mailboxes.install(&mut memory)?;

        let mut sync = Synchronizer::new(config.cycles_per_frame());
        sync.attach(vic.clone());
        sync.attach(cia1.clone());
        sync.attach(cia2.clone());
        sync.attach(sid.clone());

        let mut c64 = Self {
            config: config.clone(),
            cpu: Mos6502::new(),
            memory,
            board: Board {
                sync,
                interrupts: InterruptLines::new(),
                iec: IecBus::new(),
                cia2,
                master_clock: 0,
            },
            vic,
            sid,
            cia1,
            mailboxes,
            input_queue: InputQueue::new(),
            awaiting_ack: false,
            ack_waited: 0,
            frame_pending: false,
            started_frame: None,
        };
        c64.reset(None);
        Ok(c64)
    }

    /// Reset the CPU and every chip. RAM is kept. `entry` overrides the
    /// reset vector.
    pub fn reset(&mut self, entry: Option<u16>) {
        self.vic.borrow_mut().reset();
        self.sid.borrow_mut().reset();
        self.cia1.borrow_mut().reset();
        {
            let mut cia2 = self.board.cia2.borrow_mut();
            cia2.reset();
            cia2.port_a.ddr = CIA2_DDR_A;
            cia2.port_a.output = CIA2_PORT_A;
        }
        self.board.interrupts.clear();
        self.board.iec.release_all();
        self.board.wire_iec();
        self.board.sync.reset_frame();
        self.mailboxes.clear();
        self.input_queue.clear();
        self.awaiting_ack = false;
        self.ack_waited = 0;
        self.frame_pending = false;
        self.started_frame = None;

        match entry {
            Some(pc) => self.cpu.reset_to(pc),
            None => self.cpu.reset(&mut self.memory),
        }
        log::debug!("system reset, entry ${:04X}", self.cpu.pc());
    }

    /// Load a PRG image at its embedded address.
    ///
    /// # Errors
    ///
    /// [`C64Error::Prg`] if the image has no load address.
    pub fn load_binary(&mut self, bytes: &[u8]) -> Result<LoadInfo, C64Error> {
        let info = format_prg::load(&mut self.memory, bytes)?;
        Ok(info)
    }

    /// Write raw bytes, e.g. a ROM image, through the bus.
    pub fn store_data(&mut self, start: u16, bytes: &[u8]) {
        self.memory.store_data(start, bytes);
    }

    /// Run until one frame boundary has passed (and, when enabled, the
    /// program has acknowledged it or another frame has ended) or a stop
    /// condition fires.
    pub fn run_one_frame(&mut self, policy: &mut ExecPolicy) -> FrameResult {
        let mut state = ExecState::new();
        let stop = self.run_frame_with(policy, &mut state);
        FrameResult::new(stop, &state)
    }

    /// Run frames until `policy` stops. Budgets span the whole call.
    pub fn execute(&mut self, policy: &mut ExecPolicy) -> (StopReason, ExecState) {
        let mut state = ExecState::new();
        loop {
            if let Some(reason) = self.run_frame_with(policy, &mut state) {
                return (reason, state);
            }
        }
    }

    /// Execute one instruction (or interrupt entry) with peripherals synced.
    ///
    /// # Errors
    ///
    /// An [`StopKind::UnhandledOpcode`] stop for an undecodable opcode.
    pub fn run_one_instruction(&mut self) -> Result<InstructionResult, StopReason> {
        self.begin_frame();
        let mut state = ExecState::new();
        let result = ExecPolicy::step(&mut self.cpu, &mut self.memory, &mut state)?;
        self.frame_pending |= self
            .board
            .after_instruction(&mut self.cpu, &mut self.memory, result.cycles);
        self.note_ack();
        self.take_frame_end();
        Ok(result)
    }

    fn run_frame_with(&mut self, policy: &mut ExecPolicy, state: &mut ExecState) -> Option<StopReason> {
        if self.awaiting_ack {
            match self.wait_for_ack(policy, state) {
                AckWait::Acknowledged => {}
                AckWait::FrameEnded => return None,
                AckWait::Stopped(reason) => return Some(reason),
            }
        }

        self.begin_frame();
        let outcome = self.run_chunk(policy, state, false);
        let frame_ended = self.take_frame_end();
        if let RunOutcome::Stopped(reason) = outcome {
            return Some(reason);
        }
        if frame_ended && self.awaiting_ack {
            if let AckWait::Stopped(reason) = self.wait_for_ack(policy, state) {
                return Some(reason);
            }
        }
        None
    }

    /// Run under `policy` until a frame boundary or a stop, or for a single
    /// instruction when `single` is set.
    fn run_chunk(
        &mut self,
        policy: &mut ExecPolicy,
        state: &mut ExecState,
        single: bool,
    ) -> RunOutcome {
        let Self {
            cpu,
            memory,
            board,
            frame_pending,
            ..
        } = self;
        policy.run(cpu, memory, state, |cpu, memory, result| {
            if board.after_instruction(cpu, memory, result.cycles) {
                *frame_pending = true;
                Control::Yield
            } else if single {
                Control::Yield
            } else {
                Control::Continue
            }
        })
    }

    /// Input events due by the current frame, and one random byte per frame.
    fn begin_frame(&mut self) {
        let frame = self.board.sync.frame().frames();
        self.input_queue
            .process(frame, &self.mailboxes, &mut self.memory);
        if self.started_frame != Some(frame) {
            self.mailboxes.refresh_random(&mut self.memory);
            self.started_frame = Some(frame);
        }
    }

    /// Announce a frame boundary crossed since the last call, then start
    /// the next frame. Returns whether there was one.
    fn take_frame_end(&mut self) -> bool {
        if !std::mem::take(&mut self.frame_pending) {
            return false;
        }
        let status = self.mailboxes.frame_status(&self.memory);
        self.mailboxes
            .set_frame_status(&mut self.memory, status | FRAME_NEW | FRAME_DONE);
        if self.config.wait_for_frame_ack && !self.awaiting_ack {
            self.awaiting_ack = true;
            self.ack_waited = 0;
        }
        self.begin_frame();
        true
    }

    /// Finish an acknowledge the program has given. Returns true if the
    /// frame is acknowledged.
    fn note_ack(&mut self) -> bool {
        if !self.awaiting_ack {
            return false;
        }
        let status = self.mailboxes.frame_status(&self.memory);
        if status & FRAME_NEW != 0 {
            return false;
        }
        self.mailboxes
            .set_frame_status(&mut self.memory, status & !FRAME_DONE);
        self.awaiting_ack = false;
        true
    }

    /// Keep executing until the program clears the new-frame bit. The
    /// cycle cap counts from the first unacknowledged frame end, across
    /// calls.
    fn wait_for_ack(&mut self, policy: &mut ExecPolicy, state: &mut ExecState) -> AckWait {
        let cap = self.config.frame_ack_max_cycles;
        loop {
            if self.note_ack() {
                return AckWait::Acknowledged;
            }
            if self.ack_waited >= cap {
                let waited = self.ack_waited;
                log::warn!("frame acknowledge not seen after {waited} cycles");
                return AckWait::Stopped(StopReason::new(
                    StopKind::FrameAckTimeout,
                    format!(
                        "frame status ${:04X} still ${:02X} after {waited} cycles (cap {cap})",
                        self.config.mailboxes.frame_status,
                        self.mailboxes.frame_status(&self.memory)
                    ),
                ));
            }

            let before = state.cycles;
            let outcome = self.run_chunk(policy, state, true);
            self.ack_waited += state.cycles - before;
            // An acknowledge in the instruction that ended a frame is for
            // the earlier frame
            let acknowledged = self.note_ack();
            let frame_ended = self.take_frame_end();
            if let RunOutcome::Stopped(reason) = outcome {
                return AckWait::Stopped(reason);
            }
            if frame_ended {
                return AckWait::FrameEnded;
            }
            if acknowledged {
                return AckWait::Acknowledged;
            }
        }
    }

    #[must_use]
    pub fn config(&self) -> &C64Config {
        &self.config
    }

    #[must_use]
    pub fn cpu(&self) -> &Mos6502 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Mos6502 {
        &mut self.cpu
    }

    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    #[must_use]
    pub fn vic(&self) -> Ref<'_, Vic> {
        self.vic.borrow()
    }

    #[must_use]
    pub fn sid(&self) -> Ref<'_, Sid> {
        self.sid.borrow()
    }

    #[must_use]
    pub fn cia1(&self) -> Ref<'_, Cia> {
        self.cia1.borrow()
    }

    #[must_use]
    pub fn cia2(&self) -> Ref<'_, Cia> {
        self.board.cia2.borrow()
    }

    /// CIA1 for driving its port inputs.
    pub fn cia1_mut(&mut self) -> RefMut<'_, Cia> {
        self.cia1.borrow_mut()
    }

    #[must_use]
    pub fn iec(&self) -> &IecBus {
        &self.board.iec
    }

    pub fn iec_mut(&mut self) -> &mut IecBus {
        &mut self.board.iec
    }

    #[must_use]
    pub fn mailboxes(&self) -> &Mailboxes {
        &self.mailboxes
    }

    pub fn input_queue(&mut self) -> &mut InputQueue {
        &mut self.input_queue
    }

    /// Front frame handle for a render thread.
    #[must_use]
    pub fn frame_handle(&self) -> FrameHandle {
        self.vic.borrow().frame_handle()
    }

    #[must_use]
    pub fn current_frame(&self) -> Arc<Frame> {
        self.vic.borrow().current_frame()
    }

    /// Consumer end of the audio queue; available once.
    pub fn take_audio_consumer(&mut self) -> Option<AudioConsumer> {
        self.sid.borrow_mut().take_audio_consumer()
    }

    #[must_use]
    pub fn latest_audio(&self) -> Option<Arc<[f32]>> {
        self.sid.borrow().latest_audio()
    }

    /// Completed frames since construction.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.board.sync.frame().frames()
    }

    /// CPU cycles since construction.
    #[must_use]
    pub fn master_clock(&self) -> u64 {
        self.board.master_clock
    }

    #[must_use]
    pub fn awaiting_frame_ack(&self) -> bool {
        self.awaiting_ack
    }

    /// What a CPU read of `address` would return, without the read's side
    /// effects. Register windows answer from their chip, the clear-on-read
    /// mailboxes from their pending value.
    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        let config = &self.config;
        if let Some(reg) = window_offset(address, config.vic_base, mos_vic_ii::REGISTER_WINDOW) {
            self.vic.borrow().peek(reg)
        } else if let Some(reg) = window_offset(address, config.sid_base, SID_WINDOW) {
            self.sid.borrow().read(reg)
        } else if let Some(reg) = window_offset(address, config.cia1_base, CIA_WINDOW) {
            self.cia1.borrow().peek(reg)
        } else if let Some(reg) = window_offset(address, config.cia2_base, CIA_WINDOW) {
            self.board.cia2.borrow().peek(reg)
        } else if address == config.mailboxes.key_pressed {
            self.mailboxes.peek_pressed()
        } else if address == config.mailboxes.key_released {
            self.mailboxes.peek_released()
        } else {
            self.memory.peek(address)
        }
    }
}

/// Register number of `address` within the `len`-byte window at `base`.
fn window_offset(address: u16, base: u16, len: u16) -> Option<u8> {
    let offset = address.wrapping_sub(base);
    (offset < len).then_some(offset as u8)
}

/// Hook `len` addresses from `base` to a chip's register file.
fn map_window<T: 'static>(
    memory: &mut Memory,
    base: u16,
    len: u16,
    chip: &Rc<RefCell<T>>,
    read: fn(&mut T, u8) -> u8,
    write: fn(&mut T, u8, u8),
) -> Result<(), emu_core::BusError> {
    let range = base..=base + (len - 1);
    let reader = Rc::clone(chip);
    memory.map_reader_range(range.clone(), move |address| {
        read(&mut reader.borrow_mut(), (address - base) as u8)
    })?;
    let writer = Rc::clone(chip);
    memory.map_writer_range(range, move |address, value| {
        write(&mut writer.borrow_mut(), (address - base) as u8, value);
    })
}

const QUERY_PATHS: &[&str] = &[
    "frame_count",
    "master_clock",
    "cpu.<path>",
    "cia1.<path>",
    "cia2.<path>",
    "vic.<path>",
    "sid.<path>",
    "iec.<path>",
    "memory.<address>",
];

impl Observable for C64 {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            self.cpu.query(rest)
        } else if let Some(rest) = path.strip_prefix("cia1.") {
            self.cia1.borrow().query(rest)
        } else if let Some(rest) = path.strip_prefix("cia2.") {
            self.board.cia2.borrow().query(rest)
        } else if let Some(rest) = path.strip_prefix("vic.") {
            self.vic.borrow().query(rest)
        } else if let Some(rest) = path.strip_prefix("sid.") {
            self.sid.borrow().query(rest)
        } else if let Some(rest) = path.strip_prefix("iec.") {
            self.board.iec.query(rest)
        } else if let Some(rest) = path.strip_prefix("memory.") {
            parse_address(rest).map(|addr| self.peek(addr).into())
        } else {
            match path {
                "frame_count" => Some(self.frame_count().into()),
                "master_clock" => Some(self.master_clock().into()),
                _ => None,
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
