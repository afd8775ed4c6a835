//! MOS 6581 SID.
//!
//! The sound registers are write-only, so the chip works from shadow
//! copies. Writes land in [`ShadowRegisters`]; at every end of frame each
//! voice's state machine turns what changed into [`VoiceCommand`]s, the
//! commands drive the envelopes, and the cycles consumed during the frame
//! are rendered into one mono `f32` buffer.
//!
//! Finished buffers are shared as `Arc<[f32]>`: once published they are
//! never written again. They go to a single-producer ring whose consumer
//! end can be moved to an audio thread, and the newest is also kept for
//! pull-based access.
//!
//! | Reg       | Register                 |
//! |-----------|--------------------------|
//! | $00-$06   | Voice 1 (freq, PW, control, AD, SR) |
//! | $07-$0D   | Voice 2                  |
//! | $0E-$14   | Voice 3                  |
//! | $15-$17   | Filter (stored, not applied) |
//! | $18       | Mode / volume            |
//! | $1B       | OSC3 (read)              |
//! | $1C       | ENV3 (read)              |

mod envelope;
mod oscillator;
pub mod registers;
mod voice;

use std::sync::Arc;

use emu_core::{Observable, Peripheral, SyncContext, Value};
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

pub use envelope::{Adsr, Envelope, Phase};
pub use oscillator::Oscillator;
pub use registers::{ShadowRegisters, VoiceDeltas, VoiceRegisters};
pub use voice::{VoiceCommand, VoiceState, VoiceStatus};

/// Consumer end of the audio queue.
pub type AudioConsumer = HeapCons<Arc<[f32]>>;

/// Frames of audio the queue holds before new buffers are dropped.
const QUEUE_FRAMES: usize = 16;

/// Full-scale sum of three centred 12-bit voices.
const MIX_SCALE: f32 = 3.0 * 2048.0;

const OSC3: u8 = 0x1B;
const ENV3: u8 = 0x1C;

/// One voice: state machine, envelope and oscillator.
#[derive(Debug, Clone, Default)]
struct Voice {
    state: VoiceState,
    envelope: Envelope,
    oscillator: Oscillator,
    last_commands: Vec<VoiceCommand>,
}

impl Voice {
    fn apply(&mut self, command: VoiceCommand) {
        match command {
            VoiceCommand::StartAttackDecaySustain => self.envelope.start_attack(),
            VoiceCommand::StartRelease => self.envelope.start_release(),
            VoiceCommand::Stop => self.envelope.stop(),
            // The oscillator reads pitch from the shadow registers
            VoiceCommand::ChangeFrequency | VoiceCommand::ChangePulseWidth => {}
        }
    }
}

fn adsr(regs: &VoiceRegisters) -> Adsr {
    Adsr {
        attack: regs.attack,
        decay: regs.decay,
        sustain: regs.sustain,
        release: regs.release,
    }
}

pub struct Sid {
    registers: ShadowRegisters,
    voices: [Voice; 3],
    /// CPU cycles per output sample.
    cycles_per_sample: f64,
    /// Fractional cycles not yet turned into a sample.
    sample_phase: f64,
    pending_cycles: u64,
    producer: HeapProd<Arc<[f32]>>,
    consumer: Option<AudioConsumer>,
    latest: Option<Arc<[f32]>>,
    frames: u64,
}

impl Sid {
    /// `clock_hz` is the CPU clock, `sample_rate` the output rate in Hz.
    #[must_use]
    pub fn new(clock_hz: u32, sample_rate: u32) -> Self {
        let (producer, consumer) = HeapRb::<Arc<[f32]>>::new(QUEUE_FRAMES).split();
        Self {
            registers: ShadowRegisters::new(),
            voices: Default::default(),
            cycles_per_sample: f64::from(clock_hz) / f64::from(sample_rate.max(1)),
            sample_phase: 0.0,
            pending_cycles: 0,
            producer,
            consumer: Some(consumer),
            latest: None,
            frames: 0,
        }
    }

    /// CPU write to register `reg` (`$00`-`$1F`).
    pub fn write(&mut self, reg: u8, value: u8) {
        self.registers.write(reg & 0x1F, value);
    }

    /// CPU read. Only OSC3 and ENV3 read back; the rest float to zero.
    #[must_use]
    pub fn read(&self, reg: u8) -> u8 {
        match reg & 0x1F {
            OSC3 => {
                let regs = self.registers.voice(2);
                let ring = self.voices[1].oscillator.msb();
                let wave = self.voices[2]
                    .oscillator
                    .output(regs.control, regs.pulse_width, ring);
                wave.to_be_bytes()[0] << 4 | wave.to_be_bytes()[1] >> 4
            }
            ENV3 => self.voices[2].envelope.level(),
            _ => 0,
        }
    }

    #[must_use]
    pub fn registers(&self) -> &ShadowRegisters {
        &self.registers
    }

    #[must_use]
    pub fn voice_status(&self, voice: usize) -> Option<VoiceStatus> {
        self.voices.get(voice).map(|v| v.state.status())
    }

    #[must_use]
    pub fn envelope(&self, voice: usize) -> Option<&Envelope> {
        self.voices.get(voice).map(|v| &v.envelope)
    }

    /// Commands voice `voice` emitted at the last end of frame.
    #[must_use]
    pub fn last_commands(&self, voice: usize) -> &[VoiceCommand] {
        self.voices.get(voice).map_or(&[], |v| &v.last_commands)
    }

    /// The consumer end of the audio queue. Handed out once.
    pub fn take_audio_consumer(&mut self) -> Option<AudioConsumer> {
        self.consumer.take()
    }

    /// The most recently completed buffer.
    #[must_use]
    pub fn latest_audio(&self) -> Option<Arc<[f32]>> {
        self.latest.clone()
    }

    /// Completed frames.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Account for cycles run since the last frame.
    pub fn add_cycles(&mut self, cycles: u32) {
        self.pending_cycles += u64::from(cycles);
    }

    /// Derive voice commands, render the pending cycles and publish the
    /// buffer.
    pub fn end_frame(&mut self) {
        for (n, voice) in (0u8..).zip(self.voices.iter_mut()) {
            let regs = self.registers.voice(n);
            let commands = voice.state.update(&regs, self.registers.voice_deltas(n));
            for &command in &commands {
                log::trace!("sid voice {}: {command:?}", n + 1);
                voice.apply(command);
            }
            voice.last_commands = commands;
        }
        self.registers.clear_dirty();

        let samples = self.render();
        self.publish(samples.into());
        self.frames += 1;
    }

    fn render(&mut self) -> Vec<f32> {
        #[allow(clippy::cast_precision_loss)]
        let cycles = self.pending_cycles as f64;
        self.pending_cycles = 0;
        self.sample_phase += cycles;

        let volume = f32::from(self.registers.volume()) / 15.0;
        let voice_regs = [0, 1, 2].map(|n| self.registers.voice(n));
        let capacity = (self.sample_phase / self.cycles_per_sample) as usize;
        let mut samples = Vec::with_capacity(capacity);
        let mut spent = 0.0;

        while self.sample_phase >= self.cycles_per_sample {
            self.sample_phase -= self.cycles_per_sample;
            // Whole cycles covered by this sample, carrying the fraction
            spent += self.cycles_per_sample;
            let step = spent as u32;
            spent -= f64::from(step);

            let mut mix = 0.0_f32;
            for n in 0..3 {
                let regs = &voice_regs[n];
                let ring = self.voices[(n + 2) % 3].oscillator.msb();
                let voice = &mut self.voices[n];
                voice.oscillator.clock(regs.frequency, regs.control, step);
                if voice.envelope.advance(adsr(regs), step) {
                    voice.state.release_finished();
                }
                let wave = voice.oscillator.output(regs.control, regs.pulse_width, ring);
                let centred = f32::from(wave) - 2048.0;
                mix += centred * f32::from(voice.envelope.level()) / 255.0;
            }
            samples.push(mix * volume / MIX_SCALE);
        }
        samples
    }

    fn publish(&mut self, buffer: Arc<[f32]>) {
        if self.producer.try_push(Arc::clone(&buffer)).is_err() {
            log::trace!("audio queue full, dropping frame {}", self.frames);
        }
        self.latest = Some(buffer);
    }

    pub fn reset(&mut self) {
        self.registers = ShadowRegisters::new();
        self.voices = Default::default();
        self.sample_phase = 0.0;
        self.pending_cycles = 0;
        self.latest = None;
    }
}

impl Peripheral for Sid {
    fn on_after_instruction(&mut self, cycles: u32, _ctx: &mut SyncContext<'_>) {
        self.add_cycles(cycles);
    }

    fn on_end_frame(&mut self, _ctx: &mut SyncContext<'_>) {
        self.end_frame();
    }
}

const QUERY_PATHS: &[&str] = &[
    "volume",
    "frames",
    "voice1.status",
    "voice1.level",
    "voice1.frequency",
    "voice2.status",
    "voice2.level",
    "voice2.frequency",
    "voice3.status",
    "voice3.level",
    "voice3.frequency",
];

impl Observable for Sid {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "volume" => return Some(self.registers.volume().into()),
            "frames" => return Some(self.frames.into()),
            _ => {}
        }
        let (voice, field) = path.split_once('.')?;
        let n: u8 = voice.strip_prefix("voice")?.parse().ok()?;
        let index = n.checked_sub(1).filter(|&i| i < 3)?;
        let state = &self.voices[usize::from(index)];
        match field {
            "status" => Some(format!("{:?}", state.state.status()).as_str().into()),
            "level" => Some(state.envelope.level().into()),
            "frequency" => Some(self.registers.voice(index).frequency.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{ATTACK_DECAY, CONTROL, FREQ_HI, MODE_VOLUME, SUSTAIN_RELEASE};
    use ringbuf::traits::{Consumer, Observer};

    const PAL_CLOCK: u32 = 985_248;
    const PAL_FRAME: u32 = 19_656;

    fn run_frame(sid: &mut Sid) {
        sid.add_cycles(PAL_FRAME);
        sid.end_frame();
    }

    #[test]
    fn gate_on_from_stopped_emits_start() {
        let mut sid = Sid::new(PAL_CLOCK, 48_000);
        sid.write(CONTROL, 0x20);
        run_frame(&mut sid);
        assert!(sid.last_commands(0).is_empty());

        sid.write(CONTROL, 0x21);
        run_frame(&mut sid);
        assert_eq!(
            sid.last_commands(0),
            [VoiceCommand::StartAttackDecaySustain]
        );
        assert_eq!(
            sid.voice_status(0),
            Some(VoiceStatus::AttackDecaySustainStarted)
        );
    }

    #[test]
    fn release_runs_out_to_stopped() {
        let mut sid = Sid::new(PAL_CLOCK, 48_000);
        sid.write(SUSTAIN_RELEASE, 0xF0);
        sid.write(CONTROL, 0x11);
        run_frame(&mut sid);
        sid.write(CONTROL, 0x10);
        run_frame(&mut sid);
        assert_eq!(sid.last_commands(0), [VoiceCommand::StartRelease]);
        // Release rate 0 empties well within one frame
        run_frame(&mut sid);
        assert_eq!(sid.voice_status(0), Some(VoiceStatus::Stopped));
    }

    #[test]
    fn one_buffer_per_frame_at_sample_rate() {
        let mut sid = Sid::new(PAL_CLOCK, 48_000);
        let mut consumer = sid.take_audio_consumer().expect("consumer");
        assert!(sid.take_audio_consumer().is_none());

        run_frame(&mut sid);
        run_frame(&mut sid);
        let first = consumer.try_pop().expect("frame 1");
        let second = consumer.try_pop().expect("frame 2");
        // 19656 * 48000 / 985248 = 957.6 samples per frame
        assert!((957..=958).contains(&first.len()));
        assert!((957..=958).contains(&second.len()));
        assert_eq!(first.len() + second.len(), 1915);
        assert!(consumer.try_pop().is_none());
    }

    #[test]
    fn silent_until_a_voice_sounds() {
        let mut sid = Sid::new(PAL_CLOCK, 48_000);
        sid.write(MODE_VOLUME, 0x0F);
        run_frame(&mut sid);
        let quiet = sid.latest_audio().expect("buffer");
        assert!(quiet.iter().all(|s| s.abs() < 1e-6));

        sid.write(FREQ_HI, 0x1D);
        sid.write(ATTACK_DECAY, 0x00);
        sid.write(SUSTAIN_RELEASE, 0xF0);
        sid.write(CONTROL, 0x21);
        run_frame(&mut sid);
        run_frame(&mut sid);
        let loud = sid.latest_audio().expect("buffer");
        assert!(loud.iter().any(|s| s.abs() > 0.05));
        assert!(loud.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn full_queue_drops_new_buffers_but_keeps_latest() {
        let mut sid = Sid::new(PAL_CLOCK, 48_000);
        let mut consumer = sid.take_audio_consumer().expect("consumer");
        for _ in 0..QUEUE_FRAMES + 4 {
            run_frame(&mut sid);
        }
        assert_eq!(consumer.occupied_len(), QUEUE_FRAMES);
        assert_eq!(sid.frames(), (QUEUE_FRAMES + 4) as u64);
        assert!(sid.latest_audio().is_some());
    }

    #[test]
    fn env3_reads_voice_three_level() {
        let mut sid = Sid::new(PAL_CLOCK, 48_000);
        let base = 2 * registers::VOICE_STRIDE;
        sid.write(base + SUSTAIN_RELEASE, 0xF0);
        sid.write(base + CONTROL, 0x11);
        run_frame(&mut sid);
        run_frame(&mut sid);
        assert_eq!(sid.read(ENV3), 0xFF);
        assert_eq!(sid.read(0x00), 0);
    }

    #[test]
    fn voice_queries() {
        let mut sid = Sid::new(PAL_CLOCK, 48_000);
        sid.write(CONTROL, 0x21);
        run_frame(&mut sid);
        assert_eq!(
            sid.query("voice1.status"),
            Some(Value::Text("AttackDecaySustainStarted".into()))
        );
        assert_eq!(sid.query("voice4.status"), None);
        assert_eq!(sid.query("voice0.level"), None);
    }
}
