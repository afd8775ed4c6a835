//! Whole-system tests: programs run on the wired C64, observed through
//! memory, queries and the published frame and audio.

use emu_c64::iec_protocol::ListenerDevice;
use emu_c64::{C64, C64Config, C64Error, ConfigError, ExecPolicy, StopKind};
use emu_core::{Bus, Observable, Value};
use mos_sid_6581::VoiceStatus;
use mos_vic_ii::palette;

fn config() -> C64Config {
    C64Config {
        random_seed: Some(7),
        ..C64Config::default()
    }
}

/// Store `code` at $C000 and reset into it.
fn setup_program(config: &C64Config, code: &[u8]) -> C64 {
    let mut c64 = C64::new(config).expect("valid config");
    c64.store_data(0xC000, code);
    c64.reset(Some(0xC000));
    c64
}

#[test]
fn average_of_two_bytes_stops_on_brk() {
    // Keep $D000-$D002 as plain RAM
    let config = C64Config {
        vic_base: 0xE000,
        ..config()
    };
    let mut c64 = setup_program(
        &config,
        &[
            0xA9, 0x0C, // LDA #$0C
            0x18, // CLC
            0x6D, 0x01, 0xD0, // ADC $D001
            0x6A, // ROR
            0x8D, 0x02, 0xD0, // STA $D002
            0x00, // BRK
        ],
    );
    c64.store_data(0xD000, &[12, 30]);

    let result = c64.run_one_frame(&mut ExecPolicy::new().stop_on_brk());
    assert!(!result.keep_running);
    let stop = result.stop.expect("stopped");
    assert_eq!(stop.kind, StopKind::Opcode);
    assert!(!stop.is_failure());
    assert_eq!(c64.memory().peek(0xD002), 21);
    assert_eq!(c64.cpu().pc(), 0xC00A);
}

#[test]
fn prg_payload_lands_at_its_load_address() {
    let mut c64 = C64::new(&config()).expect("valid config");
    let info = c64
        .load_binary(&[0x00, 0xC0, 0xA9, 0x01, 0x60])
        .expect("load");
    assert_eq!(info.load_address, 0xC000);
    assert_eq!(info.len, 3);
    assert_eq!(c64.memory().peek(0xC000), 0xA9);
    assert_eq!(c64.memory().peek(0xC002), 0x60);
}

#[test]
fn prg_without_load_address_is_rejected() {
    let mut c64 = C64::new(&config()).expect("valid config");
    assert!(matches!(c64.load_binary(&[0x01]), Err(C64Error::Prg(_))));
}

#[test]
fn invalid_config_reports_every_violation() {
    let bad = C64Config {
        screen_ram: 0xD000,
        sample_rate: 0,
        ..config()
    };
    let Err(C64Error::Config(ConfigError::Invalid(violations))) = C64::new(&bad) else {
        panic!("expected configuration violations");
    };
    assert!(violations.len() >= 2, "{violations:?}");
    assert!(violations.iter().any(|v| v.contains("VIC registers")));
    assert!(violations.iter().any(|v| v.contains("sample rate")));
}

/// Waits for bit 0 of the frame status, clears it and counts the acks.
const ACK_LOOP: [u8; 18] = [
    0xAD, 0x00, 0xCF, // C000 LDA $CF00
    0x29, 0x01, // C003 AND #$01
    0xF0, 0xF9, // C005 BEQ $C000
    0xA9, 0x02, // C007 LDA #$02
    0x8D, 0x00, 0xCF, // C009 STA $CF00
    0xEE, 0x00, 0xC1, // C00C INC $C100
    0x4C, 0x00, 0xC0, // C00F JMP $C000
];

#[test]
fn frame_ack_waits_for_the_program() {
    let config = C64Config {
        wait_for_frame_ack: true,
        ..config()
    };
    let mut c64 = setup_program(&config, &ACK_LOOP);
    let result = c64.run_one_frame(&mut ExecPolicy::new());
    assert!(result.keep_running, "{:?}", result.stop);
    assert!(!c64.awaiting_frame_ack());
    assert_eq!(c64.memory().peek(0xC100), 1);
    // Program cleared bit 0, the core then cleared bit 1
    assert_eq!(c64.memory().peek(0xCF00), 0);

    c64.run_one_frame(&mut ExecPolicy::new());
    assert_eq!(c64.memory().peek(0xC100), 2);
}

#[test]
fn frame_ack_times_out_when_never_cleared() {
    let config = C64Config {
        wait_for_frame_ack: true,
        frame_ack_max_cycles: 5_000,
        ..config()
    };
    // JMP $C000
    let mut c64 = setup_program(&config, &[0x4C, 0x00, 0xC0]);
    let result = c64.run_one_frame(&mut ExecPolicy::new());
    let stop = result.stop.expect("timed out");
    assert_eq!(stop.kind, StopKind::FrameAckTimeout);
    assert!(stop.is_failure());
    assert!(c64.awaiting_frame_ack());
    let per_frame = u64::from(config.cycles_per_frame());
    assert!(result.cycles >= per_frame + 5_000);
}

#[test]
fn frame_ack_wait_honours_the_cycle_budget() {
    let config = C64Config {
        wait_for_frame_ack: true,
        ..config()
    };
    let mut c64 = setup_program(&config, &[0x4C, 0x00, 0xC0]);
    let budget = u64::from(config.cycles_per_frame()) + 300;
    let result = c64.run_one_frame(&mut ExecPolicy::new().with_max_cycles(budget));
    assert_eq!(result.stop.map(|s| s.kind), Some(StopKind::CycleBudget));
    assert!(c64.awaiting_frame_ack());
}

#[test]
fn frame_ack_wait_stops_on_a_breakpoint() {
    let config = C64Config {
        wait_for_frame_ack: true,
        ..config()
    };
    let mut c64 = setup_program(&config, &[0x4C, 0x00, 0xC0]);
    let per_frame = u64::from(config.cycles_per_frame());
    let mut policy = ExecPolicy::new()
        .with_breakpoint(move |cpu, state| state.cycles >= per_frame + 30 && cpu.pc() == 0xC000);
    let result = c64.run_one_frame(&mut policy);
    assert_eq!(result.stop.map(|s| s.kind), Some(StopKind::Breakpoint));
    assert!(result.cycles < per_frame + 40);
    assert!(c64.awaiting_frame_ack());
    assert_eq!(c64.frame_count(), 1);
}

#[test]
fn breakpoint_on_the_frame_end_still_announces_the_frame() {
    let mut c64 = setup_program(&config(), &[0x4C, 0x00, 0xC0]);
    let per_frame = u64::from(config().cycles_per_frame());
    let mut policy = ExecPolicy::new().with_breakpoint(move |_, state| state.cycles >= per_frame);
    let result = c64.run_one_frame(&mut policy);
    assert_eq!(result.stop.map(|s| s.kind), Some(StopKind::Breakpoint));
    assert_eq!(c64.frame_count(), 1);
    assert_eq!(c64.memory().peek(0xCF00), 0x03);

    c64.memory_mut().write(0xCF00, 0);
    let result = c64.run_one_frame(&mut ExecPolicy::new());
    assert!(result.keep_running);
    assert!(result.cycles < per_frame + 3);
    assert_eq!(c64.frame_count(), 2);
    assert_eq!(c64.memory().peek(0xCF00), 0x03);
}

#[test]
fn frames_ending_during_the_ack_wait_are_announced() {
    let config = C64Config {
        wait_for_frame_ack: true,
        ..config()
    };
    // JMP $C000, never acknowledges
    let mut c64 = setup_program(&config, &[0x4C, 0x00, 0xC0]);
    let per_frame = u64::from(config.cycles_per_frame());
    c64.input_queue().enqueue_key(0x41, 2, 1);

    let result = c64.run_one_frame(&mut ExecPolicy::new());
    assert!(result.keep_running);
    assert!(result.cycles < 2 * per_frame + 3);
    assert_eq!(c64.frame_count(), 2);
    assert!(c64.awaiting_frame_ack());
    // Frame 2 started inside the wait and got its input
    assert_eq!(c64.memory().peek(0xCF02), 0x41);

    // Drop the done bit; the next frame end sets it again
    c64.memory_mut().write(0xCF00, 0x01);
    let result = c64.run_one_frame(&mut ExecPolicy::new());
    assert!(result.keep_running);
    assert!(result.cycles < per_frame + 3);
    assert_eq!(c64.frame_count(), 3);
    assert_eq!(c64.memory().peek(0xCF00), 0x03);
    assert_eq!(c64.memory().peek(0xCF02), 0);
}

#[test]
fn slow_acknowledge_never_spans_more_than_two_frames() {
    let config = C64Config {
        wait_for_frame_ack: true,
        ..config()
    };
    let mut c64 = setup_program(
        &config,
        &[
            0xAD, 0x00, 0xCF, // C000 LDA $CF00
            0x29, 0x01, // C003 AND #$01
            0xF0, 0xF9, // C005 BEQ $C000
            0xA2, 0x20, // C007 LDX #$20
            0xA0, 0x00, // C009 LDY #$00
            0x88, // C00B DEY
            0xD0, 0xFD, // C00C BNE $C00B
            0xCA, // C00E DEX
            0xD0, 0xF8, // C00F BNE $C009
            0xA9, 0x02, // C011 LDA #$02
            0x8D, 0x00, 0xCF, // C013 STA $CF00
            0xEE, 0x00, 0xC1, // C016 INC $C100
            0x4C, 0x00, 0xC0, // C019 JMP $C000
        ],
    );
    let per_frame = u64::from(config.cycles_per_frame());
    for call in 1..=4 {
        let result = c64.run_one_frame(&mut ExecPolicy::new());
        assert!(result.keep_running, "{:?}", result.stop);
        assert!(result.cycles < 2 * per_frame + 10, "call {call}: {} cycles", result.cycles);
        assert!(c64.frame_count() <= 2 * call);
    }
    assert!(c64.memory().peek(0xC100) >= 1);
}

#[test]
fn cia1_timer_interrupts_the_cpu() {
    let mut c64 = setup_program(
        &config(),
        &[
            0xA9, 0x00, 0x8D, 0x04, 0xDC, // timer A latch lo = $00
            0xA9, 0x01, 0x8D, 0x05, 0xDC, // latch hi = $01
            0xA9, 0x81, 0x8D, 0x0D, 0xDC, // enable timer A interrupt
            0xA9, 0x01, 0x8D, 0x0E, 0xDC, // start, continuous
            0x58, // CLI
            0x4C, 0x15, 0xC0, // JMP *
        ],
    );
    c64.store_data(
        0xC100,
        &[
            0xEE, 0x00, 0xC2, // INC $C200
            0xAD, 0x0D, 0xDC, // LDA $DC0D (acknowledge)
            0x40, // RTI
        ],
    );
    c64.store_data(0xFFFE, &[0x00, 0xC1]);

    let result = c64.run_one_frame(&mut ExecPolicy::new());
    assert!(result.keep_running);
    // 19656 cycles at one underflow per 256
    let count = c64.memory().peek(0xC200);
    assert!((70..=77).contains(&count), "{count} interrupts");
    assert_eq!(c64.query("cia1.timer_a.running"), Some(Value::Bool(true)));
}

#[test]
fn key_mailboxes_follow_the_input_queue() {
    let mut c64 = setup_program(
        &config(),
        &[
            0xAD, 0x01, 0xCF, // C000 LDA $CF01
            0xF0, 0xFB, // C003 BEQ $C000
            0x8D, 0x00, 0xC3, // C005 STA $C300
            0x4C, 0x08, 0xC0, // C008 JMP *
        ],
    );
    c64.input_queue().enqueue_key(0x41, 0, 2);

    c64.run_one_frame(&mut ExecPolicy::new());
    assert_eq!(c64.memory().peek(0xC300), 0x41);
    // The program's read consumed it
    assert_eq!(c64.mailboxes().peek_pressed(), 0);
    assert_eq!(c64.memory().peek(0xCF02), 0x41);

    c64.run_one_frame(&mut ExecPolicy::new());
    c64.run_one_frame(&mut ExecPolicy::new());
    assert_eq!(c64.memory().peek(0xCF02), 0);
    assert_eq!(c64.mailboxes().peek_released(), 0x41);
    assert!(c64.input_queue().is_empty());
}

#[test]
fn seeded_random_mailbox_is_reproducible() {
    let run = || {
        let mut c64 = setup_program(&config(), &[0x4C, 0x00, 0xC0]);
        (0..4)
            .map(|_| {
                c64.run_one_frame(&mut ExecPolicy::new());
                c64.memory().peek(0xCF04)
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn sid_gate_drives_voice_state_and_audio() {
    let mut c64 = setup_program(&config(), &[0x4C, 0x00, 0xC0]);
    {
        let memory = c64.memory_mut();
        memory.write(0xD418, 0x0F); // volume
        memory.write(0xD400, 0x00);
        memory.write(0xD401, 0x20); // frequency
        memory.write(0xD405, 0x00); // attack/decay
        memory.write(0xD406, 0xF8); // sustain max, slow release
        memory.write(0xD404, 0x11); // triangle + gate
    }
    c64.run_one_frame(&mut ExecPolicy::new());
    assert_eq!(
        c64.sid().voice_status(0),
        Some(VoiceStatus::AttackDecaySustainStarted)
    );
    let audio = c64.latest_audio().expect("one buffer per frame");
    assert!((957..=958).contains(&audio.len()));
    assert!(audio.iter().any(|&s| s != 0.0));

    c64.memory_mut().write(0xD404, 0x10); // gate off
    c64.run_one_frame(&mut ExecPolicy::new());
    assert_eq!(c64.sid().voice_status(0), Some(VoiceStatus::ReleaseStarted));
    assert_eq!(
        c64.query("sid.voice1.status"),
        Some(Value::Text("ReleaseStarted".into()))
    );
}

#[test]
fn text_cell_reaches_the_published_frame() {
    let mut c64 = setup_program(&config(), &[0x4C, 0x00, 0xC0]);
    c64.store_data(0x3808, &[0xFF; 8]); // glyph 1: solid
    c64.store_data(0x0400, &[1]);
    c64.store_data(0xD800, &[0x07]);
    let handle = c64.frame_handle();

    c64.run_one_frame(&mut ExecPolicy::new());
    let frame = handle.current();
    let (left, top) = {
        let vic = c64.vic();
        (
            usize::from(vic.config().border_left()),
            usize::from(vic.config().border_top()),
        )
    };
    assert_eq!(frame.pixel(left, top), Some(palette::argb(0x07)));
    assert_eq!(frame.pixel(0, 0), Some(palette::argb(0x0E)));
    assert_eq!(frame.pixel(left + 8, top), Some(palette::argb(0x06)));
}

#[test]
fn iec_devices_are_visible_through_queries() {
    let mut c64 = C64::new(&config()).expect("valid config");
    let (device, _inbox) = ListenerDevice::new();
    c64.iec_mut()
        .attach_device(8, Box::new(device))
        .expect("attach");
    assert!(c64.iec_mut().attach(8).is_err());
    assert_eq!(c64.query("iec.devices"), Some(Value::Text("8".into())));
    assert_eq!(c64.query("iec.atn"), Some(Value::Text("released".into())));
}

#[test]
fn execute_runs_frames_until_the_budget() {
    let mut c64 = setup_program(&config(), &[0x4C, 0x00, 0xC0]);
    let per_frame = u64::from(config().cycles_per_frame());
    let (stop, state) = c64.execute(&mut ExecPolicy::new().with_max_cycles(per_frame * 3 + 10));
    assert_eq!(stop.kind, StopKind::CycleBudget);
    assert!(state.cycles >= per_frame * 3 + 10);
    assert_eq!(c64.frame_count(), 3);
    assert_eq!(c64.query("master_clock"), Some(Value::U64(state.cycles)));
}
