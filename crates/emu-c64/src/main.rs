//! Headless C64 runner.
//!
//! Loads a PRG, runs a number of frames and reports why it stopped.
//! Optionally saves the last frame as PNG and the audio as WAV.

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process;

use emu_c64::{C64, C64Config, capture};
use mos_6502::ExecPolicy;
use ringbuf::traits::Consumer;

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

struct CliArgs {
    prg_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    frames: u32,
    run_at_load: bool,
    stop_on_brk: bool,
    screenshot_path: Option<PathBuf>,
    wav_path: Option<PathBuf>,
    type_text: Option<String>,
    type_at: u64,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        prg_path: None,
        config_path: None,
        frames: 200,
        run_at_load: false,
        stop_on_brk: false,
        screenshot_path: None,
        wav_path: None,
        type_text: None,
        type_at: 10,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--prg" => {
                i += 1;
                cli.prg_path = args.get(i).map(PathBuf::from);
            }
            "--config" => {
                i += 1;
                cli.config_path = args.get(i).map(PathBuf::from);
            }
            "--frames" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.frames = s.parse().unwrap_or(200);
                }
            }
            "--run-at-load" => cli.run_at_load = true,
            "--stop-on-brk" => cli.stop_on_brk = true,
            "--screenshot" => {
                i += 1;
                cli.screenshot_path = args.get(i).map(PathBuf::from);
            }
            "--wav" => {
                i += 1;
                cli.wav_path = args.get(i).map(PathBuf::from);
            }
            "--type" => {
                i += 1;
                cli.type_text = args.get(i).map(|s| s.replace("\\n", "\n"));
            }
            "--type-at" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.type_at = s.parse().unwrap_or(10);
                }
            }
            "--help" | "-h" => {
                eprintln!("Usage: emu-c64 [OPTIONS]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --prg <file>         Load a PRG file into memory");
                eprintln!("  --config <file>      JSON system configuration");
                eprintln!("  --frames <n>         Number of frames to run [default: 200]");
                eprintln!("  --run-at-load        Reset to the PRG load address");
                eprintln!("  --stop-on-brk        Stop before executing BRK");
                eprintln!("  --screenshot <file>  Save the last frame as PNG");
                eprintln!("  --wav <file>         Save all audio as WAV");
                eprintln!("  --type <text>        Post key events (use \\n for Return)");
                eprintln!("  --type-at <frame>    Frame at which to start typing [default: 10]");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn load_config(cli: &CliArgs) -> Result<C64Config, Box<dyn Error>> {
    match cli.config_path {
        Some(ref path) => Ok(C64Config::from_json(&fs::read_to_string(path)?)?),
        None => Ok(C64Config::default()),
    }
}

fn make_c64(cli: &CliArgs) -> Result<C64, Box<dyn Error>> {
    let config = load_config(cli)?;
    let mut c64 = C64::new(&config)?;

    if let Some(ref path) = cli.prg_path {
        let info = c64.load_binary(&fs::read(path)?)?;
        log::info!(
            "loaded {} ({} bytes at ${:04X})",
            path.display(),
            info.len,
            info.load_address
        );
        if cli.run_at_load {
            c64.reset(Some(info.load_address));
        }
    }

    if let Some(ref text) = cli.type_text {
        c64.input_queue().enqueue_text(text, cli.type_at);
    }
    Ok(c64)
}

fn run(cli: &CliArgs) -> Result<(), Box<dyn Error>> {
    let mut c64 = make_c64(cli)?;
    let mut audio = c64.take_audio_consumer();
    let mut samples = Vec::new();

    let mut policy = ExecPolicy::new();
    if cli.stop_on_brk {
        policy = policy.stop_on_brk();
    }

    let mut cycles = 0;
    for _ in 0..cli.frames {
        let result = c64.run_one_frame(&mut policy);
        cycles += result.cycles;
        if let Some(consumer) = audio.as_mut() {
            while let Some(buffer) = consumer.try_pop() {
                samples.extend_from_slice(&buffer);
            }
        }
        if let Some(stop) = result.stop {
            if stop.is_failure() {
                log::error!("stopped at frame {}: {stop}", c64.frame_count());
            } else {
                log::info!("stopped at frame {}: {stop}", c64.frame_count());
            }
            break;
        }
    }
    log::info!(
        "ran {} frames, {cycles} cycles, pc=${:04X}",
        c64.frame_count(),
        c64.cpu().pc()
    );

    if let Some(ref path) = cli.screenshot_path {
        capture::save_screenshot(&c64.current_frame(), path)?;
        log::info!("screenshot saved to {}", path.display());
    }
    if let Some(ref path) = cli.wav_path {
        capture::save_audio(&samples, c64.config().sample_rate, path)?;
        log::info!("{} samples saved to {}", samples.len(), path.display());
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = parse_args();
    if let Err(e) = run(&cli) {
        log::error!("{e}");
        process::exit(1);
    }
}
