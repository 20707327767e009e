//! phonics CLI: render a built-in patch to WAV or play it live.
//!
//! Usage:
//!   ph-cli --list
//!   ph-cli --patch pad --freq 220 --hold 2
//!   ph-cli --patch echo --wav echo.wav --seconds 4
//!
//! Set `RUST_LOG=debug` to see voice lifecycle events.

use ph_master::{Controller, EngineConfig, NoteSpec};
use std::time::{Duration, Instant};
use std::{env, fs};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: ph-cli [--list] [--patch <name>] [--freq <hz>] [--hold <secs>] [--seconds <secs>] [--wav <out.wav>]";

struct Args {
    list: bool,
    patch: String,
    freq: f32,
    hold: f32,
    seconds: f32,
    wav: Option<String>,
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse_num(args: &[String], flag: &str, default: f32) -> f32 {
    match flag_value(args, flag) {
        None => default,
        Some(v) => v.parse().unwrap_or_else(|_| {
            eprintln!("Invalid value for {}: {}", flag, v);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }),
    }
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        std::process::exit(0);
    }
    Args {
        list: args.iter().any(|a| a == "--list"),
        patch: flag_value(&args, "--patch").unwrap_or("pluck").to_string(),
        freq: parse_num(&args, "--freq", 440.0),
        hold: parse_num(&args, "--hold", 1.0),
        seconds: parse_num(&args, "--seconds", 10.0),
        wav: flag_value(&args, "--wav").map(str::to_string),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();

    let config = EngineConfig::default();
    let mut ctrl = Controller::with_presets(config).unwrap_or_else(|e| {
        eprintln!("Failed to build presets: {}", e);
        std::process::exit(1);
    });

    if args.list {
        for patch in ctrl.patch_names().filter_map(|name| ctrl.patch(name)) {
            println!("{}", patch);
        }
        return;
    }

    if ctrl.patch(&args.patch).is_none() {
        eprintln!("Unknown patch: {}", args.patch);
        eprintln!("Available: {}", ctrl.patch_names().collect::<Vec<_>>().join(", "));
        std::process::exit(1);
    }

    println!("Patch:    {}", args.patch);
    println!("Freq:     {} Hz", args.freq);
    println!("Hold:     {} s", args.hold);
    println!();

    match &args.wav {
        Some(path) => render_to_wav(&ctrl, &args, path),
        None => play_audio(&mut ctrl, &args),
    }
}

fn play_audio(ctrl: &mut Controller, args: &Args) {
    if let Err(e) = ctrl.play() {
        eprintln!("Failed to start playback: {}", e);
        std::process::exit(1);
    }

    let id = match ctrl.start_voice(&args.patch, args.freq, 1.0) {
        Ok(Some(id)) => id,
        Ok(None) => {
            eprintln!("No free voice");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    println!("Playing...");

    let started = Instant::now();
    let hold = Duration::from_secs_f32(args.hold.max(0.0));
    let limit = Duration::from_secs_f32(args.seconds.max(0.0));
    let mut released = false;

    while started.elapsed() < limit {
        if !released && started.elapsed() >= hold {
            ctrl.stop_voice(id, true);
            released = true;
            println!("\rReleased.                ");
        }
        ctrl.check_finished_releases();
        if released && ctrl.active_voices() == 0 {
            break;
        }
        print!("\rLevel: {:5.3}", ctrl.estimate_master_level());
        let _ = std::io::Write::flush(&mut std::io::stdout());
        std::thread::sleep(Duration::from_millis(20));
    }

    ctrl.stop_all();
    ctrl.stop();
    println!("\rDone.                    ");
}

fn render_to_wav(ctrl: &Controller, args: &Args, path: &str) {
    println!("Rendering to {} at {} Hz...", path, ctrl.config().sample_rate);

    let note = NoteSpec {
        freq: args.freq,
        velocity: 1.0,
        hold: args.hold,
        max_seconds: args.seconds,
    };
    let wav = ctrl.render_to_wav(&args.patch, note).unwrap_or_else(|e| {
        eprintln!("Failed to render: {}", e);
        std::process::exit(1);
    });
    println!("Rendered {} bytes", wav.len());

    fs::write(path, &wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path, e);
        std::process::exit(1);
    });

    println!("Done.");
}
