//! Demonstration/verification front end for `dos-audio-core`: a small
//! CLI that opens a real output device and exercises the engine manually
//! (list devices, play a VOC file, play an OPL2 test note, sweep the
//! PC-speaker divisor).

mod host;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dos_audio_core::engine::AudioEngine;
use tracing::info;

#[derive(Parser)]
#[command(name = "dos-audio-demo", about = "Manual verification harness for dos-audio-core")]
struct Cli {
    /// Output device name (default device if omitted).
    #[arg(long)]
    device: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available output devices and exit.
    Devices,
    /// Decode and play a VOC file once.
    PlayVoc { path: std::path::PathBuf },
    /// Play a single OPL2 test note (A4, piano-ish patch) for a duration.
    Tone {
        #[arg(long, default_value_t = 2000)]
        millis: u64,
    },
    /// Sweep the PC-speaker divisor across a range of audible tones.
    Speaker {
        #[arg(long, default_value_t = 2000)]
        millis_per_step: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if let Command::Devices = cli.command {
        for name in host::AudioOutput::list_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let mut output = host::AudioOutput::open(cli.device.as_deref())?;
    let engine = Arc::new(AudioEngine::new(output.sample_rate()));
    output.start(engine.clone())?;

    match cli.command {
        Command::Devices => unreachable!(),
        Command::PlayVoc { path } => {
            let data = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            engine.play_voc(&data);
            info!(path = %path.display(), "playing VOC file");
            while engine.is_sample_playing() {
                thread::sleep(Duration::from_millis(50));
            }
        }
        Command::Tone { millis } => {
            write_piano_patch(&engine, 0x00, 0x03);
            engine.opl2_write(0xA0, 0xAE);
            engine.opl2_write(0xB0, 0x32); // block=4, key-on, fnum=0x2AE (~A4)
            thread::sleep(Duration::from_millis(millis));
            engine.opl2_write(0xB0, 0x12); // key-off, block/fnum-hi unchanged
        }
        Command::Speaker { millis_per_step } => {
            for divisor in [2711u16, 2031, 1521, 1139] {
                engine.set_pc_divisor(divisor);
                thread::sleep(Duration::from_millis(millis_per_step));
            }
            engine.set_pc_divisor(0);
        }
    }

    Ok(())
}

fn write_piano_patch(engine: &AudioEngine, mod_base: u8, car_base: u8) {
    engine.opl2_write(0x20 + mod_base, 0x01);
    engine.opl2_write(0x40 + mod_base, 0x10);
    engine.opl2_write(0x60 + mod_base, 0xF2);
    engine.opl2_write(0x80 + mod_base, 0x44);

    engine.opl2_write(0x20 + car_base, 0x01);
    engine.opl2_write(0x40 + car_base, 0x00);
    engine.opl2_write(0x60 + car_base, 0xF2);
    engine.opl2_write(0x80 + car_base, 0x44);
}
