// Acquisition example
//
// Captures one or both channels and prints the measurement battery.

use clap::Parser;
use serscope_rs::{AcquisitionConfig, Channel, MemoryLength, Scope};

#[derive(Parser)]
#[command(name = "acquire")]
#[command(about = "Capture waveforms and measurements from a serial oscilloscope")]
struct Args {
    /// Serial port the scope is attached to
    port: String,

    /// Capture channel 1
    #[arg(long)]
    ch1: bool,

    /// Capture channel 2
    #[arg(long)]
    ch2: bool,

    /// Use long memory (30000 points instead of 5120)
    #[arg(short, long)]
    long: bool,

    /// Enable the low-pass filter on the captured channels
    #[arg(long)]
    low_pass: bool,

    /// Query the measurement battery after capturing
    #[arg(short, long)]
    measure: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let scope = Scope::new(&args.port)?;

    let memory = if args.long {
        MemoryLength::Long
    } else {
        MemoryLength::Short
    };
    let config = AcquisitionConfig::builder()
        .memory(memory)
        .channel(Channel::Ch1, args.ch1)
        .channel(Channel::Ch2, args.ch2)
        .low_pass(Channel::Ch1, args.low_pass)
        .low_pass(Channel::Ch2, args.low_pass)
        .with_measurements(args.measure)
        .build();

    let result = match scope.acquire(&config) {
        Ok(result) => result,
        Err(failure) => {
            eprintln!("Acquisition failed ({}): {}", failure.kind(), failure);
            match failure.partial {
                Some(partial) => *partial,
                None => return Ok(()),
            }
        }
    };

    println!(
        "{} points, {:.3e} s/sample ({:.3e} S/s)",
        result.points(),
        result.interval(),
        result.sample_rate()
    );

    for ch in result.captured_channels() {
        if let Some(wave) = result.waveform(ch) {
            let samples = wave.samples();
            let min = samples.iter().fold(f64::INFINITY, |a, &b| a.min(b));
            let max = samples.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            println!("{}: {} samples, {:.4}V to {:.4}V", ch, samples.len(), min, max);
        }
        if let Some(set) = result.measurements(ch) {
            print!("{}", set);
        }
    }

    println!("{}", result.to_dataframe()?.head(Some(5)));
    Ok(())
}
