// Spectrum example
//
// Captures the enabled channels and prints the strongest spectral lines.

use clap::Parser;
use serscope_rs::{AcquisitionConfig, Scope};

#[derive(Parser)]
#[command(name = "spectrum")]
#[command(about = "Capture and transform waveforms from a serial oscilloscope")]
struct Args {
    /// Serial port the scope is attached to
    port: String,

    /// Skip channel 2
    #[arg(long)]
    ch1_only: bool,

    /// Compute the full, center-zero transform instead of the one-sided one
    #[arg(long)]
    full: bool,

    /// Number of bins to print per channel
    #[arg(short, long, default_value_t = 5)]
    top: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let scope = Scope::new(&args.port)?;
    let mut builder = AcquisitionConfig::builder().ch1();
    if !args.ch1_only {
        builder = builder.ch2();
    }
    let result = scope.acquire(&builder.build())?;

    for (ch, spectrum) in result.spectra(!args.full)? {
        let mut bins: Vec<(f64, f64)> = spectrum
            .frequencies()
            .iter()
            .copied()
            .zip(spectrum.power_db())
            .collect();
        bins.sort_by(|a, b| b.1.total_cmp(&a.1));

        println!("{}:", ch);
        for (freq, power) in bins.into_iter().take(args.top) {
            println!("  {:>12.3} Hz  {:>8.2} dB", freq, power);
        }
    }
    Ok(())
}
