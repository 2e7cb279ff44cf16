//! # SerScope RS
//!
//! A Rust library for driving bench oscilloscopes that speak a line based ASCII
//! command set over a serial link and acknowledge every command with a single
//! `0x06` byte.
//!
//! The library covers the protocol side only: framing and ack/nack handling,
//! query replies, waveform decoding, the acquisition sequence with its
//! measurement battery, and spectral analysis of the captured samples.
//! Presentation code calls in and gets plain data back.
//!
//! ## Features
//!
//! - **Single session**: the serial port is opened lazily on the first command and
//!   latched until the session is closed
//! - **Strict half-duplex exchanges**: one command in flight, serialized behind a lock
//! - **Typed failures**: every failure maps onto a [`FailureKind`] for status display
//! - **Acquisition runs**: memory length, point count, timebase, per-channel capture
//!   and optional measurements, with cooperative cancellation between commands
//! - **Spectra**: full (center-zero) and one-sided transforms via `rustfft`
//! - **DataFrame output**: captures and spectra convert to `polars` DataFrames
//!
//! ## Examples
//!
//! ### Acquisition
//!
//! ```rust,no_run
//! use serscope_rs::{AcquisitionConfig, Channel, Scope};
//!
//! let scope = Scope::new("/dev/ttyUSB0")?;
//!
//! let config = AcquisitionConfig::builder()
//!     .short_memory()
//!     .ch1()
//!     .low_pass(Channel::Ch1, false)
//!     .with_measurements(true)
//!     .build();
//!
//! let result = scope.acquire(&config)?;
//! println!("{} points, {} s/sample", result.points(), result.interval());
//! if let Some(set) = result.measurements(Channel::Ch1) {
//!     print!("{}", set);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Single measurement
//!
//! ```rust,no_run
//! use serscope_rs::{Channel, MeasurementMode, Scope};
//!
//! let scope = Scope::new("/dev/ttyUSB0")?;
//! let freq = scope.measure(Channel::Ch2, MeasurementMode::Freq)?;
//! println!("CH2 frequency: {}", freq);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Spectrum
//!
//! ```rust
//! use serscope_rs::spectrum;
//!
//! let wave: Vec<f64> = (0..64).map(|i| (i as f64 * 0.5).sin()).collect();
//! let spectrum = spectrum::transform(&wave, 64, 1e-3, true)?;
//! let power = spectrum.power_db();
//! assert_eq!(power.len(), 33);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Failure handling
//!
//! ```rust,no_run
//! use serscope_rs::{AcquisitionConfig, Scope};
//!
//! let scope = Scope::new("/dev/ttyUSB0")?;
//! match scope.acquire(&AcquisitionConfig::builder().ch1().ch2().build()) {
//!     Ok(result) => println!("captured {:?}", result.captured_channels().collect::<Vec<_>>()),
//!     Err(failure) => {
//!         println!("{}", failure.kind());
//!         if let Some(partial) = failure.partial {
//!             println!("kept {:?}", partial.captured_channels().collect::<Vec<_>>());
//!         }
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod command_channel;
pub mod failure;
pub mod scope;
pub mod scope_config;
pub mod scope_connector;
pub mod scope_reading;
pub mod serial_terminal;
pub mod spectrum;
pub mod waveform;

#[cfg(test)]
mod test_support;

// Re-export the main types for convenience
pub use command_channel::{Command, CommandChannel, CommandError, Session};

pub use failure::FailureKind;

pub use scope::{AcquisitionFailure, AcquisitionStage, CancelToken, Scope, ScopeError};

pub use scope_config::{
    AcquisitionConfig, AcquisitionConfigBuilder, Channel, ChannelConfig, Coupling, MeasurementMode,
    MemoryLength, ScopeSettings,
};

pub use scope_connector::{ConnectorError, ScopeConnector, TransportOpener};

pub use scope_reading::{AcquisitionResult, MeasurementSet};

pub use serial_terminal::{Frame, LinkSettings, SerialTerminal, TerminalError, Transport};

pub use spectrum::{SpectralResult, SpectrumError};

pub use waveform::{Waveform, WaveformError};
