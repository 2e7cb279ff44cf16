use std::str::FromStr;

use crate::failure::FailureKind;

/// The instrument reports samples in tenths of a millivolt.
pub const COUNTS_PER_VOLT: f64 = 10_000.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaveformError {
    #[error("malformed waveform: field {index} is '{field}'")]
    Malformed { index: usize, field: String },
}

impl WaveformError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::MalformedWaveform
    }
}

/// Sample values in volts, in capture order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Waveform {
    samples: Vec<f64>,
}

impl Waveform {
    pub fn new(samples: Vec<f64>) -> Self {
        Self { samples }
    }

    /// Decode a `DTWAVE?` payload.
    ///
    /// Fields are comma separated counts; each one is divided by
    /// [`COUNTS_PER_VOLT`]. Any empty or non-numeric field rejects the whole
    /// payload.
    pub fn decode(payload: &str) -> Result<Self, WaveformError> {
        payload
            .split(',')
            .enumerate()
            .map(|(index, field)| {
                let trimmed = field.trim();
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|count| count.is_finite())
                    .map(|count| count / COUNTS_PER_VOLT)
                    .ok_or_else(|| WaveformError::Malformed {
                        index,
                        field: field.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }
}

impl FromStr for Waveform {
    type Err = WaveformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl AsRef<[f64]> for Waveform {
    fn as_ref(&self) -> &[f64] {
        &self.samples
    }
}
