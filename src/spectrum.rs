//! Frequency-domain view of a captured waveform.

use num_complex::Complex;
use polars::prelude::*;
use rustfft::FftPlanner;

pub const FREQUENCY_COLUMN_NAME: &str = "frequency";
pub const RE_COLUMN_NAME: &str = "re";
pub const IM_COLUMN_NAME: &str = "im";
pub const MAGNITUDE_COLUMN_NAME: &str = "magnitude";
pub const POWER_COLUMN_NAME: &str = "power_db";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpectrumError {
    #[error("Can't transform {points} points sampled every {interval} s")]
    InvalidSampling { points: usize, interval: f64 },
}

/// Frequency bins and their normalized coefficients, index aligned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpectralResult {
    frequencies: Vec<f64>,
    coefficients: Vec<Complex<f64>>,
}

impl SpectralResult {
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn coefficients(&self) -> &[Complex<f64>] {
        &self.coefficients
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn magnitudes(&self) -> Vec<f64> {
        self.coefficients.iter().map(|c| c.norm()).collect()
    }

    /// Spectral power as plotted: `20 * log10(|c|)`.
    pub fn power_db(&self) -> Vec<f64> {
        self.coefficients
            .iter()
            .map(|c| 20.0 * c.norm().log10())
            .collect()
    }

    /// Frequency and magnitude of the strongest bin
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.frequencies
            .iter()
            .zip(self.coefficients.iter().map(|c| c.norm()))
            .map(|(&f, m)| (f, m))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        let re: Vec<f64> = self.coefficients.iter().map(|c| c.re).collect();
        let im: Vec<f64> = self.coefficients.iter().map(|c| c.im).collect();

        DataFrame::new(vec![
            Series::new(FREQUENCY_COLUMN_NAME.into(), self.frequencies.as_slice()).into(),
            Series::new(RE_COLUMN_NAME.into(), re).into(),
            Series::new(IM_COLUMN_NAME.into(), im).into(),
            Series::new(MAGNITUDE_COLUMN_NAME.into(), self.magnitudes()).into(),
            Series::new(POWER_COLUMN_NAME.into(), self.power_db()).into(),
        ])
    }
}

/// Bin frequencies of an `n` point transform in standard order: zero, the
/// positive half, then the negative half.
fn signed_frequencies(n: usize, interval: f64) -> Vec<f64> {
    let span = n as f64 * interval;
    (0..n)
        .map(|k| {
            let k = if k < n.div_ceil(2) {
                k as f64
            } else {
                k as f64 - n as f64
            };
            k / span
        })
        .collect()
}

/// Transform `wave`, sampled every `interval` seconds, over `points` samples.
///
/// The waveform is zero padded or truncated to `points`. Coefficients are
/// divided by `points`. With `real_only` the result is the one-sided spectrum
/// for bins `0..=points/2`; otherwise it holds all bins, reordered so the
/// most negative frequency comes first.
pub fn transform(
    wave: &[f64],
    points: usize,
    interval: f64,
    real_only: bool,
) -> Result<SpectralResult, SpectrumError> {
    if points == 0 || !(interval.is_finite() && interval > 0.0) {
        return Err(SpectrumError::InvalidSampling { points, interval });
    }
    let _span = tracing::debug_span!("transform", points, real_only).entered();

    if wave.len() != points {
        log::debug!(
            "Waveform has {} samples, transforming over {} points",
            wave.len(),
            points
        );
    }

    let mut coefficients: Vec<Complex<f64>> = wave
        .iter()
        .copied()
        .chain(std::iter::repeat(0.0))
        .take(points)
        .map(|v| Complex::new(v, 0.0))
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(points);
    fft.process(&mut coefficients);

    let scale = points as f64;
    for c in &mut coefficients {
        *c /= scale;
    }

    let mut frequencies = signed_frequencies(points, interval);

    if real_only {
        let half = points / 2 + 1;
        coefficients.truncate(half);
        let span = points as f64 * interval;
        frequencies = (0..half).map(|k| k as f64 / span).collect();
    } else {
        let shift = points / 2;
        coefficients.rotate_right(shift);
        frequencies.rotate_right(shift);
    }

    Ok(SpectralResult {
        frequencies,
        coefficients,
    })
}
