use polars::prelude::*;
use std::fmt;

use crate::scope_config::{Channel, MeasurementMode};
use crate::spectrum::{self, SpectralResult, SpectrumError};
use crate::waveform::Waveform;

pub const TIME_COLUMN_NAME: &str = "time";

/// Replies to the measurement queries of one channel, in query order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementSet {
    channel: Channel,
    values: Vec<(MeasurementMode, String)>,
}

impl MeasurementSet {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            values: Vec::with_capacity(MeasurementMode::STANDARD.len() + 1),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Record a reply, replacing an earlier one for the same mode.
    pub fn insert(&mut self, mode: MeasurementMode, value: String) {
        match self.values.iter_mut().find(|(m, _)| *m == mode) {
            Some((_, existing)) => *existing = value,
            None => self.values.push((mode, value)),
        }
    }

    pub fn get(&self, mode: MeasurementMode) -> Option<&str> {
        self.values
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeasurementMode, &str)> {
        self.values.iter().map(|(m, v)| (*m, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for MeasurementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (mode, value) in self.iter() {
            writeln!(f, "{}: {}", mode.label(), value)?;
        }
        Ok(())
    }
}

/// Data of one acquisition run.
///
/// Channels that were not enabled, or that weren't reached before a failure,
/// have no waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionResult {
    points: usize,
    interval: f64,
    waveforms: [Option<Waveform>; 2],
    measurements: [Option<MeasurementSet>; 2],
}

impl AcquisitionResult {
    pub fn new(points: usize, interval: f64) -> Self {
        Self {
            points,
            interval,
            waveforms: [None, None],
            measurements: [None, None],
        }
    }

    pub fn points(&self) -> usize {
        self.points
    }

    /// Seconds per sample
    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn sample_rate(&self) -> f64 {
        1.0 / self.interval
    }

    /// Sample times `i * interval` for `i` in `0..points`
    pub fn time_axis(&self) -> Vec<f64> {
        (0..self.points).map(|i| i as f64 * self.interval).collect()
    }

    pub fn waveform(&self, channel: Channel) -> Option<&Waveform> {
        self.waveforms[channel.index()].as_ref()
    }

    pub fn set_waveform(&mut self, channel: Channel, waveform: Waveform) {
        self.waveforms[channel.index()] = Some(waveform);
    }

    pub fn measurements(&self, channel: Channel) -> Option<&MeasurementSet> {
        self.measurements[channel.index()].as_ref()
    }

    pub fn measurements_mut(&mut self, channel: Channel) -> &mut MeasurementSet {
        self.measurements[channel.index()].get_or_insert_with(|| MeasurementSet::new(channel))
    }

    /// Channels that hold a waveform
    pub fn captured_channels(&self) -> impl Iterator<Item = Channel> + '_ {
        Channel::ALL
            .into_iter()
            .filter(|ch| self.waveform(*ch).is_some())
    }

    /// Spectrum of every captured channel.
    pub fn spectra(
        &self,
        real_only: bool,
    ) -> Result<Vec<(Channel, SpectralResult)>, SpectrumError> {
        self.captured_channels()
            .filter_map(|ch| self.waveform(ch).map(|wave| (ch, wave)))
            .map(|(ch, wave)| {
                spectrum::transform(wave.samples(), self.points, self.interval, real_only)
                    .map(|s| (ch, s))
            })
            .collect()
    }

    /// Time column plus one column per captured channel. Shorter waveforms
    /// are padded with nulls.
    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        let rows = self
            .waveforms
            .iter()
            .flatten()
            .map(Waveform::len)
            .max()
            .unwrap_or(0);

        let time: Vec<f64> = (0..rows).map(|i| i as f64 * self.interval).collect();
        let mut columns: Vec<Column> = vec![Series::new(TIME_COLUMN_NAME.into(), time).into()];

        for ch in self.captured_channels() {
            let samples = self.waveform(ch).map(Waveform::samples).unwrap_or_default();
            let values: Vec<Option<f64>> = (0..rows).map(|i| samples.get(i).copied()).collect();
            let name = ch.source().to_lowercase();
            columns.push(Series::new(name.into(), values).into());
        }

        DataFrame::new(columns)
    }
}
