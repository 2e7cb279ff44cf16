use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Ch1,
    Ch2,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Ch1, Channel::Ch2];

    pub fn index(&self) -> usize {
        match self {
            Channel::Ch1 => 0,
            Channel::Ch2 => 1,
        }
    }

    /// Prefix of per-channel settings, as in `C1:TRA ON`
    pub fn prefix(&self) -> &'static str {
        match self {
            Channel::Ch1 => "C1",
            Channel::Ch2 => "C2",
        }
    }

    /// Name used by `WAVESRC` and `MSEL`
    pub fn source(&self) -> &'static str {
        match self {
            Channel::Ch1 => "CH1",
            Channel::Ch2 => "CH2",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryLength {
    #[default]
    Short,
    Long,
}

impl MemoryLength {
    /// Samples the instrument really holds in long memory. Transferring all
    /// of them as ASCII is too slow, so long captures are read back at
    /// [`MemoryLength::points`] instead.
    pub const DEVICE_LONG_CAPACITY: usize = 102_400;

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryLength::Short => "SHORT",
            MemoryLength::Long => "LONG",
        }
    }

    /// Points requested with `DTPOINTS`
    pub fn points(&self) -> usize {
        match self {
            MemoryLength::Short => 5120,
            MemoryLength::Long => 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coupling {
    Ac,
    Dc,
    Ground,
}

impl Coupling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Coupling::Ac => "AC",
            Coupling::Dc => "DC",
            Coupling::Ground => "GND",
        }
    }
}

/// Scalar measurements available through `MSEL`/`MSRA?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementMode {
    Period,
    Duty,
    Vmean,
    Freq,
    Vrms,
    Vpp,
    Rise,
    Fall,
    PositivePulseWidth,
    NegativePulseWidth,
    PositivePeak,
    NegativePeak,
    Skew,
}

impl MeasurementMode {
    /// The per-channel battery run after every capture. Skew is separate as it
    /// needs both channels.
    pub const STANDARD: [MeasurementMode; 12] = [
        MeasurementMode::Period,
        MeasurementMode::Duty,
        MeasurementMode::Vmean,
        MeasurementMode::Freq,
        MeasurementMode::Vrms,
        MeasurementMode::Vpp,
        MeasurementMode::Rise,
        MeasurementMode::Fall,
        MeasurementMode::PositivePulseWidth,
        MeasurementMode::NegativePulseWidth,
        MeasurementMode::PositivePeak,
        MeasurementMode::NegativePeak,
    ];

    /// Token sent to the instrument
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementMode::Period => "PERIOD",
            MeasurementMode::Duty => "DUTY",
            MeasurementMode::Vmean => "VMEAN",
            MeasurementMode::Freq => "FREQ",
            MeasurementMode::Vrms => "VRMS",
            MeasurementMode::Vpp => "P-P",
            MeasurementMode::Rise => "TR",
            MeasurementMode::Fall => "TF",
            MeasurementMode::PositivePulseWidth => "+PW",
            MeasurementMode::NegativePulseWidth => "-PW",
            MeasurementMode::PositivePeak => "+PEAK",
            MeasurementMode::NegativePeak => "-PEAK",
            MeasurementMode::Skew => "SKEW",
        }
    }

    /// Human readable name
    pub fn label(&self) -> &'static str {
        match self {
            MeasurementMode::Period => "Period",
            MeasurementMode::Duty => "Duty",
            MeasurementMode::Vmean => "Vmean",
            MeasurementMode::Freq => "Freq",
            MeasurementMode::Vrms => "Vrms",
            MeasurementMode::Vpp => "Vpp",
            MeasurementMode::Rise => "Rise",
            MeasurementMode::Fall => "Fall",
            MeasurementMode::PositivePulseWidth => "+PW",
            MeasurementMode::NegativePulseWidth => "-PW",
            MeasurementMode::PositivePeak => "+PEAK",
            MeasurementMode::NegativePeak => "-PEAK",
            MeasurementMode::Skew => "SKEW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelConfig {
    pub enabled: bool,
    /// `Some` sends `Cn:BWL ON|OFF` before the capture; `None` leaves the
    /// instrument's filter setting untouched.
    pub low_pass: Option<bool>,
}

/// What a single acquisition run captures.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AcquisitionConfig {
    memory: MemoryLength,
    channels: [ChannelConfig; 2],
    with_measurements: bool,
}

impl AcquisitionConfig {
    pub fn builder() -> AcquisitionConfigBuilder {
        AcquisitionConfigBuilder::new()
    }

    pub fn memory(&self) -> MemoryLength {
        self.memory
    }

    pub fn channel(&self, channel: Channel) -> &ChannelConfig {
        &self.channels[channel.index()]
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.channel(channel).enabled
    }

    /// Enabled channels in capture order
    pub fn enabled_channels(&self) -> impl Iterator<Item = Channel> + '_ {
        Channel::ALL.into_iter().filter(|ch| self.is_enabled(*ch))
    }

    pub fn any_enabled(&self) -> bool {
        self.enabled_channels().next().is_some()
    }

    pub fn both_enabled(&self) -> bool {
        Channel::ALL.iter().all(|ch| self.is_enabled(*ch))
    }

    pub fn with_measurements(&self) -> bool {
        self.with_measurements
    }
}

#[derive(Debug, Default)]
pub struct AcquisitionConfigBuilder {
    config: AcquisitionConfig,
}

impl AcquisitionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory(mut self, memory: MemoryLength) -> Self {
        self.config.memory = memory;
        self
    }

    pub fn long_memory(self) -> Self {
        self.memory(MemoryLength::Long)
    }

    pub fn short_memory(self) -> Self {
        self.memory(MemoryLength::Short)
    }

    pub fn channel(mut self, channel: Channel, enabled: bool) -> Self {
        self.config.channels[channel.index()].enabled = enabled;
        self
    }

    pub fn ch1(self) -> Self {
        self.channel(Channel::Ch1, true)
    }

    pub fn ch2(self) -> Self {
        self.channel(Channel::Ch2, true)
    }

    pub fn low_pass(mut self, channel: Channel, on: bool) -> Self {
        self.config.channels[channel.index()].low_pass = Some(on);
        self
    }

    pub fn with_measurements(mut self, with_measurements: bool) -> Self {
        self.config.with_measurements = with_measurements;
        self
    }

    pub fn build(self) -> AcquisitionConfig {
        self.config
    }
}

/// Timing policy of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeSettings {
    /// Pause between `MSEL` and `MSRA?` while the measurement converges.
    pub settle_delay: Duration,
    /// Upper bound for one whole controller run, checked between commands.
    pub exchange_deadline: Option<Duration>,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            exchange_deadline: None,
        }
    }
}

impl ScopeSettings {
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_exchange_deadline(mut self, deadline: Duration) -> Self {
        self.exchange_deadline = Some(deadline);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_points() {
        assert_eq!(MemoryLength::Short.points(), 5120);
        assert_eq!(MemoryLength::Long.points(), 30_000);
        assert!(MemoryLength::Long.points() < MemoryLength::DEVICE_LONG_CAPACITY);
        assert_eq!(MemoryLength::Long.as_str(), "LONG");
    }

    #[test]
    fn test_builder() {
        let config = AcquisitionConfig::builder()
            .long_memory()
            .ch2()
            .low_pass(Channel::Ch2, true)
            .with_measurements(true)
            .build();

        assert_eq!(config.memory(), MemoryLength::Long);
        assert!(!config.is_enabled(Channel::Ch1));
        assert!(config.is_enabled(Channel::Ch2));
        assert_eq!(config.channel(Channel::Ch2).low_pass, Some(true));
        assert_eq!(config.channel(Channel::Ch1).low_pass, None);
        assert!(config.with_measurements());
        assert_eq!(config.enabled_channels().collect::<Vec<_>>(), vec![Channel::Ch2]);
        assert!(!config.both_enabled());
    }

    #[test]
    fn test_default_config_has_no_channels() {
        let config = AcquisitionConfig::default();
        assert!(!config.any_enabled());
        assert_eq!(config.memory(), MemoryLength::Short);
    }

    #[test]
    fn test_measurement_tokens() {
        assert_eq!(MeasurementMode::STANDARD.len(), 12);
        assert!(!MeasurementMode::STANDARD.contains(&MeasurementMode::Skew));
        assert_eq!(MeasurementMode::Vpp.as_str(), "P-P");
        assert_eq!(MeasurementMode::Vpp.label(), "Vpp");
        assert_eq!(MeasurementMode::Rise.as_str(), "TR");
        assert_eq!(MeasurementMode::NegativePeak.as_str(), "-PEAK");
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(Channel::Ch1.prefix(), "C1");
        assert_eq!(Channel::Ch2.source(), "CH2");
        assert_eq!(Channel::Ch2.to_string(), "CH2");
    }
}
