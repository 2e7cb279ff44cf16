use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::command_channel::{Command, CommandChannel, CommandError, Session};
use crate::failure::FailureKind;
use crate::scope_config::{AcquisitionConfig, Channel, Coupling, MeasurementMode, ScopeSettings};
use crate::scope_connector::{ConnectorError, ScopeConnector};
use crate::scope_reading::{AcquisitionResult, MeasurementSet};
use crate::serial_terminal::LinkSettings;
use crate::waveform::{Waveform, WaveformError};

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Waveform(#[from] WaveformError),

    #[error("Both channels are disabled")]
    NoChannelsEnabled,

    #[error("Cancelled")]
    Cancelled,

    #[error("Run exceeded its deadline of {deadline:?}")]
    DeadlineExceeded { deadline: Duration },

    #[error("Unexpected reply to {command}: '{reply}'")]
    InvalidReply { command: String, reply: String },
}

impl From<ConnectorError> for ScopeError {
    fn from(e: ConnectorError) -> Self {
        Self::Command(e.into())
    }
}

impl ScopeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Command(e) => e.kind(),
            Self::Waveform(e) => e.kind(),
            Self::NoChannelsEnabled => FailureKind::NoChannelsEnabled,
            Self::Cancelled => FailureKind::Cancelled,
            Self::DeadlineExceeded { .. } => FailureKind::Timeout,
            Self::InvalidReply { .. } => FailureKind::InvalidReply,
        }
    }
}

/// Where an acquisition run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionStage {
    Idle,
    Configuring,
    CapturingCh1,
    CapturingCh2,
    Measuring,
    Done,
}

impl AcquisitionStage {
    fn capturing(channel: Channel) -> Self {
        match channel {
            Channel::Ch1 => Self::CapturingCh1,
            Channel::Ch2 => Self::CapturingCh2,
        }
    }
}

impl fmt::Display for AcquisitionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Configuring => "configuring",
            Self::CapturingCh1 => "capturing CH1",
            Self::CapturingCh2 => "capturing CH2",
            Self::Measuring => "measuring",
            Self::Done => "done",
        })
    }
}

/// A failed acquisition, with whatever was captured before the failure.
#[derive(Debug, thiserror::Error)]
#[error("Acquisition failed while {stage}: {source}")]
pub struct AcquisitionFailure {
    pub stage: AcquisitionStage,
    #[source]
    pub source: ScopeError,
    pub partial: Option<Box<AcquisitionResult>>,
}

impl AcquisitionFailure {
    pub fn kind(&self) -> FailureKind {
        self.source.kind()
    }
}

/// Cooperative cancellation for a running acquisition.
///
/// Checked before every command, never while a reply is being read.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Controller for one oscilloscope on a serial line.
#[derive(Debug)]
pub struct Scope {
    channel: CommandChannel,
    settings: ScopeSettings,
}

impl Scope {
    /// Scope on a real serial port. The port is opened on the first command.
    pub fn new(port: &str) -> Result<Self, ScopeError> {
        let scope = Self::with_connector(
            ScopeConnector::new(LinkSettings::default()),
            ScopeSettings::default(),
        );
        scope.select_port(port)?;
        Ok(scope)
    }

    pub fn with_connector(connector: ScopeConnector, settings: ScopeSettings) -> Self {
        Self {
            channel: CommandChannel::new(connector),
            settings,
        }
    }

    pub fn settings(&self) -> &ScopeSettings {
        &self.settings
    }

    pub fn select_port(&self, port: &str) -> Result<(), ScopeError> {
        Ok(self.channel.select_port(port)?)
    }

    /// Select `port` and open it right away.
    pub fn open_connection(&self, port: &str) -> Result<(), ScopeError> {
        self.select_port(port)?;
        Ok(self.channel.connect()?)
    }

    /// Whether the port picker should be disabled
    pub fn is_port_locked(&self) -> bool {
        self.channel.is_port_locked()
    }

    pub fn close(&self) {
        self.channel.close();
    }

    /// Run a full acquisition.
    pub fn acquire(
        &self,
        config: &AcquisitionConfig,
    ) -> Result<AcquisitionResult, AcquisitionFailure> {
        self.acquire_with(config, &CancelToken::new())
    }

    /// Run a full acquisition that can be cancelled through `cancel`.
    ///
    /// The channel is held for the whole run; other callers on this scope
    /// wait until it ends. On failure the remaining steps are skipped.
    /// Channels captured before the failing step are returned in
    /// [`AcquisitionFailure::partial`].
    pub fn acquire_with(
        &self,
        config: &AcquisitionConfig,
        cancel: &CancelToken,
    ) -> Result<AcquisitionResult, AcquisitionFailure> {
        let _span = tracing::info_span!("acquire", memory = config.memory().as_str()).entered();

        if !config.any_enabled() {
            log::info!("Both channels are disabled, nothing to acquire");
            return Err(AcquisitionFailure {
                stage: AcquisitionStage::Idle,
                source: ScopeError::NoChannelsEnabled,
                partial: None,
            });
        }

        let mut run = Run::new(self, Some(cancel));
        log::info!("Acquiring...");

        run.enter(AcquisitionStage::Configuring);
        let (points, interval) = match run.configure(config) {
            Ok(timing) => timing,
            Err(source) => {
                return Err(AcquisitionFailure {
                    stage: run.stage,
                    source,
                    partial: None,
                });
            }
        };

        let mut result = AcquisitionResult::new(points, interval);
        if let Err(source) = run.capture(config, &mut result) {
            return Err(AcquisitionFailure {
                stage: run.stage,
                source,
                partial: Some(Box::new(result)),
            });
        }

        run.enter(AcquisitionStage::Done);
        log::info!("Acquiring... FINISHED");
        Ok(result)
    }

    /// Query one measurement. Every call talks to the instrument, holding the
    /// channel from selection to reply.
    pub fn measure(&self, channel: Channel, mode: MeasurementMode) -> Result<String, ScopeError> {
        Run::new(self, None).measure(channel, mode)
    }

    /// Query the standard measurement battery of `channel`.
    pub fn measurement_set(&self, channel: Channel) -> Result<MeasurementSet, ScopeError> {
        let mut run = Run::new(self, None);
        let mut set = MeasurementSet::new(channel);
        for mode in MeasurementMode::STANDARD {
            set.insert(mode, run.measure(channel, mode)?);
        }
        Ok(set)
    }

    /// Turn the trace of `channel` on or off
    pub fn set_trace(&self, channel: Channel, on: bool) -> Result<(), ScopeError> {
        self.action(format!("{}:TRA {}", channel.prefix(), on_off(on)))
    }

    /// Set both traces, channel 1 first
    pub fn set_traces(&self, ch1: bool, ch2: bool) -> Result<(), ScopeError> {
        self.set_trace(Channel::Ch1, ch1)?;
        self.set_trace(Channel::Ch2, ch2)
    }

    pub fn set_coupling(&self, channel: Channel, coupling: Coupling) -> Result<(), ScopeError> {
        self.action(format!("{}:CPL {}", channel.prefix(), coupling.as_str()))
    }

    pub fn set_couplings(&self, ch1: Coupling, ch2: Coupling) -> Result<(), ScopeError> {
        self.set_coupling(Channel::Ch1, ch1)?;
        self.set_coupling(Channel::Ch2, ch2)
    }

    pub fn set_low_pass(&self, channel: Channel, on: bool) -> Result<(), ScopeError> {
        self.action(format!("{}:BWL {}", channel.prefix(), on_off(on)))
    }

    pub fn set_persistence(&self, on: bool) -> Result<(), ScopeError> {
        self.action(format!("PERS {}", on_off(on)))
    }

    pub fn set_equivalent_sampling(&self, on: bool) -> Result<(), ScopeError> {
        self.action(format!("EQU {}", on_off(on)))
    }

    /// Run the instrument's auto setup and return its status line.
    pub fn auto_setup(&self) -> Result<String, ScopeError> {
        Ok(self.channel.send_with_status("ASET")?)
    }

    fn action(&self, line: String) -> Result<(), ScopeError> {
        self.channel.send(line)?;
        Ok(())
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

/// State of one controller run: checkpoints before each command.
struct Run<'a> {
    session: Session<'a>,
    settings: &'a ScopeSettings,
    cancel: Option<&'a CancelToken>,
    started: Instant,
    stage: AcquisitionStage,
}

impl<'a> Run<'a> {
    fn new(scope: &'a Scope, cancel: Option<&'a CancelToken>) -> Self {
        Self {
            session: scope.channel.session(),
            settings: &scope.settings,
            cancel,
            started: Instant::now(),
            stage: AcquisitionStage::Idle,
        }
    }

    fn enter(&mut self, stage: AcquisitionStage) {
        log::debug!("acquisition: {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn checkpoint(&self) -> Result<(), ScopeError> {
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(ScopeError::Cancelled);
        }
        if let Some(deadline) = self.settings.exchange_deadline {
            if self.started.elapsed() >= deadline {
                return Err(ScopeError::DeadlineExceeded { deadline });
            }
        }
        Ok(())
    }

    fn send(&mut self, command: impl Into<Command>) -> Result<String, ScopeError> {
        self.checkpoint()?;
        Ok(self.session.send(command)?)
    }

    /// Memory length, point count and timebase. Returns `(points, interval)`.
    fn configure(&mut self, config: &AcquisitionConfig) -> Result<(usize, f64), ScopeError> {
        let memory = config.memory();
        self.send(format!("MLEN {}", memory.as_str()))?;
        let points = memory.points();
        self.send(format!("DTPOINTS {}", points))?;

        let reply = self.send("TDIV?")?;
        let tdiv = reply
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite() && *t > 0.0)
            .ok_or_else(|| ScopeError::InvalidReply {
                command: "TDIV?".to_string(),
                reply: reply.clone(),
            })?;

        // ten horizontal divisions per screen
        let interval = (tdiv * 10.0) / points as f64;
        log::debug!("tdiv {} s, {} points, interval {} s", tdiv, points, interval);
        Ok((points, interval))
    }

    fn capture(
        &mut self,
        config: &AcquisitionConfig,
        result: &mut AcquisitionResult,
    ) -> Result<(), ScopeError> {
        for ch in config.enabled_channels() {
            self.enter(AcquisitionStage::capturing(ch));
            let waveform = self.capture_channel(ch, config.channel(ch).low_pass)?;
            log::info!("{}: captured {} samples", ch, waveform.len());
            result.set_waveform(ch, waveform);
        }

        if !config.with_measurements() {
            return Ok(());
        }

        self.enter(AcquisitionStage::Measuring);
        for ch in config.enabled_channels() {
            for mode in MeasurementMode::STANDARD {
                let value = self.measure(ch, mode)?;
                result.measurements_mut(ch).insert(mode, value);
            }
        }

        // both replies should agree, each is kept with its channel
        if config.both_enabled() {
            for ch in Channel::ALL {
                let value = self.measure(ch, MeasurementMode::Skew)?;
                result.measurements_mut(ch).insert(MeasurementMode::Skew, value);
            }
        }
        Ok(())
    }

    fn capture_channel(
        &mut self,
        ch: Channel,
        low_pass: Option<bool>,
    ) -> Result<Waveform, ScopeError> {
        if let Some(on) = low_pass {
            self.send(format!("{}:BWL {}", ch.prefix(), on_off(on)))?;
        }
        self.send(format!("{}:TRA ON", ch.prefix()))?;
        self.send(format!("WAVESRC {}", ch.source()))?;
        let payload = self.send("DTWAVE?")?;
        Ok(Waveform::decode(&payload)?)
    }

    fn measure(&mut self, ch: Channel, mode: MeasurementMode) -> Result<String, ScopeError> {
        self.send("DIRM A")?;
        self.send(format!("MSEL {}, {}", ch.source(), mode.as_str()))?;
        thread::sleep(self.settings.settle_delay);
        let value = self.send("MSRA?")?;
        log::debug!("{} {}: {}", ch, mode.label(), value);
        Ok(value)
    }
}
