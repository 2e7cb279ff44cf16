use std::fmt;

/// Coarse classification of every failure the crate can report.
///
/// Presentation code can match on this to pick a short status text without
/// digging through the nested error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The serial port could not be opened, or none was selected.
    PortUnavailable,
    /// The instrument answered a command with something other than the ack byte.
    Nack,
    /// No ack or line terminator arrived in time.
    Timeout,
    /// A `DTWAVE?` payload could not be decoded.
    MalformedWaveform,
    /// An acquisition was requested with both channels disabled.
    NoChannelsEnabled,
    /// The run was cancelled between two commands.
    Cancelled,
    /// A reply was received but its contents were unusable.
    InvalidReply,
    /// Any other I/O failure on the link.
    Io,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PortUnavailable => "port unavailable",
            Self::Nack => "nack",
            Self::Timeout => "timeout",
            Self::MalformedWaveform => "malformed waveform",
            Self::NoChannelsEnabled => "Both channels are disabled",
            Self::Cancelled => "cancelled",
            Self::InvalidReply => "invalid reply",
            Self::Io => "I/O error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
