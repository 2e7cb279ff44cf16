use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::failure::FailureKind;

/// In-band acknowledgment byte sent by the instrument after every accepted command.
pub const ACK: u8 = 0x06;

/// Terminator appended to every command line.
pub const LINE_TERMINATOR: &str = "\r\n";

#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("Couldn't open the serial port {port}: {source}")]
    PortUnavailable {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Timeout error: no ack or line terminator received within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TerminalError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::PortUnavailable { .. } => FailureKind::PortUnavailable,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Io(_) => FailureKind::Io,
        }
    }
}

/// Serial line parameters, fixed when the port is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    pub read_timeout: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::Hardware,
            read_timeout: Duration::from_secs(30),
        }
    }
}

impl LinkSettings {
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

/// One unit read from the instrument: the ack byte, or a terminated line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Ack,
    /// Everything read up to and including the `\n`.
    Line(String),
}

impl Frame {
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }

    /// Line contents without the trailing CR/LF. An ack carries no text.
    pub fn text(&self) -> &str {
        match self {
            Self::Ack => "",
            Self::Line(line) => line.trim_matches(|c| c == '\r' || c == '\n'),
        }
    }
}

/// Byte-level access to the instrument link.
///
/// Implementations only have to move bytes; framing is provided on top by
/// [`Transport::read_frame`].
pub trait Transport: Send {
    /// Read a single byte, failing with [`TerminalError::Timeout`] when the
    /// read window elapses without data.
    fn read_byte(&mut self) -> Result<u8, TerminalError>;

    /// Write `line` followed by CR-LF in one write.
    fn write_line(&mut self, line: &str) -> Result<(), TerminalError>;

    /// Drop bytes received but not read yet.
    fn discard_input(&mut self) -> Result<(), TerminalError> {
        Ok(())
    }

    /// Read one frame.
    ///
    /// An [`ACK`] byte ends the frame immediately, dropping whatever text was
    /// accumulated before it. Otherwise bytes accumulate until a `\n`, which is
    /// kept in the returned line together with any preceding `\r`.
    fn read_frame(&mut self) -> Result<Frame, TerminalError> {
        let mut line = Vec::new();
        loop {
            let byte = self.read_byte()?;
            if byte == ACK {
                if !line.is_empty() {
                    log::debug!(
                        "Discarding {} bytes received before ack",
                        line.len()
                    );
                }
                return Ok(Frame::Ack);
            }
            line.push(byte);
            if byte == b'\n' {
                return Ok(Frame::Line(decode_line(line)));
            }
        }
    }
}

fn decode_line(line: Vec<u8>) -> String {
    String::from_utf8(line).unwrap_or_else(|e| {
        log::debug!(
            "Replaced invalid UTF-8 at byte {} of a {} byte line",
            e.utf8_error().valid_up_to(),
            e.as_bytes().len()
        );
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    })
}

/// [`Transport`] over a real serial port.
pub struct SerialTerminal {
    serial: Box<dyn SerialPort>,
    read_timeout: Duration,
}

impl std::fmt::Debug for SerialTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTerminal")
            .field("port", &self.serial.name())
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl SerialTerminal {
    /// Open `port` with the given line settings
    pub fn open(port: &str, link: &LinkSettings) -> Result<Self, TerminalError> {
        log::debug!("Opening serial port {} at {} baud", port, link.baud_rate);
        let serial = serialport::new(port, link.baud_rate)
            .data_bits(link.data_bits)
            .parity(link.parity)
            .stop_bits(link.stop_bits)
            .flow_control(link.flow_control)
            .timeout(link.read_timeout)
            .open()
            .map_err(|source| TerminalError::PortUnavailable {
                port: port.to_string(),
                source,
            })?;

        let mut terminal = Self {
            serial,
            read_timeout: link.read_timeout,
        };
        terminal.flush()?;
        Ok(terminal)
    }

    /// Drop anything still sitting in the serial buffers
    fn flush(&mut self) -> Result<(), TerminalError> {
        self.serial
            .clear(serialport::ClearBuffer::All)
            .map_err(io::Error::from)?;
        Ok(())
    }
}

impl Transport for SerialTerminal {
    fn read_byte(&mut self) -> Result<u8, TerminalError> {
        let mut byte = [0u8; 1];
        match self.serial.read(&mut byte) {
            Ok(1) => Ok(byte[0]),
            Ok(_) => Err(TerminalError::Timeout {
                timeout: self.read_timeout,
            }),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(TerminalError::Timeout {
                timeout: self.read_timeout,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn discard_input(&mut self) -> Result<(), TerminalError> {
        self.serial
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::from)?;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<(), TerminalError> {
        let line_with_terminator = format!("{}{}", line, LINE_TERMINATOR);
        self.serial.write_all(line_with_terminator.as_bytes())?;
        self.serial.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;

    #[test]
    fn test_ack_ends_frame_and_consumes_only_through_ack() {
        let mut transport = ScriptedTransport::from_bytes(b"\x06rest\n");
        assert_eq!(transport.read_frame().unwrap(), Frame::Ack);
        assert_eq!(transport.remaining(), b"rest\n".len());
    }

    #[test]
    fn test_ack_discards_partial_text() {
        let mut transport = ScriptedTransport::from_bytes(b"garbage\x06");
        assert_eq!(transport.read_frame().unwrap(), Frame::Ack);
        assert_eq!(transport.remaining(), 0);
    }

    #[test]
    fn test_line_keeps_terminator() {
        let mut transport = ScriptedTransport::from_bytes(b"1.23\r\n");
        let frame = transport.read_frame().unwrap();
        assert_eq!(frame, Frame::Line("1.23\r\n".to_string()));
        assert_eq!(frame.text(), "1.23");
    }

    #[test]
    fn test_bare_newline_is_a_line() {
        let mut transport = ScriptedTransport::from_bytes(b"ERR\n");
        assert_eq!(
            transport.read_frame().unwrap(),
            Frame::Line("ERR\n".to_string())
        );
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut transport = ScriptedTransport::from_bytes(b"10,\xff20\r\n");
        let frame = transport.read_frame().unwrap();
        assert_eq!(frame.text(), "10,\u{FFFD}20");
    }

    #[test]
    fn test_unterminated_line_times_out() {
        let mut transport = ScriptedTransport::from_bytes(b"12,34");
        let err = transport.read_frame().unwrap_err();
        assert!(matches!(err, TerminalError::Timeout { .. }));
        assert_eq!(err.kind(), FailureKind::Timeout);
    }

    #[test]
    fn test_link_settings_defaults() {
        let link = LinkSettings::default();
        assert_eq!(link.baud_rate, 115_200);
        assert_eq!(link.data_bits, DataBits::Eight);
        assert_eq!(link.parity, Parity::None);
        assert_eq!(link.stop_bits, StopBits::One);
        assert_eq!(link.flow_control, FlowControl::Hardware);
        assert_eq!(link.read_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_frame_text() {
        assert_eq!(Frame::Ack.text(), "");
        assert!(Frame::Ack.is_ack());
        assert_eq!(Frame::Line("\r\nOK\r\n".to_string()).text(), "OK");
    }
}
