use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::failure::FailureKind;
use crate::scope_connector::{ConnectorError, ScopeConnector};
use crate::serial_terminal::{TerminalError, Transport};

/// A command line, without terminator.
///
/// Commands ending in `?` are queries: the instrument sends a data line after
/// the ack. Everything else is an action answered by the ack alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    pub fn new(line: impl Into<String>) -> Self {
        Self(line.into())
    }

    pub fn is_query(&self) -> bool {
        self.0.ends_with('?')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        Self::new(line)
    }
}

impl From<String> for Command {
    fn from(line: String) -> Self {
        Self(line)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("Serial terminal error: {0}")]
    Terminal(#[from] TerminalError),

    #[error("nack: instrument rejected '{command}' with '{reply}'")]
    Nack { command: String, reply: String },
}

impl CommandError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Connector(e) => e.kind(),
            Self::Terminal(e) => e.kind(),
            Self::Nack { .. } => FailureKind::Nack,
        }
    }
}

/// How many frames follow the ack for a given exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyShape {
    AckOnly,
    AckThenLine,
}

/// Half-duplex command/reply channel to the instrument.
///
/// All exchanges go through one lock around the connector, so at most one
/// command is in flight at any time. A [`Session`] keeps the lock across a
/// sequence of commands that must not be interleaved with other callers.
#[derive(Debug)]
pub struct CommandChannel {
    connector: Mutex<ScopeConnector>,
}

impl CommandChannel {
    pub fn new(connector: ScopeConnector) -> Self {
        Self {
            connector: Mutex::new(connector),
        }
    }

    fn connector(&self) -> MutexGuard<'_, ScopeConnector> {
        self.connector.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive use of the channel until the returned session is dropped.
    ///
    /// Blocks while another session is held.
    pub fn session(&self) -> Session<'_> {
        Session {
            connector: self.connector(),
        }
    }

    pub fn select_port(&self, port: &str) -> Result<(), ConnectorError> {
        self.connector().select_port(port)
    }

    pub fn connect(&self) -> Result<(), ConnectorError> {
        self.connector().connect()
    }

    /// Whether the port selection is latched by an open session
    pub fn is_port_locked(&self) -> bool {
        self.connector().is_open()
    }

    pub fn port(&self) -> Option<String> {
        self.connector().port().map(str::to_string)
    }

    pub fn close(&self) {
        self.connector().close();
    }

    /// Send one command, see [`Session::send`].
    pub fn send(&self, command: impl Into<Command>) -> Result<String, CommandError> {
        self.session().send(command)
    }

    /// Send one command, see [`Session::send_with_status`].
    pub fn send_with_status(&self, command: impl Into<Command>) -> Result<String, CommandError> {
        self.session().send_with_status(command)
    }
}

/// A held [`CommandChannel`] lock.
#[derive(Debug)]
pub struct Session<'a> {
    connector: MutexGuard<'a, ScopeConnector>,
}

impl Session<'_> {
    /// Send `command` and wait for its reply.
    ///
    /// Returns the payload line with CR/LF stripped for queries, an empty
    /// string for actions. Anything other than the ack byte in the first
    /// frame is a nack, and nothing further is read.
    pub fn send(&mut self, command: impl Into<Command>) -> Result<String, CommandError> {
        let command = command.into();
        let shape = if command.is_query() {
            ReplyShape::AckThenLine
        } else {
            ReplyShape::AckOnly
        };
        self.exchange(&command, shape)
    }

    /// Send an action that is followed by a status line after its ack.
    ///
    /// `ASET` behaves this way even though it carries no `?`.
    pub fn send_with_status(
        &mut self,
        command: impl Into<Command>,
    ) -> Result<String, CommandError> {
        self.exchange(&command.into(), ReplyShape::AckThenLine)
    }

    fn exchange(&mut self, command: &Command, shape: ReplyShape) -> Result<String, CommandError> {
        let transport = self.connector.session()?;
        exchange(transport, command, shape)
    }
}

fn exchange(
    transport: &mut dyn Transport,
    command: &Command,
    shape: ReplyShape,
) -> Result<String, CommandError> {
    log::debug!("command: {}", command);
    transport.write_line(command.as_str())?;

    let result = read_reply(transport, command, shape);
    if let Err(CommandError::Terminal(TerminalError::Timeout { .. })) = &result {
        // late bytes belong to this command, not the next one
        if let Err(e) = transport.discard_input() {
            log::warn!("Couldn't discard input after timeout on '{}': {}", command, e);
        }
    }
    result
}

fn read_reply(
    transport: &mut dyn Transport,
    command: &Command,
    shape: ReplyShape,
) -> Result<String, CommandError> {
    let first = transport.read_frame()?;
    if !first.is_ack() {
        log::warn!("nack for '{}': {:?}", command, first);
        return Err(CommandError::Nack {
            command: command.to_string(),
            reply: first.text().to_string(),
        });
    }

    match shape {
        ReplyShape::AckOnly => Ok(String::new()),
        ReplyShape::AckThenLine => {
            let frame = transport.read_frame()?;
            if frame.is_ack() {
                log::debug!("'{}' answered with a second ack instead of data", command);
            }
            let payload = frame.text().to_string();
            log::debug!("reply to '{}': {} bytes", command, payload.len());
            Ok(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial_terminal::LinkSettings;
    use crate::test_support::{ack, ack_with, connector_for, failing_opener, ScriptedTransport};

    #[test]
    fn test_command_classification() {
        assert!(Command::from("TDIV?").is_query());
        assert!(Command::from("DTWAVE?").is_query());
        assert!(!Command::from("MLEN SHORT").is_query());
        assert!(!Command::from("ASET").is_query());
    }

    #[test]
    fn test_query_returns_stripped_payload() {
        let transport = ScriptedTransport::from_bytes(b"\x063.5\r\n");
        let log = transport.write_log();
        let channel = CommandChannel::new(connector_for(transport));

        assert_eq!(channel.send("TDIV?").unwrap(), "3.5");
        assert_eq!(log.lines(), vec!["TDIV?".to_string()]);
    }

    #[test]
    fn test_line_instead_of_ack_is_nack() {
        let transport = ScriptedTransport::from_bytes(b"ERR\n3.5\r\n");
        let channel = CommandChannel::new(connector_for(transport));

        let err = channel.send("TDIV?").unwrap_err();
        assert_eq!(err.kind(), FailureKind::Nack);
        assert!(matches!(err, CommandError::Nack { ref reply, .. } if reply == "ERR"));
    }

    #[test]
    fn test_nack_does_not_read_second_frame() {
        let mut transport = ScriptedTransport::from_bytes(b"ERR\n3.5\r\n");
        let err = exchange(&mut transport, &Command::from("TDIV?"), ReplyShape::AckThenLine)
            .unwrap_err();
        assert!(matches!(err, CommandError::Nack { .. }));
        assert_eq!(transport.remaining(), b"3.5\r\n".len());
    }

    #[test]
    fn test_action_reads_ack_only() {
        let mut bytes = ack();
        bytes.extend(ack_with("left over"));
        let mut transport = ScriptedTransport::from_bytes(&bytes);

        let reply = exchange(&mut transport, &Command::from("MLEN SHORT"), ReplyShape::AckOnly)
            .unwrap();
        assert_eq!(reply, "");
        assert_eq!(transport.remaining(), b"\x06left over\r\n".len());
    }

    #[test]
    fn test_timeout_discards_late_reply() {
        let mut transport = ScriptedTransport::from_bytes(&ack());
        transport.stall();
        transport.push_bytes(b"3.5\r\n");

        let err = exchange(&mut transport, &Command::from("TDIV?"), ReplyShape::AckThenLine)
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert_eq!(transport.remaining(), 0);

        transport.push_bytes(&ack());
        let reply =
            exchange(&mut transport, &Command::from("PERS ON"), ReplyShape::AckOnly).unwrap();
        assert_eq!(reply, "");
    }

    #[test]
    fn test_session_holds_channel() {
        let transport = ScriptedTransport::responding(|line| match line {
            "TDIV?" => ack_with("0.5"),
            _ => ack(),
        });
        let log = transport.write_log();
        let channel = CommandChannel::new(connector_for(transport));

        let mut session = channel.session();
        session.send("MLEN SHORT").unwrap();
        assert_eq!(session.send("TDIV?").unwrap(), "0.5");
        assert!(channel.connector.try_lock().is_err());
        drop(session);

        assert!(channel.is_port_locked());
        assert_eq!(log.lines(), vec!["MLEN SHORT", "TDIV?"]);
    }

    #[test]
    fn test_status_reply_after_action() {
        let transport = ScriptedTransport::from_bytes(&ack_with("Auto setup done"));
        let channel = CommandChannel::new(connector_for(transport));
        assert_eq!(channel.send_with_status("ASET").unwrap(), "Auto setup done");
    }

    #[test]
    fn test_missing_ack_times_out() {
        let transport = ScriptedTransport::from_bytes(b"");
        let channel = CommandChannel::new(connector_for(transport));
        let err = channel.send("PERS ON").unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
    }

    #[test]
    fn test_port_unavailable_aborts_before_write() {
        let mut connector = ScopeConnector::with_opener(LinkSettings::default(), failing_opener());
        connector.select_port("/dev/ttyUSB3").unwrap();
        let channel = CommandChannel::new(connector);

        let err = channel.send("MLEN LONG").unwrap_err();
        assert_eq!(err.kind(), FailureKind::PortUnavailable);
        assert!(!channel.is_port_locked());
    }

    #[test]
    fn test_port_locked_after_first_command() {
        let transport = ScriptedTransport::from_bytes(&ack());
        let channel = CommandChannel::new(connector_for(transport));
        assert!(!channel.is_port_locked());

        channel.send("EQU OFF").unwrap();
        assert!(channel.is_port_locked());
        assert!(channel.select_port("/dev/ttyACM0").is_err());
        assert_eq!(channel.port().as_deref(), Some("/dev/ttyUSB0"));
    }
}
