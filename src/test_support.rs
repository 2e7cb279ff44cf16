//! Scripted instrument doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::scope_connector::{ScopeConnector, TransportOpener};
use crate::serial_terminal::{LinkSettings, TerminalError, Transport, ACK};

type Responder = Box<dyn FnMut(&str) -> Vec<u8> + Send>;

/// Lines written to a [`ScriptedTransport`], readable after the transport moved.
#[derive(Debug, Clone, Default)]
pub struct WriteLog(Arc<Mutex<Vec<String>>>);

impl WriteLog {
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(&self, line: String) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(line);
    }
}

/// Transport replaying canned bytes, optionally produced per written line.
///
/// A `None` in the input is a read that times out before later bytes arrive.
pub struct ScriptedTransport {
    input: VecDeque<Option<u8>>,
    written: WriteLog,
    responder: Option<Responder>,
}

impl ScriptedTransport {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            input: bytes.iter().copied().map(Some).collect(),
            written: WriteLog::default(),
            responder: None,
        }
    }

    pub fn responding(responder: impl FnMut(&str) -> Vec<u8> + Send + 'static) -> Self {
        Self {
            input: VecDeque::new(),
            written: WriteLog::default(),
            responder: Some(Box::new(responder)),
        }
    }

    /// Queue one timed-out read.
    pub fn stall(&mut self) {
        self.input.push_back(None);
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied().map(Some));
    }

    pub fn write_log(&self) -> WriteLog {
        self.written.clone()
    }

    pub fn remaining(&self) -> usize {
        self.input.len()
    }
}

impl Transport for ScriptedTransport {
    fn read_byte(&mut self) -> Result<u8, TerminalError> {
        self.input.pop_front().flatten().ok_or(TerminalError::Timeout {
            timeout: Duration::ZERO,
        })
    }

    fn write_line(&mut self, line: &str) -> Result<(), TerminalError> {
        self.written.push(line.to_string());
        if let Some(responder) = self.responder.as_mut() {
            let reply = responder(line);
            self.push_bytes(&reply);
        }
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), TerminalError> {
        self.input.clear();
        Ok(())
    }
}

pub fn ack() -> Vec<u8> {
    vec![ACK]
}

/// Ack followed by a CR-LF terminated payload line.
pub fn ack_with(payload: &str) -> Vec<u8> {
    let mut bytes = ack();
    bytes.extend_from_slice(payload.as_bytes());
    bytes.extend_from_slice(b"\r\n");
    bytes
}

pub fn failing_opener() -> TransportOpener {
    Box::new(|port: &str, _: &LinkSettings| {
        Err(TerminalError::PortUnavailable {
            port: port.to_string(),
            source: serialport::Error::new(serialport::ErrorKind::NoDevice, "no such device"),
        })
    })
}

/// Opener handing out `transport` on the first open only.
pub fn opener_for(transport: ScriptedTransport) -> TransportOpener {
    let mut transport = Some(transport);
    Box::new(move |port: &str, _: &LinkSettings| {
        transport
            .take()
            .map(|t| Box::new(t) as Box<dyn Transport>)
            .ok_or_else(|| TerminalError::PortUnavailable {
                port: port.to_string(),
                source: serialport::Error::new(serialport::ErrorKind::NoDevice, "already opened"),
            })
    })
}

/// Connector with a port selected, backed by `transport`.
pub fn connector_for(transport: ScriptedTransport) -> ScopeConnector {
    let mut connector = ScopeConnector::with_opener(LinkSettings::default(), opener_for(transport));
    connector
        .select_port("/dev/ttyUSB0")
        .expect("fresh connector accepts a port");
    connector
}

/// An instrument that acks everything, answers `TDIV?` with `tdiv`, and
/// `DTWAVE?` with the payload of the channel selected by `WAVESRC`.
/// `MSRA?` echoes the last `MSEL` arguments.
pub fn mock_instrument(tdiv: &str, ch1_wave: &str, ch2_wave: &str) -> ScriptedTransport {
    let tdiv = tdiv.to_string();
    let waves = [ch1_wave.to_string(), ch2_wave.to_string()];
    let mut source = 0;
    let mut selection = String::new();
    ScriptedTransport::responding(move |line| {
        if let Some(ch) = line.strip_prefix("WAVESRC CH") {
            source = if ch == "2" { 1 } else { 0 };
        }
        if let Some(sel) = line.strip_prefix("MSEL ") {
            selection = sel.to_string();
        }
        match line {
            "TDIV?" => ack_with(&tdiv),
            "DTWAVE?" => ack_with(&waves[source]),
            "MSRA?" => ack_with(&selection),
            _ => ack(),
        }
    })
}
