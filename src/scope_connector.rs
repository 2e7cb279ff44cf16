use crate::failure::FailureKind;
use crate::serial_terminal::{LinkSettings, SerialTerminal, TerminalError, Transport};

/// Factory used to open the transport once a port has been chosen.
pub type TransportOpener =
    Box<dyn FnMut(&str, &LinkSettings) -> Result<Box<dyn Transport>, TerminalError> + Send>;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Serial terminal error: {0}")]
    Terminal(#[from] TerminalError),

    #[error("No serial port selected")]
    NoPortSelected,

    #[error("Port {port} is already in use by this session and can't be changed")]
    SessionActive { port: String },
}

impl ConnectorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Terminal(e) => e.kind(),
            Self::NoPortSelected | Self::SessionActive { .. } => FailureKind::PortUnavailable,
        }
    }
}

/// Owner of the single instrument session of this process.
///
/// The port is opened lazily on the first exchange, using the last selected
/// port. Once open, the selection is latched: it can't be changed until the
/// session is closed.
pub struct ScopeConnector {
    port: Option<String>,
    link: LinkSettings,
    opener: TransportOpener,
    session: Option<Box<dyn Transport>>,
}

impl std::fmt::Debug for ScopeConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeConnector")
            .field("port", &self.port)
            .field("link", &self.link)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl ScopeConnector {
    /// Connector backed by a real serial port
    pub fn new(link: LinkSettings) -> Self {
        Self::with_opener(
            link,
            Box::new(|port: &str, link: &LinkSettings| {
                let terminal = SerialTerminal::open(port, link)?;
                Ok(Box::new(terminal) as Box<dyn Transport>)
            }),
        )
    }

    /// Connector that opens its transport through `opener`
    pub fn with_opener(link: LinkSettings, opener: TransportOpener) -> Self {
        Self {
            port: None,
            link,
            opener,
            session: None,
        }
    }

    /// Choose the port used for the next open.
    pub fn select_port(&mut self, port: &str) -> Result<(), ConnectorError> {
        if self.is_open() {
            let current = self.port.clone().unwrap_or_default();
            log::warn!("Ignoring port selection {}: session on {} is open", port, current);
            return Err(ConnectorError::SessionActive { port: current });
        }
        self.port = Some(port.to_string());
        Ok(())
    }

    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub fn link(&self) -> &LinkSettings {
        &self.link
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Open the session now instead of waiting for the first command.
    pub fn connect(&mut self) -> Result<(), ConnectorError> {
        self.session().map(|_| ())
    }

    /// The open transport, opening it first if needed
    pub fn session(&mut self) -> Result<&mut dyn Transport, ConnectorError> {
        let transport = match self.session.take() {
            Some(transport) => transport,
            None => {
                let port = self.port.as_deref().ok_or(ConnectorError::NoPortSelected)?;
                log::debug!("Connecting to scope on port {}", port);
                (self.opener)(port, &self.link)?
            }
        };
        Ok(&mut **self.session.insert(transport))
    }

    /// Release the session. A different port may be selected afterwards.
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            log::debug!("Closed scope session on {:?}", self.port);
        }
    }
}
