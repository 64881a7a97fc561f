//! Door indicator lamps driven over a line-oriented serial protocol.
//!
//! Each command is one ASCII line: the signal token immediately followed by
//! the door number, e.g. `"verde4\n"` turns door 4's lamp green.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::debug;
use vigil_types::VigilError;

/// Lamp pattern requested for a door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoorSignal {
    /// Solid green.
    Granted,
    /// Solid red.
    Denied,
    /// Blinking, used while the subject is asked to try again.
    Blink,
    /// Intrusion pattern.
    Alert,
}

impl DoorSignal {
    /// Token understood by the controller firmware.
    pub fn token(&self) -> &'static str {
        match self {
            DoorSignal::Granted => "verde",
            DoorSignal::Denied => "rojo",
            DoorSignal::Blink => "parpadear",
            DoorSignal::Alert => "alerta",
        }
    }

    /// Full command line for `door`, newline terminated.
    pub fn wire_command(&self, door: u8) -> String {
        format!("{}{door}\n", self.token())
    }
}

/// A lamp controller serving one or more doors.
///
/// Drivers implement this trait and register themselves with a
/// [`SignalRouter`][crate::registry::SignalRouter].
pub trait SignalController: Send {
    /// Stable identifier for this controller, e.g. `"1"`.
    fn id(&self) -> &str;

    /// `false` when the link to the controller is down.
    fn is_connected(&self) -> bool;

    /// Write one command line.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::HardwareFault`] if the command cannot be written.
    fn send(&mut self, command: &str) -> Result<(), VigilError>;
}

/// Controller reached through a byte stream, typically the serial device
/// node the controller enumerates as (`/dev/ttyUSB0`). The line settings
/// (9600 8N1) are expected to be configured on the port beforehand.
///
/// A failed write marks the controller disconnected; later sends fail fast
/// until a new controller is registered.
pub struct LineSignalController {
    id: String,
    port: Box<dyn Write + Send>,
    connected: bool,
}

impl LineSignalController {
    pub fn new(id: impl Into<String>, port: Box<dyn Write + Send>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            port,
            connected: true,
        })
    }

    /// Open the device node at `path` for writing.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::HardwareFault`] when the device cannot be opened.
    pub fn open(id: impl Into<String>, path: impl AsRef<Path>) -> Result<Box<Self>, VigilError> {
        let id = id.into();
        let path = path.as_ref();
        let port = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| VigilError::HardwareFault {
                component: id.clone(),
                details: format!("cannot open {}: {e}", path.display()),
            })?;
        debug!(controller = %id, port = %path.display(), "lamp controller opened");
        Ok(Self::new(id, Box::new(port)))
    }
}

impl SignalController for LineSignalController {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send(&mut self, command: &str) -> Result<(), VigilError> {
        if !self.connected {
            return Err(VigilError::HardwareFault {
                component: self.id.clone(),
                details: "controller is not connected".to_string(),
            });
        }
        let written = self
            .port
            .write_all(command.as_bytes())
            .and_then(|()| self.port.flush());
        written.map_err(|e| {
            self.connected = false;
            VigilError::HardwareFault {
                component: self.id.clone(),
                details: format!("write failed: {e}"),
            }
        })
    }
}
