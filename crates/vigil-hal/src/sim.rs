//! In-process simulated hardware for tests and headless demos.
//!
//! [`SimCamera`] produces tiny placeholder JPEG frames and can be scripted to
//! be missing entirely or to spend its first captures "negotiating".
//! [`SimSignalController`] records every lamp command it receives, and
//! [`SimSignalBoard`] wires a [`SignalRouter`] out of them.
//!
//! # Example
//!
//! ```rust
//! use vigil_hal::sim::SimSignalBoard;
//! use vigil_hal::DoorSignal;
//!
//! let (mut router, log) = SimSignalBoard::default_layout().build();
//! router.dispatch(5, DoorSignal::Granted).expect("sim lamp must succeed");
//! assert_eq!(log.commands(), vec!["verde5\n".to_string()]);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vigil_types::{Frame, VigilError};

use crate::camera::FrameSource;
use crate::registry::{DEFAULT_DOOR_LAYOUT, SignalRouter};
use crate::signal::SignalController;

/// Smallest byte sequence that still looks like a JPEG (SOI + EOI markers).
const PLACEHOLDER_JPEG: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xD9];

// ────────────────────────────────────────────────────────────────────────────
// Simulated camera
// ────────────────────────────────────────────────────────────────────────────

/// Shared view into a [`SimCamera`] that survives the camera being moved
/// into a session.
#[derive(Clone, Default)]
pub struct SimCameraProbe {
    open: Arc<AtomicBool>,
    captures: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl SimCameraProbe {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of `capture_frame` calls, successful or not.
    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    /// Number of times an open camera was closed.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// A simulated camera returning a placeholder JPEG per capture.
pub struct SimCamera {
    id: String,
    available: bool,
    warmup_remaining: usize,
    probe: SimCameraProbe,
}

impl SimCamera {
    /// Create an available simulated camera with the given identifier.
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            available: true,
            warmup_remaining: 0,
            probe: SimCameraProbe::default(),
        })
    }

    /// Make [`FrameSource::open`] fail as if no device were attached.
    pub fn unavailable(mut self: Box<Self>) -> Box<Self> {
        self.available = false;
        self
    }

    /// Fail the first `captures` captures with `CaptureFailed`, as a stream
    /// does while it is still negotiating.
    pub fn with_warmup(mut self: Box<Self>, captures: usize) -> Box<Self> {
        self.warmup_remaining = captures;
        self
    }

    pub fn probe(&self) -> SimCameraProbe {
        self.probe.clone()
    }
}

impl FrameSource for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn open(&mut self) -> Result<(), VigilError> {
        if !self.available {
            return Err(VigilError::DeviceUnavailable(format!(
                "camera '{}' is not attached",
                self.id
            )));
        }
        self.probe.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<Frame, VigilError> {
        self.probe.captures.fetch_add(1, Ordering::SeqCst);
        if !self.is_open() {
            return Err(VigilError::DeviceUnavailable(format!(
                "camera '{}' is not open",
                self.id
            )));
        }
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            return Err(VigilError::CaptureFailed(
                "stream still negotiating".to_string(),
            ));
        }
        Ok(Frame::new(PLACEHOLDER_JPEG.to_vec(), "image/jpeg"))
    }

    fn close(&mut self) -> Result<(), VigilError> {
        if self.probe.open.swap(false, Ordering::SeqCst) {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.probe.is_open()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated signal controllers
// ────────────────────────────────────────────────────────────────────────────

/// Shared, append-only record of lamp commands sent to simulated controllers.
#[derive(Clone, Default)]
pub struct SignalLog(Arc<Mutex<Vec<String>>>);

impl SignalLog {
    fn push(&self, command: &str) {
        if let Ok(mut log) = self.0.lock() {
            log.push(command.to_string());
        }
    }

    /// Snapshot of every command in send order.
    pub fn commands(&self) -> Vec<String> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

/// A simulated lamp controller. Connected controllers always succeed.
pub struct SimSignalController {
    id: String,
    connected: bool,
    log: SignalLog,
}

impl SimSignalController {
    pub fn new(id: impl Into<String>, log: SignalLog) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            connected: true,
            log,
        })
    }

    /// A controller whose serial link never came up.
    pub fn disconnected(id: impl Into<String>, log: SignalLog) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            connected: false,
            log,
        })
    }
}

impl SignalController for SimSignalController {
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
        self.log.push(command);
        Ok(())
    }
}

/// Builder for a [`SignalRouter`] populated with simulated controllers that
/// all share one [`SignalLog`].
#[derive(Default)]
pub struct SimSignalBoard {
    controllers: Vec<(String, Vec<u8>)>,
}

impl SimSignalBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two controllers serving doors 4–6 and 7–9.
    pub fn default_layout() -> Self {
        DEFAULT_DOOR_LAYOUT
            .iter()
            .fold(Self::new(), |board, (id, doors)| {
                board.with_controller(*id, doors)
            })
    }

    pub fn with_controller(mut self, id: impl Into<String>, doors: &[u8]) -> Self {
        self.controllers.push((id.into(), doors.to_vec()));
        self
    }

    /// Consume the builder and return the router plus its shared log.
    pub fn build(self) -> (SignalRouter, SignalLog) {
        let log = SignalLog::default();
        let mut router = SignalRouter::new();
        for (id, doors) in self.controllers {
            router.register_controller(SimSignalController::new(id, log.clone()), &doors);
        }
        (router, log)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::DoorSignal;

    #[test]
    fn sim_camera_requires_open() {
        let mut cam = SimCamera::new("front");
        assert!(matches!(
            cam.capture_frame(),
            Err(VigilError::DeviceUnavailable(_))
        ));
        cam.open().unwrap();
        let frame = cam.capture_frame().unwrap();
        assert_eq!(frame.data(), &PLACEHOLDER_JPEG);
        assert_eq!(cam.probe().captures(), 2);
    }

    #[test]
    fn sim_camera_warmup_fails_then_recovers() {
        let mut cam = SimCamera::new("front").with_warmup(2);
        cam.open().unwrap();
        assert!(matches!(cam.capture_frame(), Err(VigilError::CaptureFailed(_))));
        assert!(matches!(cam.capture_frame(), Err(VigilError::CaptureFailed(_))));
        assert!(cam.capture_frame().is_ok());
    }

    #[test]
    fn sim_camera_close_is_idempotent() {
        let mut cam = SimCamera::new("front");
        cam.open().unwrap();
        cam.close().unwrap();
        cam.close().unwrap();
        assert_eq!(cam.probe().closes(), 1);
    }

    #[test]
    fn disconnected_controller_reports_fault() {
        let log = SignalLog::default();
        let mut ctrl = SimSignalController::disconnected("1", log.clone());
        assert!(!ctrl.is_connected());
        assert!(matches!(
            ctrl.send("rojo4\n"),
            Err(VigilError::HardwareFault { .. })
        ));
        assert!(log.commands().is_empty());
    }

    #[test]
    fn default_board_routes_both_controllers() {
        let (mut router, log) = SimSignalBoard::default_layout().build();
        router.dispatch(4, DoorSignal::Denied).unwrap();
        router.dispatch(9, DoorSignal::Alert).unwrap();
        assert_eq!(log.commands(), vec!["rojo4\n", "alerta9\n"]);
    }
}
