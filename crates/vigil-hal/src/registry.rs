//! [`SignalRouter`] – door-to-controller routing for indicator lamps.
//!
//! Each door is wired to exactly one controller. The router resolves the
//! controller for a door and writes the encoded [`DoorSignal`] command to it.

use std::collections::HashMap;

use tracing::debug;
use vigil_types::VigilError;

use crate::signal::{DoorSignal, SignalController};

/// Stock wiring: controller `"1"` drives doors 4–6, controller `"2"` doors 7–9.
pub const DEFAULT_DOOR_LAYOUT: &[(&str, &[u8])] = &[("1", &[4, 5, 6]), ("2", &[7, 8, 9])];

/// Central lamp-controller registry and [`DoorSignal`] dispatcher.
#[derive(Default)]
pub struct SignalRouter {
    controllers: HashMap<String, Box<dyn SignalController>>,
    doors: HashMap<u8, String>,
}

impl SignalRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `controller` as the driver for `doors`.
    ///
    /// A controller with the same `id` is replaced, and any door already
    /// routed elsewhere is re-routed to this controller.
    pub fn register_controller(&mut self, controller: Box<dyn SignalController>, doors: &[u8]) {
        let id = controller.id().to_string();
        for door in doors {
            self.doors.insert(*door, id.clone());
        }
        self.controllers.insert(id, controller);
    }

    /// Identifier of the controller wired to `door`, if any.
    pub fn controller_for(&self, door: u8) -> Option<&str> {
        self.doors.get(&door).map(String::as_str)
    }

    /// Send `signal` to the lamp of `door`.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::HardwareFault`] when the door is not wired to a
    /// registered controller, when that controller is disconnected, or when
    /// the write fails.
    pub fn dispatch(&mut self, door: u8, signal: DoorSignal) -> Result<(), VigilError> {
        let component = format!("door_{door}");
        let Some(controller_id) = self.doors.get(&door) else {
            return Err(VigilError::HardwareFault {
                component,
                details: format!("door {door} is not wired to any controller"),
            });
        };
        let Some(controller) = self.controllers.get_mut(controller_id) else {
            return Err(VigilError::HardwareFault {
                component,
                details: format!("controller '{controller_id}' is not registered"),
            });
        };
        if !controller.is_connected() {
            return Err(VigilError::HardwareFault {
                component,
                details: format!("controller '{controller_id}' is not connected"),
            });
        }
        let command = signal.wire_command(door);
        controller.send(&command)?;
        debug!(door, controller = controller_id.as_str(), command = command.trim_end(), "lamp command sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SignalLog, SimSignalController};

    #[test]
    fn routes_door_to_its_controller() {
        let log_a = SignalLog::default();
        let log_b = SignalLog::default();
        let mut router = SignalRouter::new();
        router.register_controller(SimSignalController::new("1", log_a.clone()), &[4, 5, 6]);
        router.register_controller(SimSignalController::new("2", log_b.clone()), &[7, 8, 9]);

        assert_eq!(router.controller_for(5), Some("1"));
        assert_eq!(router.controller_for(8), Some("2"));

        router.dispatch(8, DoorSignal::Granted).unwrap();
        assert!(log_a.commands().is_empty());
        assert_eq!(log_b.commands(), vec!["verde8\n"]);
    }

    #[test]
    fn unknown_door_is_a_hardware_fault() {
        let mut router = SignalRouter::new();
        let err = router.dispatch(3, DoorSignal::Denied).unwrap_err();
        assert!(matches!(
            err,
            VigilError::HardwareFault { ref component, .. } if component == "door_3"
        ));
    }

    #[test]
    fn disconnected_controller_is_a_hardware_fault() {
        let log = SignalLog::default();
        let mut router = SignalRouter::new();
        router.register_controller(SimSignalController::disconnected("1", log.clone()), &[4]);
        let err = router.dispatch(4, DoorSignal::Alert).unwrap_err();
        assert!(err.to_string().contains("not connected"));
        assert!(log.commands().is_empty());
    }

    #[test]
    fn re_registering_a_door_moves_it() {
        let log_a = SignalLog::default();
        let log_b = SignalLog::default();
        let mut router = SignalRouter::new();
        router.register_controller(SimSignalController::new("1", log_a.clone()), &[4]);
        router.register_controller(SimSignalController::new("2", log_b.clone()), &[4]);
        router.dispatch(4, DoorSignal::Blink).unwrap();
        assert!(log_a.commands().is_empty());
        assert_eq!(log_b.commands(), vec!["parpadear4\n"]);
    }
}
