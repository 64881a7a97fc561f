//! `vigil-hal` – Hardware Abstraction Layer
//!
//! Everything the validation client touches that is physically attached to
//! the access point.
//!
//! # Modules
//!
//! - [`camera`] – the [`FrameSource`][camera::FrameSource] contract and the
//!   scoped [`CameraGuard`][camera::CameraGuard] that guarantees the camera is
//!   released on every exit path.
//! - [`file_camera`] – [`DirectoryCamera`][file_camera::DirectoryCamera]:
//!   replays encoded images from a directory, one per capture.
//! - [`signal`] – door indicator lamps: [`DoorSignal`][signal::DoorSignal],
//!   the [`LineSignalController`][signal::LineSignalController] serial driver
//!   and the [`SignalController`][signal::SignalController] trait.
//! - [`registry`] – [`SignalRouter`][registry::SignalRouter]: resolves a door
//!   number to the controller wired to it.
//! - [`sim`] – scripted stand-ins for headless tests and demos.

pub mod camera;
pub mod file_camera;
pub mod registry;
pub mod signal;
pub mod sim;

pub use camera::{CameraGuard, FrameSource};
pub use file_camera::DirectoryCamera;
pub use registry::SignalRouter;
pub use signal::{DoorSignal, LineSignalController, SignalController};
