//! `vigil-runtime` – The Continuous Validation Loop
//!
//! Periodically captures a frame, asks the remote verifier who it is, and
//! turns the verdict into feedback: overlays, banners, notifications, door
//! lamps, journal entries and, after repeated zone-permission denials, an
//! intrusion alert.
//!
//! # Modules
//!
//! - [`attempt_tracker`] – pure transitions over
//!   [`AttemptState`][vigil_types::AttemptState]: the consecutive-denial
//!   streak and the intrusion flag.
//! - [`verifier`] – [`VerifierClient`][verifier::VerifierClient]: multipart
//!   upload to the verifier and classification of its reply into a
//!   [`VerificationOutcome`][vigil_types::VerificationOutcome]. The
//!   [`Verifier`][verifier::Verifier] trait is the seam tests script.
//! - [`validation_loop`] – [`ValidationLoop`][validation_loop::ValidationLoop]:
//!   the clock-free state machine (phase, streak, counters, sink calls).
//! - [`session`] – [`ValidationSession`][session::ValidationSession]: runs
//!   the loop on a Tokio task with the cadence timer, the in-flight guard,
//!   cooldown and alert-dismissal timers, and ordered teardown.
//! - [`feedback`] – the [`FeedbackSink`][feedback::FeedbackSink] contract.
//! - [`sinks`] – fan-out, journal and door-lamp sinks.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: `tracing`
//!   subscriber with optional OTLP span export.

pub mod attempt_tracker;
pub mod feedback;
pub mod session;
pub mod sinks;
pub mod telemetry;
pub mod validation_loop;
pub mod verifier;

#[cfg(test)]
mod testing;

pub use feedback::{FeedbackSink, NullSink};
pub use session::{SessionHandle, ValidationSession};
pub use sinks::{DoorSignalSink, FanoutSink, JournalSink};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use validation_loop::{
    LoopSnapshot, RoundDirective, RoundResult, SessionReport, ValidationConfig, ValidationLoop,
};
pub use verifier::{Verifier, VerifierClient, VerifierConfig, VerifierError, classify_response};
