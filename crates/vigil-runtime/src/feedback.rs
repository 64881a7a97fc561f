//! The [`FeedbackSink`] contract between the validation loop and whatever
//! renders its results (console, door lamps, journal, a UI bridge).
//!
//! Calls are fire-and-forget: the loop never reads anything back and
//! implementations must swallow (and log) their own failures.
//!
//! Sinks run synchronously on the session task. While one blocks, the
//! session observes no ticks, verdicts, timers or shutdown requests. A sink
//! backed by slow I/O must hand the work to its own thread or
//! `spawn_blocking` rather than stall the loop. [`crate::JournalSink`] and
//! [`crate::DoorSignalSink`] write inline and assume a local SQLite file and
//! a responsive serial line.

use vigil_types::{BannerState, BoundingBox, NotificationKind, Notice};

pub trait FeedbackSink: Send + Sync {
    /// Outline the recognised face and label it with the subject's name.
    /// `bounding_box` is `None` when the verifier did not report one.
    fn draw_overlay(&self, bounding_box: Option<BoundingBox>, label: &str);

    fn clear_overlay(&self);

    fn set_banner_state(&self, state: BannerState);

    fn notify(&self, kind: NotificationKind, notice: &Notice);

    fn show_intrusion_alert(&self);

    fn hide_intrusion_alert(&self);
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FeedbackSink for NullSink {
    fn draw_overlay(&self, _bounding_box: Option<BoundingBox>, _label: &str) {}
    fn clear_overlay(&self) {}
    fn set_banner_state(&self, _state: BannerState) {}
    fn notify(&self, _kind: NotificationKind, _notice: &Notice) {}
    fn show_intrusion_alert(&self) {}
    fn hide_intrusion_alert(&self) {}
}
