//! Stock [`FeedbackSink`] implementations.
//!
//! * [`FanoutSink`] – forwards every call to several sinks in order.
//! * [`JournalSink`] – records notifications and intrusion alerts in an
//!   [`AccessJournal`].
//! * [`DoorSignalSink`] – drives the door's indicator lamp through a
//!   [`SignalRouter`].
//!
//! Sinks never report failures to the loop; storage and hardware errors are
//! logged with `warn!` and otherwise swallowed.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;
use vigil_hal::{DoorSignal, SignalRouter};
use vigil_journal::{AccessEvent, AccessJournal, AccessResult};
use vigil_types::{BannerState, BoundingBox, NotificationKind, Notice};

use crate::feedback::FeedbackSink;

// ─────────────────────────────────────────────────────────────────────────────
// FanoutSink
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn FeedbackSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: append a sink.
    pub fn with(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl FeedbackSink for FanoutSink {
    fn draw_overlay(&self, bounding_box: Option<BoundingBox>, label: &str) {
        self.sinks.iter().for_each(|s| s.draw_overlay(bounding_box, label));
    }

    fn clear_overlay(&self) {
        self.sinks.iter().for_each(|s| s.clear_overlay());
    }

    fn set_banner_state(&self, state: BannerState) {
        self.sinks.iter().for_each(|s| s.set_banner_state(state));
    }

    fn notify(&self, kind: NotificationKind, notice: &Notice) {
        self.sinks.iter().for_each(|s| s.notify(kind, notice));
    }

    fn show_intrusion_alert(&self) {
        self.sinks.iter().for_each(|s| s.show_intrusion_alert());
    }

    fn hide_intrusion_alert(&self) {
        self.sinks.iter().for_each(|s| s.hide_intrusion_alert());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JournalSink
// ─────────────────────────────────────────────────────────────────────────────

/// Writes one [`AccessEvent`] per notification and per intrusion alert.
///
/// Intrusion events carry the zone of the most recent notification, falling
/// back to the access point's own zone.
///
/// Inserts run inline on the calling task.
pub struct JournalSink {
    journal: Mutex<AccessJournal>,
    zone: String,
    last_zone: Mutex<Option<String>>,
}

impl JournalSink {
    pub fn new(journal: AccessJournal, zone: impl Into<String>) -> Self {
        Self {
            journal: Mutex::new(journal),
            zone: zone.into(),
            last_zone: Mutex::new(None),
        }
    }

    fn record(&self, event: AccessEvent) {
        let journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = journal.record(&event) {
            warn!(result = %event.result, error = %e, "failed to journal access event");
        }
    }

    /// Hand the journal back, e.g. to print a report after the session.
    pub fn into_journal(self) -> AccessJournal {
        self.journal.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FeedbackSink for JournalSink {
    fn draw_overlay(&self, _bounding_box: Option<BoundingBox>, _label: &str) {}

    fn clear_overlay(&self) {}

    fn set_banner_state(&self, _state: BannerState) {}

    fn notify(&self, kind: NotificationKind, notice: &Notice) {
        let result = match kind {
            NotificationKind::Success => AccessResult::Granted,
            NotificationKind::Failure => AccessResult::Denied,
            NotificationKind::Retry => AccessResult::Retry,
        };
        let zone = notice.zone.clone().or_else(|| Some(self.zone.clone()));
        if let Some(z) = &notice.zone {
            *self.last_zone.lock().unwrap_or_else(PoisonError::into_inner) = Some(z.clone());
        }
        let note = notice.reason.clone().or_else(|| notice.role.clone()).unwrap_or_default();
        self.record(AccessEvent::new(result, notice.subject.clone(), zone, note));
    }

    fn show_intrusion_alert(&self) {
        let zone = self
            .last_zone
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.zone.clone());
        self.record(AccessEvent::new(
            AccessResult::Intrusion,
            None,
            Some(zone),
            "repeated zone-permission denials",
        ));
    }

    fn hide_intrusion_alert(&self) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// DoorSignalSink
// ─────────────────────────────────────────────────────────────────────────────

/// Mirrors the banner and intrusion alert on one door's indicator lamp.
///
/// | Feedback | Lamp |
/// |---|---|
/// | banner granted | `verde` |
/// | banner denied | `rojo` |
/// | banner retry | `parpadear` |
/// | intrusion shown | `alerta` |
/// | intrusion hidden | lamp of the last banner, `rojo` if none |
///
/// Commands are written inline; a stalled line stalls the caller.
pub struct DoorSignalSink {
    router: Mutex<SignalRouter>,
    door: u8,
    last_banner: Mutex<Option<BannerState>>,
}

impl DoorSignalSink {
    pub fn new(router: SignalRouter, door: u8) -> Self {
        Self {
            router: Mutex::new(router),
            door,
            last_banner: Mutex::new(None),
        }
    }

    pub fn door(&self) -> u8 {
        self.door
    }

    fn signal(&self, signal: DoorSignal) {
        let mut router = self.router.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = router.dispatch(self.door, signal) {
            warn!(door = self.door, signal = signal.token(), error = %e, "door lamp command failed");
        }
    }
}

fn lamp_for(state: BannerState) -> DoorSignal {
    match state {
        BannerState::Granted => DoorSignal::Granted,
        BannerState::Denied => DoorSignal::Denied,
        BannerState::Retry => DoorSignal::Blink,
    }
}

impl FeedbackSink for DoorSignalSink {
    fn draw_overlay(&self, _bounding_box: Option<BoundingBox>, _label: &str) {}

    fn clear_overlay(&self) {}

    fn set_banner_state(&self, state: BannerState) {
        *self.last_banner.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
        self.signal(lamp_for(state));
    }

    fn notify(&self, _kind: NotificationKind, _notice: &Notice) {}

    fn show_intrusion_alert(&self) {
        self.signal(DoorSignal::Alert);
    }

    fn hide_intrusion_alert(&self) {
        let last = *self.last_banner.lock().unwrap_or_else(PoisonError::into_inner);
        self.signal(last.map_or(DoorSignal::Denied, lamp_for));
    }
}
