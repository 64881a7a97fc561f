//! Test doubles shared by the runtime's unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use vigil_types::{BannerState, BoundingBox, Frame, NotificationKind, Notice, VerificationOutcome};

use crate::feedback::FeedbackSink;
use crate::verifier::Verifier;

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    DrawOverlay(Option<BoundingBox>, String),
    ClearOverlay,
    Banner(BannerState),
    Notify(NotificationKind, Notice),
    ShowIntrusion,
    HideIntrusion,
}

/// Records every sink call in order.
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&SinkCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn push(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl FeedbackSink for RecordingSink {
    fn draw_overlay(&self, bounding_box: Option<BoundingBox>, label: &str) {
        self.push(SinkCall::DrawOverlay(bounding_box, label.to_string()));
    }
    fn clear_overlay(&self) {
        self.push(SinkCall::ClearOverlay);
    }
    fn set_banner_state(&self, state: BannerState) {
        self.push(SinkCall::Banner(state));
    }
    fn notify(&self, kind: NotificationKind, notice: &Notice) {
        self.push(SinkCall::Notify(kind, notice.clone()));
    }
    fn show_intrusion_alert(&self) {
        self.push(SinkCall::ShowIntrusion);
    }
    fn hide_intrusion_alert(&self) {
        self.push(SinkCall::HideIntrusion);
    }
}

/// Verifier that answers from a script after a fixed latency, then repeats
/// a fallback outcome once the script runs dry.
pub struct ScriptedVerifier {
    latency: Duration,
    script: Mutex<VecDeque<VerificationOutcome>>,
    fallback: VerificationOutcome,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedVerifier {
    pub fn new(latency: Duration, script: impl IntoIterator<Item = VerificationOutcome>) -> Self {
        Self {
            latency,
            script: Mutex::new(script.into_iter().collect()),
            fallback: VerificationOutcome::Retry {
                reason: "scripted retry".into(),
            },
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn verify(&self, _frame: Frame) -> VerificationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
