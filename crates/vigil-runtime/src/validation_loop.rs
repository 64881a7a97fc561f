//! [`ValidationLoop`] – the synchronous core of a validation session.
//!
//! The loop owns the session's [`LoopPhase`], its [`AttemptState`], the
//! [`FeedbackSink`] and the running [`SessionReport`]. It has no clock of its
//! own: the session driver (see [`crate::session`]) calls into it when a
//! tick fires, when a verification resolves, when a cooldown ends and when
//! the intrusion alert's display window runs out.
//!
//! # Phases
//!
//! ```text
//!   Idle ──tick──▶ Capturing ──frame──▶ AwaitingVerifier ──granted──▶ CooldownAfterGrant
//!    ▲                 │ capture failed          │ other outcome             │
//!    └─────────────────┴─────────────────────────┘◀──────cooldown over──────┘
//! ```
//!
//! A tick that arrives in any phase other than `Idle` is dropped, which is
//! what keeps at most one verification in flight.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use vigil_hal::{CameraGuard, sim::SimCamera};
//! use vigil_runtime::feedback::NullSink;
//! use vigil_runtime::validation_loop::{RoundDirective, ValidationConfig, ValidationLoop};
//! use vigil_types::{LoopPhase, VerificationOutcome};
//!
//! let mut camera = CameraGuard::acquire(SimCamera::new("door_cam")).unwrap();
//! let mut validation = ValidationLoop::new(ValidationConfig::default(), Arc::new(NullSink)).unwrap();
//!
//! let frame = validation.begin_round(&mut camera).expect("idle loop captures");
//! assert_eq!(validation.phase(), LoopPhase::AwaitingVerifier);
//! drop(frame);
//!
//! let result = validation.complete_round(VerificationOutcome::Retry { reason: "blurry".into() });
//! assert_eq!(result.directive, RoundDirective::Resume);
//! assert_eq!(validation.phase(), LoopPhase::Idle);
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vigil_hal::CameraGuard;
use vigil_types::{
    AttemptState, BannerState, DenialMarkers, Frame, LoopPhase, NotificationKind, Notice,
    VerificationOutcome, VigilError,
};

use crate::attempt_tracker;
use crate::feedback::FeedbackSink;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Timing and threshold inputs for one [`ValidationLoop`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Capture cadence.
    pub tick_interval: Duration,
    /// How long capturing stays paused after a grant.
    pub cooldown: Duration,
    /// Consecutive zone-permission denials that raise the intrusion alert.
    pub intrusion_threshold: u32,
    /// How long the intrusion alert stays up before it clears itself.
    pub intrusion_window: Duration,
    /// Denial reasons containing one of these count toward the streak.
    pub permission_markers: DenialMarkers,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(3),
            cooldown: Duration::from_secs(10),
            intrusion_threshold: 3,
            intrusion_window: Duration::from_secs(7),
            permission_markers: DenialMarkers::default(),
        }
    }
}

impl ValidationConfig {
    /// # Errors
    ///
    /// Returns [`VigilError::Config`] for a zero tick interval or a zero
    /// intrusion threshold.
    pub fn validate(&self) -> Result<(), VigilError> {
        if self.tick_interval.is_zero() {
            return Err(VigilError::Config("tick_interval must be non-zero".into()));
        }
        if self.intrusion_threshold == 0 {
            return Err(VigilError::Config(
                "intrusion_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Round results and reporting
// ─────────────────────────────────────────────────────────────────────────────

/// What the driver must do with the cadence timer after a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundDirective {
    /// Keep ticking.
    Resume,
    /// Stop ticking for this long, then call
    /// [`ValidationLoop::finish_cooldown`] and re-arm.
    Cooldown(Duration),
}

/// Result of [`ValidationLoop::complete_round`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundResult {
    pub directive: RoundDirective,
    /// `Some(window)` when this round raised (or re-raised) the intrusion
    /// alert; the driver calls [`ValidationLoop::dismiss_intrusion`] once
    /// `window` has elapsed.
    pub dismiss_after: Option<Duration>,
}

impl RoundResult {
    fn resume() -> Self {
        Self {
            directive: RoundDirective::Resume,
            dismiss_after: None,
        }
    }
}

/// Counters accumulated over one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Timer ticks observed, dropped ones included.
    pub ticks: u64,
    /// Frames handed to the verifier.
    pub rounds: u64,
    pub grants: u64,
    /// All denials, zone-permission ones included.
    pub denials: u64,
    pub permission_denials: u64,
    pub retries: u64,
    pub transport_errors: u64,
    pub capture_failures: u64,
    /// Ticks dropped because a round was still outstanding.
    pub dropped_ticks: u64,
    pub intrusions: u64,
}

/// Point-in-time view of a running loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSnapshot {
    pub phase: LoopPhase,
    pub attempts: AttemptState,
}

// ─────────────────────────────────────────────────────────────────────────────
// ValidationLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct ValidationLoop {
    config: ValidationConfig,
    sink: Arc<dyn FeedbackSink>,
    phase: LoopPhase,
    attempts: AttemptState,
    report: SessionReport,
}

impl ValidationLoop {
    /// # Errors
    ///
    /// Returns [`VigilError::Config`] if `config` fails
    /// [`ValidationConfig::validate`].
    pub fn new(config: ValidationConfig, sink: Arc<dyn FeedbackSink>) -> Result<Self, VigilError> {
        config.validate()?;
        Ok(Self {
            config,
            sink,
            phase: LoopPhase::Idle,
            attempts: AttemptState::default(),
            report: SessionReport::default(),
        })
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn attempts(&self) -> AttemptState {
        self.attempts
    }

    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    pub fn snapshot(&self) -> LoopSnapshot {
        LoopSnapshot {
            phase: self.phase,
            attempts: self.attempts,
        }
    }

    pub fn into_report(self) -> SessionReport {
        self.report
    }

    /// Handle one timer tick.
    ///
    /// Returns the frame to verify, or `None` when the tick was dropped (a
    /// round is outstanding or a cooldown is running) or the capture failed.
    /// Capture failures are counted but never reach the sink.
    pub fn begin_round(&mut self, camera: &mut CameraGuard) -> Option<Frame> {
        self.report.ticks += 1;
        if self.phase != LoopPhase::Idle {
            self.report.dropped_ticks += 1;
            debug!(phase = %self.phase, "tick dropped");
            return None;
        }

        self.phase = LoopPhase::Capturing;
        match camera.capture_frame() {
            Ok(frame) => {
                self.phase = LoopPhase::AwaitingVerifier;
                self.report.rounds += 1;
                debug!(frame_id = %frame.id(), camera = camera.id(), "frame captured");
                Some(frame)
            }
            Err(e) => {
                self.phase = LoopPhase::Idle;
                self.report.capture_failures += 1;
                debug!(error = %e, "capture skipped");
                None
            }
        }
    }

    /// Apply the verifier's verdict for the outstanding round.
    ///
    /// A call while no round is outstanding is ignored.
    pub fn complete_round(&mut self, outcome: VerificationOutcome) -> RoundResult {
        if self.phase != LoopPhase::AwaitingVerifier {
            warn!(phase = %self.phase, outcome = outcome.label(), "stale verification result ignored");
            return RoundResult::resume();
        }

        match outcome {
            VerificationOutcome::Granted {
                subject_name,
                role,
                zone_name,
                bounding_box,
            } => {
                info!(subject = %subject_name, zone = %zone_name, "access granted");
                self.sink.draw_overlay(bounding_box, &subject_name);
                self.sink.set_banner_state(BannerState::Granted);
                self.sink.notify(
                    NotificationKind::Success,
                    &Notice::granted(subject_name, role, zone_name),
                );
                self.attempts = attempt_tracker::on_granted(self.attempts);
                self.report.grants += 1;
                self.phase = LoopPhase::CooldownAfterGrant;
                RoundResult {
                    directive: RoundDirective::Cooldown(self.config.cooldown),
                    dismiss_after: None,
                }
            }
            VerificationOutcome::Denied { zone_name, reason } => {
                self.sink.clear_overlay();
                self.sink.set_banner_state(BannerState::Denied);
                self.report.denials += 1;

                let permission = self.config.permission_markers.matches(&reason);
                info!(zone = %zone_name, %reason, permission, "access denied");
                self.sink
                    .notify(NotificationKind::Failure, &Notice::denied(zone_name, reason));

                let mut dismiss_after = None;
                if permission {
                    self.report.permission_denials += 1;
                    let (next, tripped) = attempt_tracker::on_permission_denied(
                        self.attempts,
                        self.config.intrusion_threshold,
                    );
                    self.attempts = next;
                    if tripped {
                        warn!(
                            threshold = self.config.intrusion_threshold,
                            "intrusion alert raised"
                        );
                        self.report.intrusions += 1;
                        self.sink.show_intrusion_alert();
                        dismiss_after = Some(self.config.intrusion_window);
                    }
                } else {
                    self.attempts = attempt_tracker::on_other_outcome(self.attempts);
                }
                self.phase = LoopPhase::Idle;
                RoundResult {
                    directive: RoundDirective::Resume,
                    dismiss_after,
                }
            }
            VerificationOutcome::Retry { reason } => {
                debug!(%reason, "verifier asked for another capture");
                self.sink.clear_overlay();
                self.sink.set_banner_state(BannerState::Retry);
                self.sink
                    .notify(NotificationKind::Retry, &Notice::retry(reason));
                self.attempts = attempt_tracker::on_other_outcome(self.attempts);
                self.report.retries += 1;
                self.phase = LoopPhase::Idle;
                RoundResult::resume()
            }
            VerificationOutcome::TransportError { detail } => {
                warn!(%detail, "verification round lost");
                self.attempts = attempt_tracker::on_other_outcome(self.attempts);
                self.report.transport_errors += 1;
                self.phase = LoopPhase::Idle;
                RoundResult::resume()
            }
        }
    }

    /// End the post-grant cooldown. No-op in any other phase.
    pub fn finish_cooldown(&mut self) {
        if self.phase == LoopPhase::CooldownAfterGrant {
            debug!("cooldown over");
            self.phase = LoopPhase::Idle;
        }
    }

    /// Take the intrusion alert down once its display window has elapsed.
    pub fn dismiss_intrusion(&mut self) {
        if self.attempts.intrusion_active {
            self.attempts = attempt_tracker::clear_intrusion(self.attempts);
            self.sink.hide_intrusion_alert();
            info!("intrusion alert cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSink, SinkCall};
    use vigil_hal::sim::SimCamera;
    use vigil_types::BoundingBox;

    fn setup(threshold: u32) -> (ValidationLoop, Arc<RecordingSink>, CameraGuard) {
        let sink = Arc::new(RecordingSink::default());
        let config = ValidationConfig {
            intrusion_threshold: threshold,
            ..ValidationConfig::default()
        };
        let validation = ValidationLoop::new(config, sink.clone()).unwrap();
        let camera = CameraGuard::acquire(SimCamera::new("cam")).unwrap();
        (validation, sink, camera)
    }

    fn round(v: &mut ValidationLoop, camera: &mut CameraGuard, outcome: VerificationOutcome) -> RoundResult {
        v.begin_round(camera).expect("loop should be idle");
        v.complete_round(outcome)
    }

    fn no_permission() -> VerificationOutcome {
        VerificationOutcome::Denied {
            zone_name: "4".into(),
            reason: "no permission for this zone".into(),
        }
    }

    fn granted() -> VerificationOutcome {
        VerificationOutcome::Granted {
            subject_name: "Ana Ruiz".into(),
            role: "Guard".into(),
            zone_name: "4".into(),
            bounding_box: BoundingBox::from_slice(&[1.0, 2.0, 3.0, 4.0]),
        }
    }

    #[test]
    fn config_validation_rejects_degenerate_values() {
        assert!(ValidationConfig::default().validate().is_ok());
        let zero_tick = ValidationConfig {
            tick_interval: Duration::ZERO,
            ..ValidationConfig::default()
        };
        assert!(matches!(zero_tick.validate(), Err(VigilError::Config(_))));
        let zero_threshold = ValidationConfig {
            intrusion_threshold: 0,
            ..ValidationConfig::default()
        };
        assert!(ValidationLoop::new(zero_threshold, Arc::new(RecordingSink::default())).is_err());
    }

    #[test]
    fn ticks_are_dropped_while_a_round_is_outstanding() {
        let (mut v, sink, mut camera) = setup(3);
        assert!(v.begin_round(&mut camera).is_some());
        assert!(v.begin_round(&mut camera).is_none());
        assert!(v.begin_round(&mut camera).is_none());
        assert_eq!(v.report().dropped_ticks, 2);
        assert_eq!(v.report().rounds, 1);
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn capture_failure_returns_to_idle_silently() {
        let sink = Arc::new(RecordingSink::default());
        let mut v = ValidationLoop::new(ValidationConfig::default(), sink.clone()).unwrap();
        let mut camera = CameraGuard::acquire(SimCamera::new("cam").with_warmup(1)).unwrap();

        assert!(v.begin_round(&mut camera).is_none());
        assert_eq!(v.phase(), LoopPhase::Idle);
        assert_eq!(v.report().capture_failures, 1);
        assert!(v.begin_round(&mut camera).is_some());
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn grant_renders_and_enters_cooldown() {
        let (mut v, sink, mut camera) = setup(3);
        let result = round(&mut v, &mut camera, granted());
        assert_eq!(result.directive, RoundDirective::Cooldown(Duration::from_secs(10)));
        assert_eq!(v.phase(), LoopPhase::CooldownAfterGrant);

        assert!(v.begin_round(&mut camera).is_none(), "no capture during cooldown");

        let calls = sink.calls();
        assert!(matches!(&calls[0], SinkCall::DrawOverlay(Some(_), label) if label == "Ana Ruiz"));
        assert_eq!(calls[1], SinkCall::Banner(BannerState::Granted));
        assert_eq!(
            calls[2],
            SinkCall::Notify(NotificationKind::Success, Notice::granted("Ana Ruiz", "Guard", "4"))
        );

        v.finish_cooldown();
        assert_eq!(v.phase(), LoopPhase::Idle);
        assert!(v.begin_round(&mut camera).is_some());
    }

    #[test]
    fn grant_without_bbox_still_labels_subject() {
        let (mut v, sink, mut camera) = setup(3);
        round(
            &mut v,
            &mut camera,
            VerificationOutcome::Granted {
                subject_name: "Luis".into(),
                role: String::new(),
                zone_name: "7".into(),
                bounding_box: None,
            },
        );
        assert_eq!(sink.calls()[0], SinkCall::DrawOverlay(None, "Luis".into()));
    }

    #[test]
    fn scenario_a_three_permission_denials_trip_once() {
        let (mut v, sink, mut camera) = setup(3);
        let mut windows = Vec::new();
        for _ in 0..3 {
            let result = round(&mut v, &mut camera, no_permission());
            assert_eq!(result.directive, RoundDirective::Resume);
            windows.push(result.dismiss_after);
        }
        assert_eq!(windows, vec![None, None, Some(Duration::from_secs(7))]);
        assert_eq!(sink.count(|c| *c == SinkCall::ShowIntrusion), 1);
        assert_eq!(v.attempts().consecutive_denials, 0);
        assert!(v.attempts().intrusion_active);
        assert_eq!(v.report().intrusions, 1);

        v.dismiss_intrusion();
        assert!(!v.attempts().intrusion_active);
        assert_eq!(sink.count(|c| *c == SinkCall::HideIntrusion), 1);
        v.dismiss_intrusion();
        assert_eq!(sink.count(|c| *c == SinkCall::HideIntrusion), 1);
    }

    #[test]
    fn scenario_b_grant_breaks_the_streak() {
        let (mut v, sink, mut camera) = setup(3);
        round(&mut v, &mut camera, no_permission());
        round(&mut v, &mut camera, no_permission());
        assert_eq!(v.attempts().consecutive_denials, 2);
        round(&mut v, &mut camera, granted());

        assert_eq!(v.attempts().consecutive_denials, 0);
        assert_eq!(sink.count(|c| *c == SinkCall::ShowIntrusion), 0);
    }

    #[test]
    fn other_denials_and_retries_leave_the_streak_alone() {
        let (mut v, sink, mut camera) = setup(3);
        round(&mut v, &mut camera, no_permission());
        round(
            &mut v,
            &mut camera,
            VerificationOutcome::Denied {
                zone_name: "4".into(),
                reason: "Rostro no reconocido".into(),
            },
        );
        round(
            &mut v,
            &mut camera,
            VerificationOutcome::Retry {
                reason: "Acérquese".into(),
            },
        );
        assert_eq!(v.attempts().consecutive_denials, 1);
        assert_eq!(v.report().denials, 2);
        assert_eq!(v.report().permission_denials, 1);
        assert_eq!(v.report().retries, 1);
        assert!(sink.calls().contains(&SinkCall::Banner(BannerState::Retry)));
        assert!(sink.calls().contains(&SinkCall::Notify(
            NotificationKind::Retry,
            Notice::retry("Acérquese")
        )));
    }

    #[test]
    fn scenario_c_transport_error_is_silent_and_resumes() {
        let (mut v, sink, mut camera) = setup(3);
        round(&mut v, &mut camera, no_permission());
        let calls_before = sink.calls().len();

        let result = round(
            &mut v,
            &mut camera,
            VerificationOutcome::TransportError {
                detail: "connection refused".into(),
            },
        );
        assert_eq!(result, RoundResult::resume());
        assert_eq!(v.attempts().consecutive_denials, 1);
        assert_eq!(sink.calls().len(), calls_before);
        assert!(v.begin_round(&mut camera).is_some(), "next tick captures");
    }

    #[test]
    fn retrip_while_alert_is_up_reshows_it() {
        let (mut v, sink, mut camera) = setup(1);
        let first = round(&mut v, &mut camera, no_permission());
        let second = round(&mut v, &mut camera, no_permission());
        assert!(first.dismiss_after.is_some());
        assert!(second.dismiss_after.is_some());
        assert_eq!(sink.count(|c| *c == SinkCall::ShowIntrusion), 2);
        assert_eq!(v.report().intrusions, 2);
    }

    #[test]
    fn stale_completion_is_ignored() {
        let (mut v, sink, _camera) = setup(3);
        let result = v.complete_round(granted());
        assert_eq!(result, RoundResult::resume());
        assert_eq!(v.phase(), LoopPhase::Idle);
        assert!(sink.calls().is_empty());
        assert_eq!(v.report().grants, 0);
    }
}
