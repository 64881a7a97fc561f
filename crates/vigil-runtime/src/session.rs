//! [`ValidationSession`] – drives a [`ValidationLoop`] on a Tokio task.
//!
//! One task per session multiplexes five event sources with
//! `tokio::select!`:
//!
//! 1. the shutdown signal from [`SessionHandle`],
//! 2. the single in-flight verification future,
//! 3. the post-grant cooldown timer,
//! 4. the intrusion-alert dismissal timer,
//! 5. the capture cadence interval (disabled while a cooldown runs).
//!
//! Because every transition happens on that one task, two rounds can never
//! overlap: a tick that fires while a round is outstanding reaches
//! [`ValidationLoop::begin_round`] and is dropped there.
//!
//! # Teardown
//!
//! [`SessionHandle::shutdown`] (or dropping the handle) stops the task. The
//! task then drops the cadence interval, the pending verification (its
//! result is never delivered), the cooldown and dismissal timers, and
//! finally releases the camera. No [`FeedbackSink`] call happens after the
//! shutdown signal is observed.
//!
//! [`FeedbackSink`]: crate::feedback::FeedbackSink

use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};
use vigil_hal::{CameraGuard, FrameSource};
use vigil_types::{VerificationOutcome, VigilError};

use crate::validation_loop::{LoopSnapshot, RoundDirective, SessionReport, ValidationLoop};
use crate::verifier::Verifier;

type VerifyFuture = Pin<Box<dyn Future<Output = VerificationOutcome> + Send>>;
type Timer = Option<Pin<Box<Sleep>>>;

// ─────────────────────────────────────────────────────────────────────────────
// ValidationSession
// ─────────────────────────────────────────────────────────────────────────────

pub struct ValidationSession;

impl ValidationSession {
    /// Open the camera and start ticking.
    ///
    /// The first capture happens one `tick_interval` after this call.
    ///
    /// # Errors
    ///
    /// Returns the camera's [`VigilError::DeviceUnavailable`] when it cannot
    /// be opened; no task is spawned in that case.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        validation: ValidationLoop,
        source: Box<dyn FrameSource>,
        verifier: Arc<dyn Verifier>,
    ) -> Result<SessionHandle, VigilError> {
        let camera = CameraGuard::acquire(source)?;
        info!(camera = camera.id(), "validation session started");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(validation.snapshot());
        let task = tokio::spawn(run(validation, camera, verifier, shutdown_rx, snapshot_tx));

        Ok(SessionHandle {
            shutdown: Some(shutdown_tx),
            snapshot: snapshot_rx,
            task: Some(task),
        })
    }
}

async fn run(
    mut validation: ValidationLoop,
    mut camera: CameraGuard,
    verifier: Arc<dyn Verifier>,
    mut shutdown: oneshot::Receiver<()>,
    snapshot: watch::Sender<LoopSnapshot>,
) -> Result<SessionReport, VigilError> {
    let period = validation.config().tick_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: Option<VerifyFuture> = None;
    let mut cooldown: Timer = None;
    let mut dismissal: Timer = None;

    loop {
        tokio::select! {
            biased;

            // Fires on an explicit shutdown and when the handle is dropped.
            _ = &mut shutdown => break,

            outcome = next_outcome(&mut in_flight) => {
                in_flight = None;
                let result = validation.complete_round(outcome);
                if let RoundDirective::Cooldown(duration) = result.directive {
                    cooldown = Some(Box::pin(time::sleep(duration)));
                }
                if let Some(window) = result.dismiss_after {
                    dismissal = Some(Box::pin(time::sleep(window)));
                }
            }

            _ = elapsed(&mut cooldown) => {
                cooldown = None;
                validation.finish_cooldown();
                ticker.reset();
            }

            _ = elapsed(&mut dismissal) => {
                dismissal = None;
                validation.dismiss_intrusion();
            }

            _ = ticker.tick(), if cooldown.is_none() => {
                if let Some(frame) = validation.begin_round(&mut camera) {
                    let verifier = Arc::clone(&verifier);
                    in_flight = Some(Box::pin(async move { verifier.verify(frame).await }));
                }
            }
        }
        snapshot.send_replace(validation.snapshot());
    }

    drop(ticker);
    if in_flight.take().is_some() {
        debug!("pending verification abandoned");
    }
    drop(cooldown);
    drop(dismissal);

    let report = validation.into_report();
    camera.release()?;
    info!(rounds = report.rounds, grants = report.grants, "validation session stopped");
    Ok(report)
}

async fn next_outcome(in_flight: &mut Option<VerifyFuture>) -> VerificationOutcome {
    match in_flight.as_mut() {
        Some(fut) => fut.await,
        None => future::pending().await,
    }
}

async fn elapsed(timer: &mut Timer) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Owner-side handle of a running session.
///
/// Dropping the handle tears the session down in the background; call
/// [`SessionHandle::shutdown`] to wait for teardown and get the report.
pub struct SessionHandle {
    shutdown: Option<oneshot::Sender<()>>,
    snapshot: watch::Receiver<LoopSnapshot>,
    task: Option<JoinHandle<Result<SessionReport, VigilError>>>,
}

impl SessionHandle {
    /// Latest phase and attempt state.
    pub fn snapshot(&self) -> LoopSnapshot {
        *self.snapshot.borrow()
    }

    /// Receiver that wakes on every state change.
    pub fn subscribe(&self) -> watch::Receiver<LoopSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the session and wait for the camera to be released.
    ///
    /// # Errors
    ///
    /// Returns the camera's close error, or [`VigilError::Session`] if the
    /// session task panicked.
    pub async fn shutdown(mut self) -> Result<SessionReport, VigilError> {
        if let Some(tx) = self.shutdown.take() {
            // The task may already be gone; the join below reports why.
            let _ = tx.send(());
        }
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| VigilError::Session(format!("session task failed: {e}")))?,
            None => Err(VigilError::Session("session already shut down".into())),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            if tx.send(()).is_err() {
                warn!("validation session ended before its handle was dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{RecordingSink, ScriptedVerifier, SinkCall};
    use crate::validation_loop::ValidationConfig;
    use vigil_hal::sim::SimCamera;
    use vigil_types::LoopPhase;

    fn config() -> ValidationConfig {
        ValidationConfig {
            tick_interval: Duration::from_secs(3),
            cooldown: Duration::from_secs(10),
            intrusion_threshold: 3,
            intrusion_window: Duration::from_secs(7),
            ..ValidationConfig::default()
        }
    }

    fn no_permission() -> VerificationOutcome {
        VerificationOutcome::Denied {
            zone_name: "4".into(),
            reason: "Empleado sin permiso para el departamento 4".into(),
        }
    }

    fn granted() -> VerificationOutcome {
        VerificationOutcome::Granted {
            subject_name: "Ana Ruiz".into(),
            role: "Guard".into(),
            zone_name: "4".into(),
            bounding_box: None,
        }
    }

    async fn advance(ms: u64) {
        time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_fails_without_camera() {
        let validation = ValidationLoop::new(config(), Arc::new(RecordingSink::default())).unwrap();
        let verifier = Arc::new(ScriptedVerifier::new(Duration::ZERO, []));
        let result = ValidationSession::start(validation, SimCamera::new("cam").unavailable(), verifier.clone());
        assert!(matches!(result, Err(VigilError::DeviceUnavailable(_))));
        assert_eq!(verifier.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_verification_in_flight() {
        let sink = Arc::new(RecordingSink::default());
        let validation = ValidationLoop::new(config(), sink).unwrap();
        let verifier = Arc::new(ScriptedVerifier::new(Duration::from_secs(7), []));
        let handle = ValidationSession::start(validation, SimCamera::new("cam"), verifier.clone()).unwrap();

        // Rounds start at 3, 12 and 21; ticks at 6, 9, 15, 18, 24, 27 are dropped.
        advance(29_000).await;
        let report = handle.shutdown().await.unwrap();

        assert_eq!(verifier.max_in_flight(), 1);
        assert_eq!(report.rounds, 3);
        assert_eq!(report.dropped_ticks, 6);
        assert_eq!(report.retries, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn no_capture_during_cooldown() {
        let sink = Arc::new(RecordingSink::default());
        let validation = ValidationLoop::new(config(), sink.clone()).unwrap();
        let camera = SimCamera::new("cam");
        let probe = camera.probe();
        let verifier = Arc::new(ScriptedVerifier::new(Duration::ZERO, [granted()]));
        let handle = ValidationSession::start(validation, camera, verifier).unwrap();

        // Granted at 3 s; cooldown until 13 s; interval re-armed, next tick at 16 s.
        advance(3_500).await;
        assert_eq!(probe.captures(), 1);
        assert_eq!(handle.snapshot().phase, LoopPhase::CooldownAfterGrant);

        advance(12_400).await;
        assert_eq!(probe.captures(), 1, "no capture may run during cooldown");
        assert_eq!(handle.snapshot().phase, LoopPhase::Idle);

        advance(200).await;
        assert_eq!(probe.captures(), 2);

        let report = handle.shutdown().await.unwrap();
        assert_eq!(report.grants, 1);
        assert_eq!(sink.count(|c| matches!(c, SinkCall::DrawOverlay(None, _))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn intrusion_alert_clears_itself() {
        let sink = Arc::new(RecordingSink::default());
        let validation = ValidationLoop::new(config(), sink.clone()).unwrap();
        let verifier = Arc::new(ScriptedVerifier::new(
            Duration::ZERO,
            [no_permission(), no_permission(), no_permission()],
        ));
        let handle = ValidationSession::start(validation, SimCamera::new("cam"), verifier).unwrap();

        // Third denial at 9 s trips the alert; it comes down at 16 s.
        advance(10_000).await;
        let snap = handle.snapshot();
        assert!(snap.attempts.intrusion_active);
        assert_eq!(snap.attempts.consecutive_denials, 0);
        assert_eq!(sink.count(|c| *c == SinkCall::ShowIntrusion), 1);
        assert_eq!(sink.count(|c| *c == SinkCall::HideIntrusion), 0);

        advance(6_500).await;
        assert!(!handle.snapshot().attempts.intrusion_active);
        assert_eq!(sink.count(|c| *c == SinkCall::HideIntrusion), 1);

        let report = handle.shutdown().await.unwrap();
        assert_eq!(report.intrusions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_keeps_streak_and_next_tick_captures() {
        let sink = Arc::new(RecordingSink::default());
        let validation = ValidationLoop::new(config(), sink).unwrap();
        let camera = SimCamera::new("cam");
        let probe = camera.probe();
        let verifier = Arc::new(ScriptedVerifier::new(
            Duration::ZERO,
            [
                no_permission(),
                VerificationOutcome::TransportError {
                    detail: "timed out".into(),
                },
            ],
        ));
        let handle = ValidationSession::start(validation, camera, verifier.clone()).unwrap();

        advance(7_000).await;
        assert_eq!(handle.snapshot().attempts.consecutive_denials, 1);

        advance(2_500).await;
        assert_eq!(probe.captures(), 3);
        assert_eq!(verifier.calls(), 3);

        let report = handle.shutdown().await.unwrap();
        assert_eq!(report.transport_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_while_awaiting_verifier() {
        let sink = Arc::new(RecordingSink::default());
        let validation = ValidationLoop::new(config(), sink.clone()).unwrap();
        let camera = SimCamera::new("cam");
        let probe = camera.probe();
        let verifier = Arc::new(ScriptedVerifier::new(Duration::from_secs(5), [granted()]));
        let handle = ValidationSession::start(validation, camera, verifier.clone()).unwrap();

        advance(4_000).await;
        assert_eq!(handle.snapshot().phase, LoopPhase::AwaitingVerifier);

        let report = handle.shutdown().await.unwrap();
        assert!(!probe.is_open());
        assert_eq!(probe.closes(), 1);
        assert_eq!(report.rounds, 1);
        assert_eq!(report.grants, 0);

        // Past the point where the verification would have resolved.
        advance(10_000).await;
        assert!(sink.calls().is_empty());
        assert_eq!(verifier.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_pending_intrusion_dismissal() {
        let sink = Arc::new(RecordingSink::default());
        let validation = ValidationLoop::new(config(), sink.clone()).unwrap();
        let camera = SimCamera::new("cam");
        let probe = camera.probe();
        let verifier = Arc::new(ScriptedVerifier::new(
            Duration::ZERO,
            [no_permission(), no_permission(), no_permission()],
        ));
        let handle = ValidationSession::start(validation, camera, verifier).unwrap();

        // Alert raised at 9 s, dismissal due at 16 s.
        advance(10_000).await;
        assert_eq!(sink.count(|c| *c == SinkCall::ShowIntrusion), 1);
        let report = handle.shutdown().await.unwrap();
        assert_eq!(report.intrusions, 1);
        let calls_at_teardown = sink.calls().len();

        advance(10_000).await;
        assert_eq!(sink.count(|c| *c == SinkCall::HideIntrusion), 0);
        assert_eq!(sink.calls().len(), calls_at_teardown);
        assert_eq!(probe.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_pending_cooldown() {
        let sink = Arc::new(RecordingSink::default());
        let validation = ValidationLoop::new(config(), sink.clone()).unwrap();
        let camera = SimCamera::new("cam");
        let probe = camera.probe();
        let verifier = Arc::new(ScriptedVerifier::new(Duration::ZERO, [granted()]));
        let handle = ValidationSession::start(validation, camera, verifier).unwrap();

        // Granted at 3 s; cooldown would end at 13 s.
        advance(5_000).await;
        assert_eq!(handle.snapshot().phase, LoopPhase::CooldownAfterGrant);
        let report = handle.shutdown().await.unwrap();
        assert_eq!(report.grants, 1);
        let captures_at_teardown = probe.captures();
        let calls_at_teardown = sink.calls().len();

        advance(20_000).await;
        assert_eq!(probe.captures(), captures_at_teardown);
        assert_eq!(sink.calls().len(), calls_at_teardown);
        assert!(!probe.is_open());
        assert_eq!(probe.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_releases_the_camera() {
        let validation = ValidationLoop::new(config(), Arc::new(RecordingSink::default())).unwrap();
        let camera = SimCamera::new("cam");
        let probe = camera.probe();
        let verifier = Arc::new(ScriptedVerifier::new(Duration::ZERO, []));
        let handle = ValidationSession::start(validation, camera, verifier).unwrap();
        assert!(probe.is_open());

        drop(handle);
        advance(10).await;
        assert!(!probe.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_phase_changes() {
        let validation = ValidationLoop::new(config(), Arc::new(RecordingSink::default())).unwrap();
        let verifier = Arc::new(ScriptedVerifier::new(Duration::from_secs(1), []));
        let handle = ValidationSession::start(validation, SimCamera::new("cam"), verifier).unwrap();
        let mut rx = handle.subscribe();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().phase, LoopPhase::AwaitingVerifier);
        assert!(!handle.is_finished());

        handle.shutdown().await.unwrap();
    }
}
