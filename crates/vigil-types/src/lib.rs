use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One captured, encoded image ready for submission to the verifier.
///
/// A frame is immutable once produced and is moved (never cloned) into the
/// verification round that consumes it.
#[derive(Debug)]
pub struct Frame {
    id: Uuid,
    captured_at: DateTime<Utc>,
    content_type: String,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap an encoded image buffer, stamping it with the current UTC time.
    pub fn new(data: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            captured_at: Utc::now(),
            content_type: content_type.into(),
            data,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// MIME type of the encoded buffer, e.g. `"image/jpeg"`.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the frame and hand back the encoded buffer.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Face bounding box in frame pixel coordinates (top-left / bottom-right corners).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Build a box from exactly four numbers `[x1, y1, x2, y2]`.
    ///
    /// Returns `None` for any other length or for non-finite values.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [x1, y1, x2, y2] if values.iter().all(|v| v.is_finite()) => Some(Self {
                x1: *x1 as f32,
                y1: *y1 as f32,
                x2: *x2 as f32,
                y2: *y2 as f32,
            }),
            _ => None,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).abs()
    }
}

/// Classified result of one verification round-trip.
///
/// Exactly one case is active; only [`VerificationOutcome::Granted`] can
/// carry a bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Granted {
        subject_name: String,
        role: String,
        zone_name: String,
        bounding_box: Option<BoundingBox>,
    },
    Denied {
        zone_name: String,
        reason: String,
    },
    /// Ambiguous or low-confidence capture. Never counted as a denial.
    Retry { reason: String },
    /// Network or server failure. Never counted as a denial.
    TransportError { detail: String },
}

impl VerificationOutcome {
    /// Short label used in logs and journal notes.
    pub fn label(&self) -> &'static str {
        match self {
            VerificationOutcome::Granted { .. } => "granted",
            VerificationOutcome::Denied { .. } => "denied",
            VerificationOutcome::Retry { .. } => "retry",
            VerificationOutcome::TransportError { .. } => "transport_error",
        }
    }
}

/// Case-insensitive substrings that mark a denial reason as
/// "no permission for this zone".
///
/// Only denials matching one of these markers feed the intrusion streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct DenialMarkers(Vec<String>);

impl From<Vec<String>> for DenialMarkers {
    fn from(markers: Vec<String>) -> Self {
        Self::new(markers)
    }
}

impl From<DenialMarkers> for Vec<String> {
    fn from(markers: DenialMarkers) -> Self {
        markers.0
    }
}

impl DenialMarkers {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            markers
                .into_iter()
                .map(|m| m.into().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        )
    }

    /// `true` if `reason` contains any marker (ignoring case).
    pub fn matches(&self, reason: &str) -> bool {
        let reason = reason.to_lowercase();
        self.0.iter().any(|m| reason.contains(m.as_str()))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for DenialMarkers {
    fn default() -> Self {
        Self::new(["sin permiso", "no permission"])
    }
}

/// Consecutive-denial streak and intrusion flag for one validation session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptState {
    pub consecutive_denials: u32,
    pub intrusion_active: bool,
}

/// The validation loop's current phase. Anything other than `Idle` means a
/// round is outstanding and incoming ticks are dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopPhase {
    #[default]
    Idle,
    Capturing,
    AwaitingVerifier,
    CooldownAfterGrant,
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopPhase::Idle => write!(f, "idle"),
            LoopPhase::Capturing => write!(f, "capturing"),
            LoopPhase::AwaitingVerifier => write!(f, "awaiting_verifier"),
            LoopPhase::CooldownAfterGrant => write!(f, "cooldown_after_grant"),
        }
    }
}

/// Colour state of the feedback banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerState {
    Granted,
    Denied,
    Retry,
}

/// Toast category emitted alongside a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Failure,
    Retry,
}

/// Payload of a user-facing notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub subject: Option<String>,
    pub role: Option<String>,
    pub zone: Option<String>,
    pub reason: Option<String>,
}

impl Notice {
    pub fn granted(
        subject: impl Into<String>,
        role: impl Into<String>,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            subject: Some(subject.into()),
            role: Some(role.into()),
            zone: Some(zone.into()),
            reason: None,
        }
    }

    pub fn denied(zone: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            subject: None,
            role: None,
            zone: Some(zone.into()),
            reason: Some(reason.into()),
        }
    }

    pub fn retry(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// One-line rendering, e.g. `"Ana Ruiz (Guard) @ 4"`.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        if let Some(subject) = &self.subject {
            out.push_str(subject);
        }
        if let Some(role) = self.role.as_deref().filter(|r| !r.is_empty()) {
            out.push_str(&format!(" ({role})"));
        }
        if let Some(zone) = self.zone.as_deref().filter(|z| !z.is_empty()) {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&format!("@ {zone}"));
        }
        if let Some(reason) = self.reason.as_deref().filter(|r| !r.is_empty()) {
            if !out.is_empty() {
                out.push_str(": ");
            }
            out.push_str(reason);
        }
        out
    }
}

/// Global error type spanning camera, transport, hardware and storage failures.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VigilError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Journal error: {0}")]
    Journal(String),

    #[error("Session error: {0}")]
    Session(String),
}
