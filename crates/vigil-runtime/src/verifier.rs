//! [`VerifierClient`] – one-shot client for the remote biometric verifier.
//!
//! Each call uploads one [`Frame`] as a multipart form to
//! `{base_url}/validar/` and classifies the reply into a
//! [`VerificationOutcome`]. There are no internal retries; the validation
//! loop decides when to try again.
//!
//! # Response contract
//!
//! | Field | Meaning |
//! |---|---|
//! | `estado` | `ACCESO_CONCEDIDO`, `ACCESO_DENEGADO` or `INTENTE_NUEVAMENTE` |
//! | `nombre`, `puesto`, `departamento` | subject, role and zone on a grant |
//! | `bbox` | optional `[x1, y1, x2, y2]`, grants only |
//! | `motivo` | denial / retry reason |
//!
//! Anything outside that contract (non-2xx status, missing `estado`, a
//! malformed body, a timeout, a refused connection) becomes
//! [`VerificationOutcome::TransportError`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use vigil_runtime::verifier::{VerifierClient, VerifierConfig};
//!
//! let config = VerifierConfig::new("http://localhost:8000", "192.168.0.40", "4", Duration::from_secs(8));
//! let client = VerifierClient::new(config).expect("failed to build HTTP client");
//! // client.verify(frame).await drives one round-trip.
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use vigil_types::{BoundingBox, Frame, VerificationOutcome, VigilError};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Reasons a round-trip could not be classified. All of them surface to the
/// loop as [`VerificationOutcome::TransportError`].
#[derive(Error, Debug)]
pub enum VerifierError {
    /// The HTTP request failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The verifier answered with a non-2xx status.
    #[error("verifier returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    /// The body does not follow the response contract.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
    /// The client settings cannot produce a usable connection.
    #[error("invalid verifier config: {0}")]
    InvalidConfig(String),
}

impl From<VerifierError> for VigilError {
    fn from(e: VerifierError) -> Self {
        match e {
            VerifierError::InvalidConfig(msg) => VigilError::Config(msg),
            other => VigilError::Transport(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Verifier seam
// ─────────────────────────────────────────────────────────────────────────────

/// Anything that can turn a frame into a [`VerificationOutcome`].
///
/// Implementations must never panic on remote failures; they report them as
/// [`VerificationOutcome::TransportError`].
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, frame: Frame) -> VerificationOutcome;
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Connection settings for [`VerifierClient`].
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Base URL of the verifier, e.g. `"http://localhost:8000"`.
    pub base_url: String,
    /// Address this access point is registered under on the verifier side.
    pub device_ip: String,
    /// Zone reported on denials that do not name one.
    pub zone: String,
    /// Upper bound on one round-trip. Expiry is a transport error.
    pub timeout: Duration,
}

impl VerifierConfig {
    pub fn new(
        base_url: impl Into<String>,
        device_ip: impl Into<String>,
        zone: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            device_ip: device_ip.into(),
            zone: zone.into(),
            timeout,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// VerifierClient
// ─────────────────────────────────────────────────────────────────────────────

/// Async HTTP client for the verification endpoint.
///
/// Construct once per session and reuse; the inner `reqwest::Client` pools
/// connections.
pub struct VerifierClient {
    config: VerifierConfig,
    endpoint: String,
    client: reqwest::Client,
}

impl VerifierClient {
    /// # Errors
    ///
    /// Returns [`VerifierError::InvalidConfig`] for a zero timeout and
    /// [`VerifierError::Http`] if the HTTP client cannot be built.
    pub fn new(config: VerifierConfig) -> Result<Self, VerifierError> {
        if config.timeout.is_zero() {
            return Err(VerifierError::InvalidConfig("timeout must be non-zero".into()));
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let endpoint = format!("{}/validar/", config.base_url.trim_end_matches('/'));
        Ok(Self {
            config,
            endpoint,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Upload `frame` and classify the reply.
    ///
    /// # Errors
    ///
    /// Any [`VerifierError`]; see the module docs for the mapping.
    pub async fn submit(&self, frame: Frame) -> Result<VerificationOutcome, VerifierError> {
        let content_type = frame.content_type().to_string();
        let file_name = if content_type == "image/png" {
            "captura.png"
        } else {
            "captura.jpg"
        };
        debug!(frame_id = %frame.id(), bytes = frame.len(), "submitting frame");

        let image = Part::bytes(frame.into_data())
            .file_name(file_name)
            .mime_str(&content_type)?;
        let form = Form::new()
            .part("image", image)
            .text("ip", self.config.device_ip.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        classify_response(status, &body, &self.config.zone)
    }
}

#[async_trait]
impl Verifier for VerifierClient {
    async fn verify(&self, frame: Frame) -> VerificationOutcome {
        match self.submit(frame).await {
            Ok(outcome) => outcome,
            Err(e) => VerificationOutcome::TransportError {
                detail: e.to_string(),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response classification
// ─────────────────────────────────────────────────────────────────────────────

/// Map an HTTP status and body onto a [`VerificationOutcome`].
///
/// `fallback_zone` fills in the zone for outcomes whose body omits
/// `departamento`.
///
/// # Errors
///
/// [`VerifierError::Status`] for non-2xx statuses and
/// [`VerifierError::BadResponse`] for bodies outside the contract.
pub fn classify_response(
    status: u16,
    body: &str,
    fallback_zone: &str,
) -> Result<VerificationOutcome, VerifierError> {
    if !(200..300).contains(&status) {
        return Err(VerifierError::Status {
            status,
            detail: error_detail(body),
        });
    }

    let json: Value = serde_json::from_str(body)
        .map_err(|e| VerifierError::BadResponse(format!("invalid JSON: {e}")))?;
    let Some(obj) = json.as_object() else {
        return Err(VerifierError::BadResponse("body is not a JSON object".into()));
    };
    let estado = obj
        .get("estado")
        .and_then(Value::as_str)
        .ok_or_else(|| VerifierError::BadResponse("missing `estado`".into()))?;

    let zone = || text_field(obj.get("departamento")).unwrap_or_else(|| fallback_zone.to_string());
    let reason = || text_field(obj.get("motivo")).unwrap_or_default();

    match estado {
        "ACCESO_CONCEDIDO" => {
            let subject_name = text_field(obj.get("nombre"))
                .ok_or_else(|| VerifierError::BadResponse("grant without `nombre`".into()))?;
            Ok(VerificationOutcome::Granted {
                subject_name,
                role: text_field(obj.get("puesto")).unwrap_or_default(),
                zone_name: zone(),
                bounding_box: parse_bbox(obj.get("bbox"))?,
            })
        }
        "ACCESO_DENEGADO" => Ok(VerificationOutcome::Denied {
            zone_name: zone(),
            reason: reason(),
        }),
        "INTENTE_NUEVAMENTE" => Ok(VerificationOutcome::Retry { reason: reason() }),
        other => Err(VerifierError::BadResponse(format!("unknown estado `{other}`"))),
    }
}

/// Accept strings and numbers (zone codes are numeric on some deployments).
fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_bbox(value: Option<&Value>) -> Result<Option<BoundingBox>, VerifierError> {
    let items = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(VerifierError::BadResponse(format!("`bbox` is not an array: {other}")));
        }
    };
    items
        .iter()
        .map(Value::as_f64)
        .collect::<Option<Vec<f64>>>()
        .and_then(|nums| BoundingBox::from_slice(&nums))
        .map(Some)
        .ok_or_else(|| VerifierError::BadResponse("`bbox` must hold four numbers".into()))
}

/// Pull `detail` out of an error body when there is one, else echo it.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| text_field(v.get("detail")))
        .unwrap_or_else(|| body.chars().take(200).collect())
}
