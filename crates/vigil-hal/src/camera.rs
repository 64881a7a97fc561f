//! Generic `FrameSource` trait and the scoped camera guard.

use tracing::{debug, warn};
use vigil_types::{Frame, VigilError};

/// A camera or image-capture device owned by one validation session.
///
/// Every successful [`open`][FrameSource::open] must be paired with a
/// [`close`][FrameSource::close]; wrap sources in a [`CameraGuard`] to get
/// that pairing on every exit path.
pub trait FrameSource: Send {
    /// Stable identifier for this camera, e.g. `"entrance_cam"`.
    fn id(&self) -> &str;

    /// Acquire the camera.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::DeviceUnavailable`] when no device exists or
    /// permission to use it is missing.
    fn open(&mut self) -> Result<(), VigilError>;

    /// Encode the current stream state into a [`Frame`].
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::CaptureFailed`] when the stream has not produced
    /// a displayable image yet, or [`VigilError::DeviceUnavailable`] when the
    /// camera is not open.
    fn capture_frame(&mut self) -> Result<Frame, VigilError>;

    /// Release the camera. Closing an already closed source is a no-op.
    fn close(&mut self) -> Result<(), VigilError>;

    fn is_open(&self) -> bool;
}

/// RAII owner of an opened [`FrameSource`].
///
/// The camera is closed by [`CameraGuard::release`] or, failing that, when
/// the guard is dropped.
pub struct CameraGuard {
    source: Option<Box<dyn FrameSource>>,
}

impl CameraGuard {
    /// Open `source` and take exclusive ownership of it.
    ///
    /// # Errors
    ///
    /// Propagates the error from [`FrameSource::open`]; nothing is held on
    /// failure.
    pub fn acquire(mut source: Box<dyn FrameSource>) -> Result<Self, VigilError> {
        source.open()?;
        debug!(camera = source.id(), "camera acquired");
        Ok(Self {
            source: Some(source),
        })
    }

    /// Identifier of the guarded camera, or `""` once released.
    pub fn id(&self) -> &str {
        self.source.as_deref().map(|s| s.id()).unwrap_or("")
    }

    /// Capture one frame from the guarded camera.
    pub fn capture_frame(&mut self) -> Result<Frame, VigilError> {
        match self.source.as_mut() {
            Some(source) => source.capture_frame(),
            None => Err(VigilError::DeviceUnavailable(
                "camera already released".to_string(),
            )),
        }
    }

    /// Close the camera now and surface any error from the driver.
    pub fn release(mut self) -> Result<(), VigilError> {
        match self.source.take() {
            Some(mut source) => {
                debug!(camera = source.id(), "camera released");
                source.close()
            }
            None => Ok(()),
        }
    }
}

impl Drop for CameraGuard {
    fn drop(&mut self) {
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.close() {
                warn!(camera = source.id(), error = %e, "camera close failed during drop");
            }
        }
    }
}
