//! [`DirectoryCamera`] – a [`FrameSource`] that replays encoded images.
//!
//! On [`open`][FrameSource::open] the directory is scanned for `.jpg`,
//! `.jpeg` and `.png` files (sorted by name). Each capture returns the next
//! file, wrapping around at the end, so a directory that an external grabber
//! keeps overwriting behaves like a live stream.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use vigil_types::{Frame, VigilError};

use crate::camera::FrameSource;

pub struct DirectoryCamera {
    id: String,
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    open: bool,
}

impl DirectoryCamera {
    pub fn new(id: impl Into<String>, dir: impl Into<PathBuf>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            dir: dir.into(),
            files: Vec::new(),
            cursor: 0,
            open: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn content_type(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            _ => None,
        }
    }
}

impl FrameSource for DirectoryCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn open(&mut self) -> Result<(), VigilError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            VigilError::DeviceUnavailable(format!("cannot read {}: {e}", self.dir.display()))
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && Self::content_type(p).is_some())
            .collect();
        if files.is_empty() {
            return Err(VigilError::DeviceUnavailable(format!(
                "no images found in {}",
                self.dir.display()
            )));
        }
        files.sort();
        debug!(camera = %self.id, frames = files.len(), "directory camera opened");
        self.files = files;
        self.cursor = 0;
        self.open = true;
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<Frame, VigilError> {
        if !self.open {
            return Err(VigilError::DeviceUnavailable(format!(
                "camera '{}' is not open",
                self.id
            )));
        }
        let path = self.files[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.files.len();

        let content_type = Self::content_type(&path).unwrap_or("application/octet-stream");
        let data = fs::read(&path).map_err(|e| {
            VigilError::CaptureFailed(format!("cannot read {}: {e}", path.display()))
        })?;
        if data.is_empty() {
            return Err(VigilError::CaptureFailed(format!(
                "{} has no image data yet",
                path.display()
            )));
        }
        Ok(Frame::new(data, content_type))
    }

    fn close(&mut self) -> Result<(), VigilError> {
        self.files.clear();
        self.cursor = 0;
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
