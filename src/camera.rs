//! Camera module.
//! A `Camera` opens a `CameraStream`; the stream hands out frames until stopped.
//! Two sources: the primary display via `xcap` (optionally cropped to a region),
//! and still images on disk played back in order.
//! Acquisition failures are classified so each gets its own user-facing message.

use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error};
use xcap::Monitor;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),

    #[error("no suitable camera: {0}")]
    NotFound(String),

    #[error("camera error: {0}")]
    Other(String),

    #[error("camera stream already stopped")]
    Stopped,
}

impl CameraError {
    pub fn user_message(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied(_) => {
                "Vous avez refusé l'accès à la caméra. Veuillez autoriser l'accès dans les paramètres de votre système."
            }
            CameraError::NotFound(_) => "Aucune caméra compatible n'a été trouvée sur cet appareil.",
            CameraError::Other(_) | CameraError::Stopped => "Impossible d'accéder à la caméra.",
        }
    }

    fn from_io(err: io::Error, what: &str) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => CameraError::PermissionDenied(format!("{}: {}", what, err)),
            io::ErrorKind::NotFound => CameraError::NotFound(format!("{}: {}", what, err)),
            _ => CameraError::Other(format!("{}: {}", what, err)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    #[default]
    Environment,
}

/// Preferred stream configuration. "Ideal" values: frames are center-cropped
/// to the ideal aspect ratio, then scaled down into the ideal bounds if larger.
/// A non-positive aspect ratio disables the crop. A source facing the other way
/// is still used.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub ideal_aspect_ratio: f64,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        CameraConstraints {
            facing_mode: FacingMode::Environment,
            ideal_width: 1920,
            ideal_height: 1080,
            // ID-1 card format
            ideal_aspect_ratio: 1.586,
        }
    }
}

impl CameraConstraints {
    pub fn conform(&self, frame: DynamicImage) -> DynamicImage {
        let frame = self.crop_to_aspect(frame);
        let (w, h) = frame.dimensions();
        if w <= self.ideal_width && h <= self.ideal_height {
            return frame;
        }
        frame.resize(
            self.ideal_width,
            self.ideal_height,
            image::imageops::FilterType::Triangle,
        )
    }

    fn crop_to_aspect(&self, frame: DynamicImage) -> DynamicImage {
        let ratio = self.ideal_aspect_ratio;
        let (w, h) = frame.dimensions();
        if !(ratio.is_finite() && ratio > 0.0) || w == 0 || h == 0 {
            return frame;
        }

        let target_w = ((h as f64 * ratio).round() as u32).max(1);
        if target_w < w {
            return frame.crop_imm((w - target_w) / 2, 0, target_w, h);
        }
        let target_h = ((w as f64 / ratio).round() as u32).max(1);
        if target_h < h {
            return frame.crop_imm(0, (h - target_h) / 2, w, target_h);
        }
        frame
    }
}

/// Crop rectangle on the captured display, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub trait CameraStream {
    fn grab_frame(&mut self) -> Result<DynamicImage, CameraError>;

    /// Releases the underlying device. Further grabs fail with `Stopped`.
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

pub trait Camera {
    fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn CameraStream>, CameraError>;

    /// Which way the source looks. Screens and image files show the document, not the user.
    fn facing(&self) -> FacingMode {
        FacingMode::Environment
    }
}

// *************** Screen source ***************

/// Uses the primary display as the video source.
/// On macOS, grant "Screen & System Audio Recording" to the terminal in System Settings > Privacy & Security.
pub struct ScreenCamera {
    pub region: Option<Region>,
}

struct ScreenStream {
    monitor: Monitor,
    region: Option<Region>,
    constraints: CameraConstraints,
    active: bool,
}

impl Camera for ScreenCamera {
    fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn CameraStream>, CameraError> {
        let monitors = Monitor::all()
            .map_err(|e| CameraError::Other(format!("failed to enumerate monitors: {}", e)))?;
        let monitor = monitors
            .into_iter()
            .next()
            .ok_or_else(|| CameraError::NotFound("no monitors found".to_string()))?;

        if let Some(region) = self.region {
            if region.width < 64 || region.height < 64 {
                return Err(CameraError::Other(format!(
                    "capture region too small ({}x{}, min 64x64)",
                    region.width, region.height
                )));
            }
        }

        debug!(region = ?self.region, "screen camera opened");
        Ok(Box::new(ScreenStream {
            monitor,
            region: self.region,
            constraints: constraints.clone(),
            active: true,
        }))
    }
}

impl CameraStream for ScreenStream {
    fn grab_frame(&mut self) -> Result<DynamicImage, CameraError> {
        if !self.active {
            return Err(CameraError::Stopped);
        }
        let raw = self
            .monitor
            .capture_image()
            .map_err(|e| CameraError::Other(format!("failed to capture display: {}", e)))?;
        let screenshot = DynamicImage::ImageRgba8(raw);
        if screenshot.dimensions() == (0, 0) {
            return Err(CameraError::PermissionDenied(
                "captured an empty screenshot".to_string(),
            ));
        }

        let frame = match self.region {
            None => screenshot,
            Some(r) => {
                let (screen_w, screen_h) = screenshot.dimensions();
                if r.x.saturating_add(r.width) > screen_w || r.y.saturating_add(r.height) > screen_h {
                    return Err(CameraError::Other(format!(
                        "capture region ({},{},{},{}) exceeds display {}x{}",
                        r.x, r.y, r.width, r.height, screen_w, screen_h
                    )));
                }
                screenshot.crop_imm(r.x, r.y, r.width, r.height)
            }
        };
        Ok(self.constraints.conform(frame))
    }

    fn stop(&mut self) {
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

// *************** File source ***************

/// Plays back still images in order; the last one repeats.
pub struct FileCamera {
    pub frames: Vec<PathBuf>,
}

struct FileStream {
    frames: Vec<DynamicImage>,
    cursor: usize,
    active: bool,
}

impl Camera for FileCamera {
    fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn CameraStream>, CameraError> {
        if self.frames.is_empty() {
            return Err(CameraError::NotFound("no frame files given".to_string()));
        }
        let frames = self
            .frames
            .iter()
            .map(|path| {
                let bytes = std::fs::read(path)
                    .map_err(|e| CameraError::from_io(e, &path.display().to_string()))?;
                image::load_from_memory(&bytes)
                    .map(|img| constraints.conform(img))
                    .map_err(|e| {
                        error!(path = %path.display(), "unreadable frame: {}", e);
                        CameraError::Other(format!("{}: {}", path.display(), e))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Box::new(FileStream {
            frames,
            cursor: 0,
            active: true,
        }))
    }
}

impl CameraStream for FileStream {
    fn grab_frame(&mut self) -> Result<DynamicImage, CameraError> {
        if !self.active {
            return Err(CameraError::Stopped);
        }
        let frame = self.frames[self.cursor.min(self.frames.len() - 1)].clone();
        self.cursor += 1;
        Ok(frame)
    }

    fn stop(&mut self) {
        self.active = false;
        self.frames.clear();
        self.frames.shrink_to_fit();
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
