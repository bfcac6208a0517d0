//! Frozen-frame preparation.
//! Draws the grabbed frame either at native resolution or letterboxed into a
//! display wrapper, then encodes it as JPEG for upload.

use base64::{Engine as _, engine::general_purpose};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageResult, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum FrameMode {
    /// Keep the video's own resolution.
    #[default]
    Native,
    /// Fit the video inside a wrapper of this size, centered, padded with black.
    Fit { width: u32, height: u32 },
}

/// Where the scaled video lands on the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub fn fit_placement(video: (u32, u32), canvas: (u32, u32)) -> Placement {
    let (vw, vh) = (video.0 as f64, video.1 as f64);
    let (cw, ch) = (canvas.0 as f64, canvas.1 as f64);
    let video_ratio = vw / vh;
    let canvas_ratio = cw / ch;

    let (width, height) = if video_ratio < canvas_ratio {
        (ch * video_ratio, ch)
    } else if video_ratio > canvas_ratio {
        (cw, cw / video_ratio)
    } else {
        (cw, ch)
    };

    let width = (width.round() as u32).clamp(1, canvas.0);
    let height = (height.round() as u32).clamp(1, canvas.1);
    Placement {
        x: (canvas.0 - width) / 2,
        y: (canvas.1 - height) / 2,
        width,
        height,
    }
}

pub fn render_frame(frame: &DynamicImage, mode: FrameMode) -> RgbImage {
    match mode {
        FrameMode::Native => frame.to_rgb8(),
        FrameMode::Fit { width, height } => {
            let width = width.max(1);
            let height = height.max(1);
            let placement = fit_placement(frame.dimensions(), (width, height));
            let scaled = imageops::resize(
                &frame.to_rgb8(),
                placement.width,
                placement.height,
                FilterType::Triangle,
            );
            let mut canvas = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
            imageops::overlay(&mut canvas, &scaled, placement.x as i64, placement.y as i64);
            canvas
        }
    }
}

/// The still shown in place of the live stream while the upload runs.
#[derive(Clone, Debug)]
pub struct FrozenFrame {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

impl FrozenFrame {
    pub fn encode(frame: &DynamicImage, mode: FrameMode, quality: u8) -> ImageResult<Self> {
        let canvas = render_frame(frame, mode);
        let (width, height) = canvas.dimensions();
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(canvas)
            .write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)))?;

        if env::var_os("DEBUG_CAPTURE").is_some() {
            if let Err(e) = fs::create_dir_all("screenshots")
                .and_then(|_| fs::write("screenshots/capture.jpg", &jpeg))
            {
                tracing::warn!("failed to save debug capture to screenshots/: {}", e);
            }
        }

        Ok(FrozenFrame { width, height, jpeg })
    }

    pub fn size_kb(&self) -> usize {
        (self.jpeg.len() + 512) / 1024
    }

    pub fn data_url(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            general_purpose::STANDARD.encode(&self.jpeg)
        )
    }
}
