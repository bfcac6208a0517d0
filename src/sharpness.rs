//! Sharpness score for the auto-capture gate.
//! Variance of the 3x3 Laplacian over the grayscale frame; higher means more edges in focus.
//! Heuristic only: a misjudged frame just means an early or late capture.

use image::DynamicImage;
use imageproc::filter::laplacian_filter;

pub const DEFAULT_THRESHOLD: f64 = 100.0;

pub fn sharpness_score(frame: &DynamicImage) -> f64 {
    let gray = frame.to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        return 0.0;
    }
    let response = laplacian_filter(&gray);

    let n = (response.width() as f64) * (response.height() as f64);
    let mean = response.pixels().map(|p| p.0[0] as f64).sum::<f64>() / n;
    response
        .pixels()
        .map(|p| {
            let d = p.0[0] as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n
}

pub fn is_in_focus(score: f64, threshold: f64) -> bool {
    score > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn checkerboard(size: u32, block: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(size, size, |x, y| {
            if ((x / block) + (y / block)) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        }))
    }

    #[test]
    fn test_flat_frame_scores_zero() {
        let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 48, Luma([128])));
        assert_eq!(sharpness_score(&flat), 0.0);
        assert!(!is_in_focus(0.0, DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_crisp_edges_pass_threshold() {
        let score = sharpness_score(&checkerboard(64, 8));
        assert!(is_in_focus(score, DEFAULT_THRESHOLD), "score {} should exceed threshold", score);
    }

    #[test]
    fn test_blur_lowers_score() {
        let sharp = checkerboard(64, 8);
        let blurred = sharp.blur(6.0);
        let (s, b) = (sharpness_score(&sharp), sharpness_score(&blurred));
        assert!(b < s, "blurred {} should score below sharp {}", b, s);
    }

    #[test]
    fn test_empty_frame() {
        let empty = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        assert_eq!(sharpness_score(&empty), 0.0);
    }
}
