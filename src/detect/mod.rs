//! Seams for the face detector and object tracker models

use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::display::NormalizedImage;

pub mod tracker;

pub use tracker::DepthBandTracker;

/// Single-channel foreground mask, non-zero where an object was tracked.
pub type Mask = GrayImage;

/// Background fill for the composited output (RGB 0, 177, 64).
pub const GREEN_SCREEN: [u8; 3] = [0, 177, 64];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: i32,
    pub y: i32,
}

impl Point2 {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Finds face centres in a colour image.
pub trait FaceDetector {
    fn detect(&mut self, image: &NormalizedImage) -> Vec<Point2>;
}

/// Segments tracked objects out of a depth image, seeded by face centres.
pub trait ObjectTracker {
    fn track(&mut self, depth: &NormalizedImage, faces: &[Point2]) -> Mask;
}

/// Detector used when no model is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaceDetector;

impl FaceDetector for NoFaceDetector {
    fn detect(&mut self, _image: &NormalizedImage) -> Vec<Point2> {
        Vec::new()
    }
}

impl<F: FaceDetector + ?Sized> FaceDetector for Box<F> {
    fn detect(&mut self, image: &NormalizedImage) -> Vec<Point2> {
        (**self).detect(image)
    }
}

impl<T: ObjectTracker + ?Sized> ObjectTracker for Box<T> {
    fn track(&mut self, depth: &NormalizedImage, faces: &[Point2]) -> Mask {
        (**self).track(depth, faces)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("mask is {mask_width}x{mask_height} but colour image is {width}x{height}")]
pub struct MaskMismatch {
    pub width: u32,
    pub height: u32,
    pub mask_width: u32,
    pub mask_height: u32,
}

/// Copy `color` onto a solid `fill` background wherever `mask` is set.
pub fn green_screen(
    color: &NormalizedImage,
    mask: &Mask,
    fill: [u8; 3],
) -> Result<NormalizedImage, MaskMismatch> {
    let (width, height) = color.dimensions();
    if mask.dimensions() != (width, height) {
        return Err(MaskMismatch {
            width,
            height,
            mask_width: mask.width(),
            mask_height: mask.height(),
        });
    }

    let mut out = NormalizedImage::filled(width, height, fill);
    for (x, y, m) in mask.enumerate_pixels() {
        if m.0[0] != 0 {
            out.put_pixel(x, y, color.pixel(x, y));
        }
    }
    Ok(out)
}

const MARKER_ARM: i32 = 4;
const MARKER_COLOR: [u8; 3] = [0, 255, 0];

/// Draw a small cross on each point, clipped to the image.
pub fn mark_points(image: &mut NormalizedImage, points: &[Point2]) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    for p in points {
        for d in -MARKER_ARM..=MARKER_ARM {
            for (x, y) in [(p.x + d, p.y), (p.x, p.y + d)] {
                if (0..width).contains(&x) && (0..height).contains(&y) {
                    image.put_pixel(x as u32, y as u32, MARKER_COLOR);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn green_screen_keeps_only_masked_pixels() {
        let color = NormalizedImage::filled(3, 2, [9, 8, 7]);
        let mut mask = Mask::new(3, 2);
        mask.put_pixel(1, 0, Luma([255]));
        mask.put_pixel(2, 1, Luma([1]));

        let out = green_screen(&color, &mask, GREEN_SCREEN).unwrap();
        assert_eq!(out.pixel(0, 0), GREEN_SCREEN);
        assert_eq!(out.pixel(1, 0), [9, 8, 7]);
        assert_eq!(out.pixel(2, 1), [9, 8, 7]);
        assert_eq!(out.pixel(0, 1), GREEN_SCREEN);
    }

    #[test]
    fn green_screen_rejects_mismatched_mask() {
        let color = NormalizedImage::filled(3, 2, [0; 3]);
        let mask = Mask::new(2, 2);
        assert_eq!(
            green_screen(&color, &mask, GREEN_SCREEN),
            Err(MaskMismatch { width: 3, height: 2, mask_width: 2, mask_height: 2 })
        );
    }

    #[test]
    fn markers_are_clipped_at_the_border() {
        let mut img = NormalizedImage::black(10, 10);
        mark_points(&mut img, &[Point2::new(0, 0), Point2::new(20, 20)]);
        assert_eq!(img.pixel(0, 0), MARKER_COLOR);
        assert_eq!(img.pixel(4, 0), MARKER_COLOR);
        assert_eq!(img.pixel(0, 4), MARKER_COLOR);
        assert_eq!(img.pixel(5, 0), [0; 3]);
        assert_eq!(img.pixel(9, 9), [0; 3]);
    }
}
