use image::Luma;

use super::{Mask, ObjectTracker, Point2};
use crate::display::NormalizedImage;

/// Marks every depth pixel whose display value lies in `[near, far]`.
///
/// Zero is "no reading" and never part of the mask. When faces are given,
/// only the band around the nearest face's depth is kept.
#[derive(Debug, Clone, Copy)]
pub struct DepthBandTracker {
    near: u8,
    far: u8,
    face_margin: u8,
}

impl DepthBandTracker {
    pub fn new(near: u8, far: u8) -> Self {
        Self {
            near: near.min(far),
            far: near.max(far),
            face_margin: 24,
        }
    }

    pub fn with_face_margin(mut self, margin: u8) -> Self {
        self.face_margin = margin;
        self
    }

    fn band_for(&self, depth: &NormalizedImage, faces: &[Point2]) -> (u8, u8) {
        let face_depth = faces
            .iter()
            .filter(|p| p.x >= 0 && p.y >= 0)
            .filter(|p| (p.x as u32) < depth.width() && (p.y as u32) < depth.height())
            .map(|p| depth.pixel(p.x as u32, p.y as u32)[0])
            .filter(|&v| v != 0)
            .min();

        match face_depth {
            Some(v) => (
                v.saturating_sub(self.face_margin).max(self.near),
                v.saturating_add(self.face_margin).min(self.far),
            ),
            None => (self.near, self.far),
        }
    }
}

impl ObjectTracker for DepthBandTracker {
    fn track(&mut self, depth: &NormalizedImage, faces: &[Point2]) -> Mask {
        let (lo, hi) = self.band_for(depth, faces);
        let mut mask = Mask::new(depth.width(), depth.height());
        for (dst, src) in mask.pixels_mut().zip(depth.as_rgb().pixels()) {
            let v = src.0[0];
            if v != 0 && (lo..=hi).contains(&v) {
                *dst = Luma([255]);
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth_row(values: &[u8]) -> NormalizedImage {
        let mut img = NormalizedImage::black(values.len() as u32, 1);
        for (x, &v) in values.iter().enumerate() {
            img.put_pixel(x as u32, 0, [v, v, v]);
        }
        img
    }

    #[test]
    fn band_selects_foreground_and_skips_holes() {
        let depth = depth_row(&[0, 30, 60, 90, 200]);
        let mask = DepthBandTracker::new(20, 100).track(&depth, &[]);
        let set: Vec<bool> = mask.pixels().map(|p| p.0[0] != 0).collect();
        assert_eq!(set, [false, true, true, true, false]);
    }

    #[test]
    fn face_narrows_band_around_its_depth() {
        let depth = depth_row(&[30, 60, 62, 90, 200]);
        let mut tracker = DepthBandTracker::new(20, 250).with_face_margin(5);
        let mask = tracker.track(&depth, &[Point2::new(1, 0), Point2::new(-3, 9)]);
        let set: Vec<bool> = mask.pixels().map(|p| p.0[0] != 0).collect();
        assert_eq!(set, [false, true, true, false, false]);
    }
}
