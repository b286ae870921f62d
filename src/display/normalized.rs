//! Display-ready 3-channel 8-bit image

use image::{GrayImage, Rgb, RgbImage};

/// Decoded frame in RGB order, always three channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pixels: RgbImage,
}

impl NormalizedImage {
    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// Promote a single-channel image to three identical channels.
    pub fn from_gray(gray: &GrayImage) -> Self {
        let mut pixels = RgbImage::new(gray.width(), gray.height());
        for (dst, src) in pixels.pixels_mut().zip(gray.pixels()) {
            let v = src.0[0];
            *dst = Rgb([v, v, v]);
        }
        Self { pixels }
    }

    /// Build from an RGB byte buffer; `None` when the length does not match.
    pub fn from_raw(width: u32, height: u32, rgb: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, rgb).map(Self::from_rgb)
    }

    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self {
            pixels: RgbImage::from_pixel(width, height, Rgb(color)),
        }
    }

    pub fn black(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.pixels.get_pixel(x, y).0
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        self.pixels.put_pixel(x, y, Rgb(rgb));
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn as_rgb_mut(&mut self) -> &mut RgbImage {
        &mut self.pixels
    }

    pub fn into_rgb(self) -> RgbImage {
        self.pixels
    }

    /// Tightly packed RGB bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn gray_promotion_copies_value_into_every_channel() {
        let mut gray = GrayImage::new(2, 1);
        gray.put_pixel(0, 0, Luma([7]));
        gray.put_pixel(1, 0, Luma([200]));

        let img = NormalizedImage::from_gray(&gray);
        assert_eq!(img.dimensions(), (2, 1));
        assert_eq!(img.pixel(0, 0), [7, 7, 7]);
        assert_eq!(img.pixel(1, 0), [200, 200, 200]);
    }

    #[test]
    fn from_raw_rejects_short_buffers() {
        assert!(NormalizedImage::from_raw(2, 2, vec![0; 11]).is_none());
        assert!(NormalizedImage::from_raw(2, 2, vec![0; 12]).is_some());
    }
}
