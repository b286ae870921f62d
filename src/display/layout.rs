//! Arranging decoded images onto one output canvas

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use thiserror::Error;

use super::normalized::NormalizedImage;

/// Fractional slack under which √N and N/cols count as whole numbers.
pub const GRID_EPSILON: f64 = 0.01;

pub const DEFAULT_OVERLAY_ALPHA: f32 = 0.5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("nothing to compose")]
    Empty,

    #[error("{layout} layout: image {index} has {axis} {found}, expected {expected}")]
    DimensionMismatch {
        layout: &'static str,
        axis: &'static str,
        index: usize,
        expected: u32,
        found: u32,
    },

    #[error("overlay only supports blending two images, got {0}")]
    OverlayCount(usize),

    #[error("canvas {width}x{height} cannot hold an overlay")]
    InvalidCanvas { width: u32, height: u32 },

    #[error("layout not supported: {0:?}")]
    UnknownPolicy(String),
}

/// How a [`RenderBundle`] is arranged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayoutPolicy {
    /// First image only
    Single,
    /// Left to right, shared height
    Row,
    /// Top to bottom, shared width
    Column,
    /// Near-square grid, black cells past the last image
    Grid,
    /// Two images blended at `alpha` over the whole canvas
    Overlay { alpha: f32 },
}

impl LayoutPolicy {
    /// Parse a layout tag; `overlay_alpha` applies to the overlay policy.
    pub fn from_tag(tag: &str, overlay_alpha: f32) -> Result<Self, LayoutError> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "row" => Ok(Self::Row),
            "column" => Ok(Self::Column),
            "grid" => Ok(Self::Grid),
            "overlay" => Ok(Self::Overlay {
                alpha: overlay_alpha,
            }),
            _ => Err(LayoutError::UnknownPolicy(tag.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Row => "row",
            Self::Column => "column",
            Self::Grid => "grid",
            Self::Overlay { .. } => "overlay",
        }
    }
}

impl FromStr for LayoutPolicy {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s, DEFAULT_OVERLAY_ALPHA)
    }
}

impl fmt::Display for LayoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Images for one render tick plus how to arrange them.
#[derive(Debug, Clone)]
pub struct RenderBundle {
    pub images: Vec<NormalizedImage>,
    pub policy: LayoutPolicy,
}

impl RenderBundle {
    pub fn new(images: Vec<NormalizedImage>, policy: LayoutPolicy) -> Self {
        Self { images, policy }
    }
}

/// Grid size for `count` images as `(columns, rows)`.
pub fn grid_dimensions(count: usize) -> (usize, usize) {
    if count == 0 {
        return (0, 0);
    }
    let columns = whole_within_epsilon((count as f64).sqrt());
    let rows = whole_within_epsilon(count as f64 / columns as f64);
    (columns, rows)
}

/// Round up unless the value is already within [`GRID_EPSILON`] of its floor.
fn whole_within_epsilon(value: f64) -> usize {
    let whole = value.trunc();
    if value - whole < GRID_EPSILON {
        whole as usize
    } else {
        whole as usize + 1
    }
}

/// Composes render bundles onto a canvas of fixed nominal size.
#[derive(Debug, Clone, Copy)]
pub struct LayoutComposer {
    canvas_width: u32,
    canvas_height: u32,
}

impl LayoutComposer {
    pub fn new(canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            canvas_width,
            canvas_height,
        }
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        (self.canvas_width, self.canvas_height)
    }

    pub fn compose(&self, bundle: &RenderBundle) -> Result<NormalizedImage, LayoutError> {
        let images = &bundle.images;
        if images.is_empty() {
            return Err(LayoutError::Empty);
        }

        let start = Instant::now();
        let refs: Vec<&RgbImage> = images.iter().map(NormalizedImage::as_rgb).collect();
        let canvas = match bundle.policy {
            LayoutPolicy::Single => refs[0].clone(),
            LayoutPolicy::Row => hconcat("row", &refs)?,
            LayoutPolicy::Column => vconcat("column", &refs)?,
            LayoutPolicy::Grid => self.grid(&refs)?,
            LayoutPolicy::Overlay { alpha } => self.overlay(&refs, alpha)?,
        };
        metrics::histogram!("compose_time_us").record(start.elapsed().as_micros() as f64);

        Ok(NormalizedImage::from_rgb(canvas))
    }

    fn grid(&self, images: &[&RgbImage]) -> Result<RgbImage, LayoutError> {
        let (columns, rows) = grid_dimensions(images.len());
        let placeholder = RgbImage::new(
            self.canvas_width / columns as u32,
            self.canvas_height / rows as u32,
        );

        let mut lines = Vec::with_capacity(rows);
        for row in 0..rows {
            let cells: Vec<&RgbImage> = (0..columns)
                .map(|col| images.get(row * columns + col).copied().unwrap_or(&placeholder))
                .collect();
            lines.push(hconcat("grid", &cells)?);
        }
        let lines: Vec<&RgbImage> = lines.iter().collect();
        vconcat("grid", &lines)
    }

    fn overlay(&self, images: &[&RgbImage], alpha: f32) -> Result<RgbImage, LayoutError> {
        let [base, top] = images else {
            return Err(LayoutError::OverlayCount(images.len()));
        };
        let (width, height) = self.canvas_size();
        if width == 0 || height == 0 {
            return Err(LayoutError::InvalidCanvas { width, height });
        }

        let alpha = alpha.clamp(0.0, 1.0);
        let inv_alpha = 1.0 - alpha;
        let mut out = fit(base, width, height);
        let top = fit(top, width, height);
        for (dst, src) in out.pixels_mut().zip(top.pixels()) {
            for c in 0..3 {
                dst.0[c] = (f32::from(dst.0[c]) * inv_alpha + f32::from(src.0[c]) * alpha) as u8;
            }
        }
        Ok(out)
    }
}

fn fit(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        image.clone()
    } else {
        imageops::resize(image, width, height, FilterType::Triangle)
    }
}

fn hconcat(layout: &'static str, images: &[&RgbImage]) -> Result<RgbImage, LayoutError> {
    let height = images[0].height();
    for (index, image) in images.iter().enumerate() {
        if image.height() != height {
            return Err(LayoutError::DimensionMismatch {
                layout,
                axis: "height",
                index,
                expected: height,
                found: image.height(),
            });
        }
    }

    let width = images.iter().map(|image| image.width()).sum();
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
    let mut x = 0i64;
    for image in images {
        imageops::replace(&mut canvas, *image, x, 0);
        x += i64::from(image.width());
    }
    Ok(canvas)
}

fn vconcat(layout: &'static str, images: &[&RgbImage]) -> Result<RgbImage, LayoutError> {
    let width = images[0].width();
    for (index, image) in images.iter().enumerate() {
        if image.width() != width {
            return Err(LayoutError::DimensionMismatch {
                layout,
                axis: "width",
                index,
                expected: width,
                found: image.width(),
            });
        }
    }

    let height = images.iter().map(|image| image.height()).sum();
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
    let mut y = 0i64;
    for image in images {
        imageops::replace(&mut canvas, *image, 0, y);
        y += i64::from(image.height());
    }
    Ok(canvas)
}
