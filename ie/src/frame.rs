//! Pixel buffers: captured frames, reference templates and colors.
//!
//! A [`Frame`] is either full color (RGB, no alpha) or single-channel luma.
//! Screen captures always arrive as color; the search layer converts both the
//! frame and the template to the requested [`ColorMode`] before matching, so
//! the matcher only ever sees consistent pairs.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorMode {
    Color,
    Gray,
}

impl ColorMode {
    #[inline]
    pub fn from_grayscale(grayscale: bool) -> Self {
        if grayscale { Self::Gray } else { Self::Color }
    }

    #[inline]
    pub fn channels(self) -> usize {
        match self {
            Self::Color => 3,
            Self::Gray => 1,
        }
    }
}

/// Captured (or decoded) pixel buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Color(RgbImage),
    Gray(GrayImage),
}

impl Frame {
    /// Build a color frame from RGBA bytes (alpha is discarded).
    ///
    /// The buffer is expected to be tightly packed: `width * height * 4` bytes.
    pub fn from_rgba(width: u32, height: u32, bytes: &[u8]) -> Self {
        let mut img = RgbImage::new(width, height);
        for (dst, src) in img.pixels_mut().zip(bytes.chunks_exact(4)) {
            *dst = Rgb([src[0], src[1], src[2]]);
        }
        Self::Color(img)
    }

    pub fn mode(&self) -> ColorMode {
        match self {
            Self::Color(_) => ColorMode::Color,
            Self::Gray(_) => ColorMode::Gray,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        match self {
            Self::Color(img) => img.width(),
            Self::Gray(img) => img.width(),
        }
    }

    #[inline]
    pub fn height(&self) -> u32 {
        match self {
            Self::Color(img) => img.height(),
            Self::Gray(img) => img.height(),
        }
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Interleaved channel samples, row-major, `width * height * channels` long.
    #[inline]
    pub fn samples(&self) -> &[u8] {
        match self {
            Self::Color(img) => img.as_raw(),
            Self::Gray(img) => img.as_raw(),
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        match self {
            Self::Color(img) => {
                let [r, g, b] = img.get_pixel(x, y).0;
                Color::new(r, g, b)
            }
            Self::Gray(img) => {
                let [v] = img.get_pixel(x, y).0;
                Color::new(v, v, v)
            }
        }
    }

    /// This frame in `mode`, borrowing when no conversion is needed.
    pub fn to_mode(&self, mode: ColorMode) -> Cow<'_, Frame> {
        match (self, mode) {
            (Self::Color(_), ColorMode::Color) | (Self::Gray(_), ColorMode::Gray) => {
                Cow::Borrowed(self)
            }
            (Self::Color(img), ColorMode::Gray) => Cow::Owned(Self::Gray(to_gray_image(img))),
            (Self::Gray(img), ColorMode::Color) => Cow::Owned(Self::Color(from_gray_as_rgb(img))),
        }
    }

    /// Copy out a sub-rectangle (relative coordinates, clamped to the frame).
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Frame {
        let x = x.min(self.width());
        let y = y.min(self.height());
        let width = width.min(self.width() - x);
        let height = height.min(self.height() - y);
        match self {
            Self::Color(img) => Self::Color(image::imageops::crop_imm(img, x, y, width, height).to_image()),
            Self::Gray(img) => Self::Gray(image::imageops::crop_imm(img, x, y, width, height).to_image()),
        }
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let res = match self {
            Self::Color(img) => img.save_with_format(path, image::ImageFormat::Png),
            Self::Gray(img) => img.save_with_format(path, image::ImageFormat::Png),
        };
        res.map_err(|source| Error::Save {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl From<RgbImage> for Frame {
    fn from(img: RgbImage) -> Self {
        Self::Color(img)
    }
}

impl From<GrayImage> for Frame {
    fn from(img: GrayImage) -> Self {
        Self::Gray(img)
    }
}

/// Convert to a grayscale `GrayImage` (luma).
fn to_gray_image(img: &RgbImage) -> GrayImage {
    let mut out = GrayImage::new(img.width(), img.height());
    for (dst, src) in out.pixels_mut().zip(img.pixels()) {
        let [r, g, b] = src.0;
        *dst = Luma([Color::new(r, g, b).luma()]);
    }
    out
}

/// Each luma sample repeated into RGB.
fn from_gray_as_rgb(gray: &GrayImage) -> RgbImage {
    let mut out = RgbImage::new(gray.width(), gray.height());
    for (dst, src) in out.pixels_mut().zip(gray.pixels()) {
        let v = src.0[0];
        *dst = Rgb([v, v, v]);
    }
    out
}

// ----------

/// Reference image being searched for.
#[derive(Clone, Debug)]
pub struct Template {
    label: String,
    frame: Frame,
}

impl Template {
    /// Decode a template from an image file (any format `image` can read).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|source| Error::TemplateUnreadable {
            path: PathBuf::from(path),
            source,
        })?;
        Ok(Self {
            label: path.display().to_string(),
            frame: Frame::Color(img.to_rgb8()),
        })
    }

    pub fn new(label: impl Into<String>, frame: impl Into<Frame>) -> Self {
        Self {
            label: label.into(),
            frame: frame.into(),
        }
    }

    /// Human-readable identifier (the file path for loaded templates).
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn to_mode(&self, mode: ColorMode) -> Cow<'_, Frame> {
        self.frame.to_mode(mode)
    }
}

// ----------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[repr(C)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Compute luma (grayscale intensity), ITU-R BT.601 weights.
    pub fn luma(&self) -> u8 {
        let r = self.r as u32;
        let g = self.g as u32;
        let b = self.b as u32;
        ((299 * r + 587 * g + 114 * b + 500) / 1000) as u8
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgba_discards_alpha() {
        let bytes = [1, 2, 3, 255, 4, 5, 6, 0];
        let frame = Frame::from_rgba(2, 1, &bytes);
        assert_eq!(frame.pixel(0, 0), Color::new(1, 2, 3));
        assert_eq!(frame.pixel(1, 0), Color::new(4, 5, 6));
        assert_eq!(frame.samples(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn same_mode_conversion_borrows() {
        let frame = Frame::Color(RgbImage::new(4, 4));
        assert!(matches!(frame.to_mode(ColorMode::Color), Cow::Borrowed(_)));
        let gray = frame.to_mode(ColorMode::Gray);
        assert_eq!(gray.mode(), ColorMode::Gray);
        assert_eq!(gray.dimensions(), (4, 4));
    }

    #[test]
    fn luma_extremes() {
        assert_eq!(Color::WHITE.luma(), 255);
        assert_eq!(Color::BLACK.luma(), 0);
        assert_eq!(Color::new(255, 0, 0).luma(), 76);
    }

    #[test]
    fn crop_clamps() {
        let frame = Frame::Gray(GrayImage::new(10, 10));
        assert_eq!(frame.crop(8, 8, 5, 5).dimensions(), (2, 2));
    }

    #[test]
    fn missing_template_is_resource_error() {
        let err = Template::open("/definitely/not/here.png").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Resource);
        assert!(err.to_string().contains("not found or unreadable"));
    }
}
