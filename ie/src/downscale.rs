//! Integer-factor downscaling applied before matching.
//!
//! Both dimensions are divided by the factor (truncating) and resampled with a
//! box filter, which at reduction ratios averages every source pixel into its
//! destination cell. Nearest/bilinear sampling would alias high-frequency UI
//! detail and skew the correlation scores.

use fast_image_resize::images::{Image, ImageRef};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{GrayImage, RgbImage};

use crate::{Error, Frame, Result};

/// Validate a factor coming from an untyped source (JSON, scripting glue).
///
/// Negative, zero, fractional and non-finite values are all rejected.
pub fn checked_factor(value: f64) -> Result<u32> {
    if value.is_finite() && value >= 1.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Ok(value as u32)
    } else {
        Err(Error::InvalidDownscale(value.to_string()))
    }
}

/// Dimensions of `frame` after dividing by `factor`.
#[inline]
pub fn scaled_dimensions(width: u32, height: u32, factor: u32) -> (u32, u32) {
    (width / factor.max(1), height / factor.max(1))
}

/// Shrink `frame` by `factor` in both axes. A factor of 1 returns the frame as-is.
pub fn downscale(frame: &Frame, factor: u32) -> Result<Frame> {
    if factor < 1 {
        return Err(Error::InvalidDownscale(factor.to_string()));
    }
    if factor == 1 {
        return Ok(frame.clone());
    }

    let (width, height) = scaled_dimensions(frame.width(), frame.height(), factor);
    if width == 0 || height == 0 {
        return Err(Error::Resize(format!(
            "{}x{} frame is smaller than factor {factor}",
            frame.width(),
            frame.height()
        )));
    }

    let pixel_type = match frame {
        Frame::Color(_) => PixelType::U8x3,
        Frame::Gray(_) => PixelType::U8,
    };
    let bytes = resize_samples(frame.samples(), frame.width(), frame.height(), width, height, pixel_type)?;

    let out = match frame {
        Frame::Color(_) => RgbImage::from_raw(width, height, bytes).map(Frame::Color),
        Frame::Gray(_) => GrayImage::from_raw(width, height, bytes).map(Frame::Gray),
    };
    out.ok_or_else(|| Error::Resize("resized buffer has unexpected length".to_string()))
}

fn resize_samples(
    samples: &[u8],
    src_w: u32,
    src_h: u32,
    dst_w: u32,
    dst_h: u32,
    pixel_type: PixelType,
) -> Result<Vec<u8>> {
    let src = ImageRef::new(src_w, src_h, samples, pixel_type).map_err(|e| Error::Resize(e.to_string()))?;
    let mut dst = Image::new(dst_w, dst_h, pixel_type);

    let mut resizer = Resizer::new();
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Box));
    resizer
        .resize(&src, &mut dst, &Some(options))
        .map_err(|e| Error::Resize(e.to_string()))?;

    Ok(dst.into_vec())
}
