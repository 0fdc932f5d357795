//! Error taxonomy for the search engine.

use std::path::PathBuf;
use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification of an [`Error`].
///
/// Only [`ErrorKind::NotFound`] describes a genuine absence of the target;
/// everything else is a caller or environment problem and must not be
/// treated as "not on screen".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Resource,
    Geometry,
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid region ({x1}, {y1}, {x2}, {y2}): expected x1 < x2 and y1 < y2")]
    InvalidRegion { x1: i32, y1: i32, x2: i32, y2: i32 },

    #[error("unrecognized compression ratio: {0} (expected a positive integer)")]
    InvalidDownscale(String),

    #[error("precision {0} is outside (0, 1]")]
    InvalidPrecision(f64),

    #[error("invalid duration for {field}: {value} s")]
    InvalidDuration { field: &'static str, value: f64 },

    #[error("frame and template color modes differ ({frame:?} vs {template:?})")]
    ColorModeMismatch {
        frame: crate::ColorMode,
        template: crate::ColorMode,
    },

    #[error("image file not found or unreadable: {}", path.display())]
    TemplateUnreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("screen capture unavailable: {0}")]
    Capture(String),

    #[error("read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write {}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(
        "the region ({region_w}x{region_h}) is smaller than the search target ({target_w}x{target_h}): {target}"
    )]
    RegionTooSmall {
        target: String,
        region_w: u32,
        region_h: u32,
        target_w: u32,
        target_h: u32,
    },

    #[error("resize failed: {0}")]
    Resize(String),

    #[error("search target {target} vanishes at downscale factor {factor}")]
    TargetVanished { target: String, factor: u32 },

    #[error("couldn't find {target} within {elapsed:.2?}")]
    NotFound { target: String, elapsed: Duration },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRegion { .. }
            | Error::InvalidDownscale(_)
            | Error::InvalidPrecision(_)
            | Error::InvalidDuration { .. }
            | Error::ColorModeMismatch { .. } => ErrorKind::Config,
            Error::TemplateUnreadable { .. } | Error::Capture(_) | Error::Io { .. } | Error::Save { .. } => {
                ErrorKind::Resource
            }
            Error::RegionTooSmall { .. } | Error::TargetVanished { .. } | Error::Resize(_) => {
                ErrorKind::Geometry
            }
            Error::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}
