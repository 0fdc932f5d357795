//! Image search engine: locate a template image inside a screen capture.
//!
//! The pipeline is capture → color conversion → optional downscale →
//! normalized cross-correlation → threshold. [`Engine`] wraps it with a
//! polling loop and a few multi-template conveniences.

mod error;
pub use error::*;
mod frame;
pub use frame::*;
mod geometry;
pub use geometry::*;
mod source;
pub use source::*;
mod search;
pub use search::*;

pub mod downscale;
pub use downscale::checked_factor;
pub mod matcher;
