//! Where frames come from.

use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::RgbImage;

use crate::{Color, Error, Frame, Point, Region, Result};

/// Screen reader consumed by the search layer.
///
/// Every call re-captures; implementations must not cache frames between calls.
pub trait FrameSource: Send + Sync {
	/// Bounding box of the primary display in screen coordinates.
	fn display(&self) -> Result<Region>;

	/// Capture exactly `region`, or the whole primary display when `None`.
	/// Always returns a color frame.
	fn capture(&self, region: Option<Region>) -> Result<Frame>;

	fn capture_pixel(&self, x: i32, y: i32) -> Result<Color> {
		let frame = self.capture(Some(Region::point(x, y)?))?;
		Ok(frame.pixel(0, 0))
	}
}

impl<S: FrameSource + ?Sized> FrameSource for &S {
	fn display(&self) -> Result<Region> {
		(**self).display()
	}

	fn capture(&self, region: Option<Region>) -> Result<Frame> {
		(**self).capture(region)
	}

	fn capture_pixel(&self, x: i32, y: i32) -> Result<Color> {
		(**self).capture_pixel(x, y)
	}
}

impl<S: FrameSource + ?Sized> FrameSource for std::sync::Arc<S> {
	fn display(&self) -> Result<Region> {
		(**self).display()
	}

	fn capture(&self, region: Option<Region>) -> Result<Frame> {
		(**self).capture(region)
	}

	fn capture_pixel(&self, x: i32, y: i32) -> Result<Color> {
		(**self).capture_pixel(x, y)
	}
}

/// Crop `region` (screen coordinates) out of a screen image whose top-left
/// pixel sits at `origin`.
pub fn crop_screen(screen: &RgbImage, origin: Point, region: Option<Region>) -> Result<Frame> {
	let Some(region) = region else {
		return Ok(Frame::Color(screen.clone()));
	};
	let bounds = Region::at(origin, screen.width(), screen.height())?;
	if bounds.intersect(&region) != Some(region) {
		return Err(Error::Capture(format!(
			"region {:?} lies outside the display {:?}",
			<[i32; 4]>::from(region),
			<[i32; 4]>::from(bounds)
		)));
	}
	let x = (region.x1() - origin.x) as u32;
	let y = (region.y1() - origin.y) as u32;
	Ok(Frame::Color(
		image::imageops::crop_imm(screen, x, y, region.width(), region.height()).to_image(),
	))
}

/// A fixed in-memory "screen": a screenshot file, or a synthetic image in tests.
///
/// The picture can be swapped at runtime to emulate a changing display, and
/// capture calls are counted.
pub struct MemorySource {
	origin: Point,
	screen: RwLock<RgbImage>,
	captures: AtomicUsize,
	pixel_reads: AtomicUsize,
}

impl MemorySource {
	pub fn new(screen: RgbImage) -> Self {
		Self::with_origin(screen, Point::new(0, 0))
	}

	pub fn with_origin(screen: RgbImage, origin: Point) -> Self {
		Self {
			origin,
			screen: RwLock::new(screen),
			captures: AtomicUsize::new(0),
			pixel_reads: AtomicUsize::new(0),
		}
	}

	/// Load a screenshot from disk.
	pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
		let path = path.as_ref();
		let img = image::open(path).map_err(|source| Error::TemplateUnreadable {
			path: path.to_path_buf(),
			source,
		})?;
		Ok(Self::new(img.to_rgb8()))
	}

	pub fn replace(&self, screen: RgbImage) {
		match self.screen.write() {
			Ok(mut guard) => *guard = screen,
			Err(poisoned) => *poisoned.into_inner() = screen,
		}
	}

	/// Number of `capture` calls so far (pixel reads excluded).
	pub fn captures(&self) -> usize {
		self.captures.load(Ordering::Relaxed)
	}

	pub fn pixel_reads(&self) -> usize {
		self.pixel_reads.load(Ordering::Relaxed)
	}

	fn read(&self, region: Option<Region>) -> Result<Frame> {
		let screen = self
			.screen
			.read()
			.map_err(|_| Error::Capture("screen buffer lock poisoned".to_string()))?;
		crop_screen(&screen, self.origin, region)
	}
}

impl FrameSource for MemorySource {
	fn display(&self) -> Result<Region> {
		let screen = self
			.screen
			.read()
			.map_err(|_| Error::Capture("screen buffer lock poisoned".to_string()))?;
		Region::at(self.origin, screen.width(), screen.height())
	}

	fn capture(&self, region: Option<Region>) -> Result<Frame> {
		self.captures.fetch_add(1, Ordering::Relaxed);
		self.read(region)
	}

	fn capture_pixel(&self, x: i32, y: i32) -> Result<Color> {
		self.pixel_reads.fetch_add(1, Ordering::Relaxed);
		Ok(self.read(Some(Region::point(x, y)?))?.pixel(0, 0))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::Rgb;

	#[test]
	fn crops_in_screen_coordinates() {
		let screen = RgbImage::from_fn(20, 10, |x, y| Rgb([x as u8, y as u8, 0]));
		let src = MemorySource::with_origin(screen, Point::new(100, 50));
		let frame = src.capture(Some(Region::new(105, 52, 110, 55).unwrap())).unwrap();
		assert_eq!(frame.dimensions(), (5, 3));
		assert_eq!(frame.pixel(0, 0), Color::new(5, 2, 0));
		assert_eq!(src.capture_pixel(119, 59).unwrap(), Color::new(19, 9, 0));
		assert_eq!(src.captures(), 1);
		assert_eq!(src.pixel_reads(), 1);
	}

	#[test]
	fn outside_display_is_resource_error() {
		let src = MemorySource::new(RgbImage::new(10, 10));
		let err = src.capture(Some(Region::new(5, 5, 11, 8).unwrap())).unwrap_err();
		assert_eq!(err.kind(), crate::ErrorKind::Resource);
	}

	#[test]
	fn whole_display_when_no_region() {
		let src = MemorySource::new(RgbImage::new(7, 3));
		assert_eq!(src.capture(None).unwrap().dimensions(), (7, 3));
		assert_eq!(src.display().unwrap(), Region::new(0, 0, 7, 3).unwrap());
	}
}
