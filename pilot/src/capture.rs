use ie::{Error, Frame, FrameSource, Point, Region, Result};
use xcap::image::EncodableLayout;

/// Live captures of the primary monitor.
///
/// Every call grabs a fresh screenshot; regions are cut out in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScreenSource;

impl ScreenSource {
	pub fn new() -> Self {
		Self
	}

	fn primary() -> Result<xcap::Monitor> {
		let monitors = xcap::Monitor::all().map_err(|e| Error::Capture(format!("enumerate monitors: {e}")))?;
		let mut fallback = None;
		for monitor in monitors {
			if monitor.is_primary().unwrap_or(false) {
				return Ok(monitor);
			}
			fallback.get_or_insert(monitor);
		}
		fallback.ok_or_else(|| Error::Capture("no monitor found".to_string()))
	}

	fn bounds(monitor: &xcap::Monitor) -> Result<Region> {
		let err = |e: xcap::XCapError| Error::Capture(format!("monitor geometry: {e}"));
		let origin = Point::new(monitor.x().map_err(err)?, monitor.y().map_err(err)?);
		Region::at(origin, monitor.width().map_err(err)?, monitor.height().map_err(err)?)
	}
}

impl FrameSource for ScreenSource {
	fn display(&self) -> Result<Region> {
		Self::bounds(&Self::primary()?)
	}

	fn capture(&self, region: Option<Region>) -> Result<Frame> {
		let monitor = Self::primary()?;
		let bounds = Self::bounds(&monitor)?;
		let img = monitor
			.capture_image()
			.map_err(|e| Error::Capture(format!("capture primary monitor: {e}")))?;

		let Frame::Color(screen) = Frame::from_rgba(img.width(), img.height(), img.as_bytes()) else {
			return Err(Error::Capture("unexpected capture format".to_string()));
		};
		let frame = ie::crop_screen(&screen, bounds.origin(), region)?;
		tracing::trace!(width = frame.width(), height = frame.height(), "captured");
		Ok(frame)
	}
}
