//! Existence check and the timed search loop.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::{
    Color, ColorMode, Error, Frame, FrameSource, Point, Region, Result, Template, downscale::downscale,
    matcher, matcher::Alignment,
};

/// Extensions recognized by [`Engine::exist_in_folder`].
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

/// Options for a single search call.
///
/// Passed by value/reference into every call and never mutated mid-search.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Give up after this long. Zero means exactly one attempt.
    #[serde(with = "secs")]
    pub max_search_time: Duration,
    /// Pause between attempts.
    #[serde(with = "secs")]
    pub poll_interval: Duration,
    /// Match on luma instead of RGB. Faster, less discriminating.
    pub grayscale: bool,
    /// Minimum score accepted as a match, in (0, 1].
    pub precision: f64,
    /// Integer divisor applied to frame and template before matching.
    pub downscale: u32,
    /// When set, a match only counts if the screen pixel at its center has exactly this color.
    pub required_pixel: Option<Color>,
    /// Pixels added to each axis after scaling a downscaled offset back up.
    pub offset_correction: i32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_search_time: Duration::from_secs(2),
            poll_interval: Duration::ZERO,
            grayscale: true,
            precision: 0.8,
            downscale: 2,
            required_pixel: None,
            offset_correction: 1,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.precision > 0.0 && self.precision <= 1.0) {
            return Err(Error::InvalidPrecision(self.precision));
        }
        if self.downscale < 1 {
            return Err(Error::InvalidDownscale(self.downscale.to_string()));
        }
        Ok(())
    }

    pub fn with_max_search_time(mut self, timeout: Duration) -> Self {
        self.max_search_time = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_grayscale(mut self, grayscale: bool) -> Self {
        self.grayscale = grayscale;
        self
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_downscale(mut self, factor: u32) -> Self {
        self.downscale = factor;
        self
    }

    pub fn with_offset_correction(mut self, pixels: i32) -> Self {
        self.offset_correction = pixels;
        self
    }

    pub fn with_required_pixel(mut self, color: impl Into<Color>) -> Self {
        self.required_pixel = Some(color.into());
        self
    }

    #[inline]
    pub fn color_mode(&self) -> ColorMode {
        ColorMode::from_grayscale(self.grayscale)
    }
}

/// Durations stored as fractional seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let value = f64::deserialize(d)?;
        Duration::try_from_secs_f64(value).map_err(|_| {
            D::Error::custom(crate::Error::InvalidDuration {
                field: "seconds",
                value,
            })
        })
    }
}

// ----------

/// A located template.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    top_left: Point,
    center: Point,
    score: f64,
    precision: f64,
}

impl MatchResult {
    /// Top-left corner of the matched area in screen coordinates.
    pub fn top_left(&self) -> Point {
        self.top_left
    }

    /// Click target: the match center, plus any offset applied since.
    pub fn target(&self) -> Point {
        self.center
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    /// Nudge the target away from the found anchor.
    pub fn set_target_offset(&mut self, dx: i32, dy: i32) -> Point {
        self.center = self.center.offset(dx, dy);
        self.center
    }
}

/// What to look for: a file loaded on every attempt, or an already decoded template.
#[derive(Debug, Clone, Copy)]
pub enum Needle<'a> {
    Path(&'a Path),
    Template(&'a Template),
}

impl Needle<'_> {
    pub fn label(&self) -> Cow<'_, str> {
        match self {
            Needle::Path(p) => p.to_string_lossy(),
            Needle::Template(t) => Cow::Borrowed(t.label()),
        }
    }

    fn load(&self) -> Result<Cow<'_, Template>> {
        match self {
            Needle::Path(p) => Template::open(p).map(Cow::Owned),
            Needle::Template(t) => Ok(Cow::Borrowed(*t)),
        }
    }
}

impl<'a> From<&'a Path> for Needle<'a> {
    fn from(p: &'a Path) -> Self {
        Needle::Path(p)
    }
}

impl<'a> From<&'a PathBuf> for Needle<'a> {
    fn from(p: &'a PathBuf) -> Self {
        Needle::Path(p.as_path())
    }
}

impl<'a> From<&'a str> for Needle<'a> {
    fn from(p: &'a str) -> Self {
        Needle::Path(Path::new(p))
    }
}

impl<'a> From<&'a Template> for Needle<'a> {
    fn from(t: &'a Template) -> Self {
        Needle::Template(t)
    }
}

/// Image files directly inside `dir`, sorted by path.
pub fn image_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let io_err = |source| Error::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if path.is_file() && is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// ----------

/// Image search over a [`FrameSource`].
///
/// Holds no mutable state; any number of threads may search through one engine.
pub struct Engine<S> {
    source: S,
}

impl<S: FrameSource> Engine<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// One capture-and-match attempt.
    ///
    /// `pre_captured` replaces the capture; it must show `region` (or the
    /// whole display when `region` is `None`).
    pub fn exist<'a>(
        &self,
        needle: impl Into<Needle<'a>>,
        region: Option<Region>,
        config: &SearchConfig,
        pre_captured: Option<&Frame>,
    ) -> Result<Option<MatchResult>> {
        let needle = needle.into();
        config.validate()?;

        let captured;
        let frame = match pre_captured {
            Some(frame) => frame,
            None => {
                captured = self.source.capture(region)?;
                &captured
            }
        };
        let template = needle.load()?;

        let mode = config.color_mode();
        let frame = frame.to_mode(mode);
        let tpl = template.to_mode(mode);

        let (tw, th) = tpl.dimensions();
        if tw > frame.width() || th > frame.height() {
            return Err(Error::RegionTooSmall {
                target: template.label().to_string(),
                region_w: frame.width(),
                region_h: frame.height(),
                target_w: tw,
                target_h: th,
            });
        }

        let Alignment { x, y, score } = if config.downscale > 1 {
            let small_tpl = downscale(&tpl, config.downscale).map_err(|_| Error::TargetVanished {
                target: template.label().to_string(),
                factor: config.downscale,
            })?;
            let small_frame = downscale(&frame, config.downscale)?;
            let found = matcher::match_template(&small_frame, &small_tpl)?;
            let factor = config.downscale as i64;
            Alignment {
                x: (found.x as i64 * factor + config.offset_correction as i64).max(0) as u32,
                y: (found.y as i64 * factor + config.offset_correction as i64).max(0) as u32,
                score: found.score,
            }
        } else {
            matcher::match_template(&frame, &tpl)?
        };

        let origin = region.map(|r| r.origin()).unwrap_or_default();
        let top_left = Point::new(origin.x + x as i32, origin.y + y as i32);
        let center = Point::new(
            (top_left.x as f64 + tw as f64 / 2.0).round() as i32,
            (top_left.y as f64 + th as f64 / 2.0).round() as i32,
        );

        tracing::debug!(template = %template.label(), score, precision = config.precision, "exist");

        if score < config.precision {
            return Ok(None);
        }
        Ok(Some(MatchResult {
            top_left,
            center,
            score,
            precision: config.precision,
        }))
    }

    /// Poll [`Engine::exist`] until a match is found or the deadline passes.
    pub fn wait_for<'a>(
        &self,
        needle: impl Into<Needle<'a>>,
        region: Option<Region>,
        config: &SearchConfig,
    ) -> Result<Option<MatchResult>> {
        let needle = needle.into();
        config.validate()?;

        let start = Instant::now();
        loop {
            if let Some(found) = self.exist(needle, region, config, None)? {
                let Some(want) = config.required_pixel else {
                    return Ok(Some(found));
                };
                let at = found.target();
                let got = self.source.capture_pixel(at.x, at.y)?;
                if got == want {
                    return Ok(Some(found));
                }
                tracing::trace!(template = %needle.label(), ?got, ?want, "pixel check failed");
            }

            if config.max_search_time.is_zero() || start.elapsed() >= config.max_search_time {
                break;
            }
            std::thread::sleep(config.poll_interval);
            if start.elapsed() >= config.max_search_time {
                break;
            }
        }

        tracing::debug!(template = %needle.label(), elapsed = ?start.elapsed(), "not found");
        Ok(None)
    }

    /// Like [`Engine::wait_for`], but absence after the deadline is an error.
    pub fn wait<'a>(
        &self,
        needle: impl Into<Needle<'a>>,
        region: Option<Region>,
        config: &SearchConfig,
    ) -> Result<MatchResult> {
        let needle = needle.into();
        let start = Instant::now();
        match self.wait_for(needle, region, config)? {
            Some(found) => Ok(found),
            None => {
                let err = Error::NotFound {
                    target: needle.label().into_owned(),
                    elapsed: start.elapsed(),
                };
                tracing::error!(error = %err, "wait");
                Err(err)
            }
        }
    }

    /// Search several templates against one shared capture.
    ///
    /// One slot per needle in input order, `None` where it wasn't found.
    /// Templates are matched in parallel.
    pub fn find_any(
        &self,
        needles: &[Needle<'_>],
        region: Option<Region>,
        config: &SearchConfig,
    ) -> Result<Vec<Option<MatchResult>>> {
        config.validate()?;
        let frame = self.source.capture(region)?;
        needles
            .par_iter()
            .map(|needle| self.exist(*needle, region, config, Some(&frame)))
            .collect()
    }

    /// Every image file in `dir`, sorted by path, with its match target if found.
    pub fn exist_in_folder(
        &self,
        dir: impl AsRef<Path>,
        region: Option<Region>,
        config: &SearchConfig,
    ) -> Result<Vec<(PathBuf, Option<Point>)>> {
        let files = image_files(dir)?;
        let needles: Vec<Needle<'_>> = files.iter().map(Needle::from).collect();
        let found = self.find_any(&needles, region, config)?;
        Ok(files
            .into_iter()
            .zip(found)
            .map(|(path, m)| (path, m.map(|m| m.target())))
            .collect())
    }

    /// All non-overlapping matches, best first. Matched at full resolution.
    pub fn find_all<'a>(
        &self,
        needle: impl Into<Needle<'a>>,
        region: Option<Region>,
        config: &SearchConfig,
    ) -> Result<Vec<MatchResult>> {
        let needle = needle.into();
        config.validate()?;
        let frame = self.source.capture(region)?;
        let template = needle.load()?;

        let mode = config.color_mode();
        let frame = frame.to_mode(mode);
        let tpl = template.to_mode(mode);
        let (tw, th) = tpl.dimensions();
        if tw > frame.width() || th > frame.height() {
            return Err(Error::RegionTooSmall {
                target: template.label().to_string(),
                region_w: frame.width(),
                region_h: frame.height(),
                target_w: tw,
                target_h: th,
            });
        }

        let origin = region.map(|r| r.origin()).unwrap_or_default();
        let map = matcher::score_map(&frame, &tpl)?;
        Ok(map
            .occurrences(config.precision, tw, th)
            .into_iter()
            .map(|a| {
                let top_left = Point::new(origin.x + a.x as i32, origin.y + a.y as i32);
                MatchResult {
                    top_left,
                    center: Point::new(
                        (top_left.x as f64 + tw as f64 / 2.0).round() as i32,
                        (top_left.y as f64 + th as f64 / 2.0).round() as i32,
                    ),
                    score: a.score,
                    precision: config.precision,
                }
            })
            .collect())
    }

    /// Number of non-overlapping matches.
    pub fn count<'a>(
        &self,
        needle: impl Into<Needle<'a>>,
        region: Option<Region>,
        config: &SearchConfig,
    ) -> Result<usize> {
        Ok(self.find_all(needle, region, config)?.len())
    }

    pub fn pixel(&self, x: i32, y: i32) -> Result<Color> {
        self.source.capture_pixel(x, y)
    }

    /// Capture `region` and write it as `screenshot_<unix-millis>.png` into `dir`.
    pub fn save_screenshot(&self, region: Option<Region>, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let path = dir.as_ref().join(format!("screenshot_{millis}.png"));
        self.source.capture(region)?.save_png(&path)?;
        tracing::info!(path = %path.display(), "screenshot saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySource;
    use image::{Rgb, RgbImage};

    fn screen() -> RgbImage {
        RgbImage::from_fn(120, 80, |x, y| {
            let v = (x * 7 + y * 13 + (x * y) % 31) as u8;
            Rgb([v, v.wrapping_add(40), v.wrapping_mul(5)])
        })
    }

    fn cut(img: &RgbImage, x: u32, y: u32, w: u32, h: u32) -> Template {
        Template::new("cut", image::imageops::crop_imm(img, x, y, w, h).to_image())
    }

    fn exact() -> SearchConfig {
        SearchConfig::default()
            .with_downscale(1)
            .with_grayscale(false)
            .with_max_search_time(Duration::ZERO)
    }

    #[test]
    fn config_serde_uses_seconds() {
        let cfg: SearchConfig = serde_json::from_str(r#"{"max_search_time": 0.5, "precision": 0.9}"#).unwrap();
        assert_eq!(cfg.max_search_time, Duration::from_millis(500));
        assert_eq!(cfg.precision, 0.9);
        assert_eq!(cfg.downscale, 2);
        assert!(serde_json::from_str::<SearchConfig>(r#"{"poll_interval": -1.0}"#).is_err());
        assert!(serde_json::from_str::<SearchConfig>(r#"{"downscale": 1.5}"#).is_err());
    }

    #[test]
    fn invalid_config_fails_before_capture() {
        let src = MemorySource::new(screen());
        let engine = Engine::new(&src);
        let tpl = cut(&screen(), 0, 0, 5, 5);
        for cfg in [exact().with_precision(0.0), exact().with_precision(1.5), exact().with_downscale(0)] {
            let err = engine.exist(&tpl, None, &cfg, None).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Config);
        }
        assert_eq!(src.captures(), 0);
    }

    #[test]
    fn region_offsets_are_added() {
        let img = screen();
        let src = MemorySource::new(img.clone());
        let engine = Engine::new(&src);
        let tpl = cut(&img, 50, 30, 10, 8);
        let region = Region::new(40, 20, 100, 70).unwrap();
        let found = engine.exist(&tpl, Some(region), &exact(), None).unwrap().unwrap();
        assert_eq!(found.top_left(), Point::new(50, 30));
        assert_eq!(found.target(), Point::new(55, 34));
    }

    #[test]
    fn offset_adjusts_target() {
        let img = screen();
        let engine = Engine::new(MemorySource::new(img.clone()));
        let tpl = cut(&img, 10, 10, 6, 6);
        let mut found = engine.exist(&tpl, None, &exact(), None).unwrap().unwrap();
        assert_eq!(found.set_target_offset(20, -3), Point::new(33, 10));
        assert_eq!(found.target(), Point::new(33, 10));
        assert_eq!(found.top_left(), Point::new(10, 10));
    }

    #[test]
    fn pre_captured_frame_skips_capture() {
        let img = screen();
        let src = MemorySource::new(img.clone());
        let engine = Engine::new(&src);
        let frame = Frame::Color(img.clone());
        let tpl = cut(&img, 70, 40, 12, 12);
        assert!(engine.exist(&tpl, None, &exact(), Some(&frame)).unwrap().is_some());
        assert_eq!(src.captures(), 0);
    }

    #[test]
    fn find_any_shares_one_capture() {
        let img = screen();
        let src = MemorySource::new(img.clone());
        let engine = Engine::new(&src);
        let a = cut(&img, 5, 5, 10, 10);
        let b = Template::new("absent", RgbImage::from_fn(10, 10, |x, y| Rgb([(x * 25) as u8, 0, (y * 25) as u8])));
        let c = cut(&img, 90, 60, 10, 10);
        let res = engine
            .find_any(&[Needle::from(&a), Needle::from(&b), Needle::from(&c)], None, &exact().with_precision(0.95))
            .unwrap();
        assert_eq!(src.captures(), 1);
        assert_eq!(res[0].as_ref().map(|m| m.top_left()), Some(Point::new(5, 5)));
        assert!(res[1].is_none());
        assert_eq!(res[2].as_ref().map(|m| m.top_left()), Some(Point::new(90, 60)));
    }

    #[test]
    fn downscaled_offset_is_scaled_back() {
        let img = screen();
        let engine = Engine::new(MemorySource::new(img.clone()));
        let tpl = cut(&img, 40, 20, 24, 24);
        let cfg = exact().with_downscale(2).with_precision(0.5);
        let found = engine.exist(&tpl, None, &cfg, None).unwrap().unwrap();
        let tl = found.top_left();
        assert!((tl.x - 40).abs() <= 2 && (tl.y - 20).abs() <= 2, "{tl:?}");
    }

    fn noise(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let mut v = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77);
            v ^= v >> 15;
            v = v.wrapping_mul(0x2C1B_3C6D);
            v ^= v >> 13;
            Rgb([v as u8, (v >> 8) as u8, (v >> 16) as u8])
        })
    }

    #[test]
    fn default_config_finds_crop_with_offset_correction() {
        let img = noise(200, 160);
        let engine = Engine::new(MemorySource::new(img.clone()));
        let tpl = cut(&img, 60, 40, 32, 24);
        let cfg = SearchConfig::default().with_max_search_time(Duration::ZERO);
        assert!(cfg.grayscale);
        assert_eq!((cfg.downscale, cfg.offset_correction), (2, 1));

        let found = engine.exist(&tpl, None, &cfg, None).unwrap().unwrap();
        assert_eq!(found.top_left(), Point::new(30 * 2 + 1, 20 * 2 + 1));
        assert_eq!(found.target(), Point::new(61 + 16, 41 + 12));
        assert!(found.score() >= 0.99, "{}", found.score());
    }

    #[test]
    fn offset_correction_is_configurable() {
        let img = noise(200, 160);
        let engine = Engine::new(MemorySource::new(img.clone()));
        let tpl = cut(&img, 60, 40, 32, 24);
        for (correction, expected) in [(0, Point::new(60, 40)), (-1, Point::new(59, 39)), (3, Point::new(63, 43))] {
            let cfg = SearchConfig::default()
                .with_max_search_time(Duration::ZERO)
                .with_offset_correction(correction);
            let found = engine.exist(&tpl, None, &cfg, None).unwrap().unwrap();
            assert_eq!(found.top_left(), expected, "correction {correction}");
        }
    }

    #[test]
    fn pixel_at_coordinate_limit_is_an_error() {
        let src = MemorySource::new(screen());
        let engine = Engine::new(&src);
        assert_eq!(engine.pixel(i32::MAX, 0).unwrap_err().kind(), crate::ErrorKind::Config);
        let [r, g, b] = screen().get_pixel(3, 4).0;
        assert_eq!(engine.pixel(3, 4).unwrap(), Color::new(r, g, b));
    }

    #[test]
    fn screenshot_round_trips_through_png() {
        let img = screen();
        let engine = Engine::new(MemorySource::new(img.clone()));
        let dir = tempfile::tempdir().unwrap();
        let region = Region::new(10, 20, 50, 45).unwrap();

        let path = engine.save_screenshot(Some(region), dir.path()).unwrap();
        assert_eq!(path.parent(), Some(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("screenshot_") && name.ends_with(".png"), "{name}");

        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (40, 25));
        let expected = engine.pixel(10 + 7, 20 + 3).unwrap();
        let [r, g, b] = saved.get_pixel(7, 3).0;
        assert_eq!(Color::new(r, g, b), expected);
    }

    #[test]
    fn template_vanishing_under_downscale() {
        let img = screen();
        let engine = Engine::new(MemorySource::new(img.clone()));
        let tpl = cut(&img, 0, 0, 3, 3);
        let err = engine.exist(&tpl, None, &exact().with_downscale(4), None).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Geometry);
    }
}
