use crate::{Error, Result};

/// Screen-coordinate point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// Screen rectangle given by two corners, `x1 < x2` and `y1 < y2`.
///
/// The right and bottom edges are exclusive, so `Region::point(x, y)` is the
/// 1x1 rectangle holding exactly that pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "[i32; 4]", into = "[i32; 4]")]
pub struct Region {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

impl Region {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self> {
        if x1 < x2 && y1 < y2 {
            Ok(Self { x1, y1, x2, y2 })
        } else {
            Err(Error::InvalidRegion { x1, y1, x2, y2 })
        }
    }

    /// Region of `width` x `height` pixels with its top-left corner at `origin`.
    pub fn at(origin: Point, width: u32, height: u32) -> Result<Self> {
        Self::new(
            origin.x,
            origin.y,
            origin.x.saturating_add(width as i32),
            origin.y.saturating_add(height as i32),
        )
    }

    /// The single pixel at `(x, y)`. Fails on the last representable
    /// column or row, which has no exclusive edge.
    pub fn point(x: i32, y: i32) -> Result<Self> {
        Self::new(x, y, x.saturating_add(1), y.saturating_add(1))
    }

    #[inline]
    pub fn x1(&self) -> i32 {
        self.x1
    }

    #[inline]
    pub fn y1(&self) -> i32 {
        self.y1
    }

    #[inline]
    pub fn x2(&self) -> i32 {
        self.x2
    }

    #[inline]
    pub fn y2(&self) -> i32 {
        self.y2
    }

    #[inline]
    pub fn origin(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        (self.x2 - self.x1) as u32
    }

    #[inline]
    pub fn height(&self) -> u32 {
        (self.y2 - self.y1) as u32
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x1 && p.x < self.x2 && p.y >= self.y1 && p.y < self.y2
    }

    /// Intersection of two regions, `None` when they do not overlap.
    pub fn intersect(&self, other: &Region) -> Option<Region> {
        Region::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        )
        .ok()
    }

    /// The four corner pixels, clockwise from top-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x1, self.y1),
            Point::new(self.x2 - 1, self.y1),
            Point::new(self.x2 - 1, self.y2 - 1),
            Point::new(self.x1, self.y2 - 1),
        ]
    }
}

impl TryFrom<[i32; 4]> for Region {
    type Error = Error;

    fn try_from([x1, y1, x2, y2]: [i32; 4]) -> Result<Self> {
        Self::new(x1, y1, x2, y2)
    }
}

impl From<Region> for [i32; 4] {
    fn from(r: Region) -> Self {
        [r.x1, r.y1, r.x2, r.y2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn ordered_corners_construct() {
        for (x1, y1, x2, y2) in [(0, 0, 1, 1), (-50, -20, 10, 5), (0, 0, 1920, 1080), (300, 400, 350, 450)] {
            let r = Region::new(x1, y1, x2, y2).unwrap();
            assert_eq!(r.width(), (x2 - x1) as u32);
            assert_eq!(r.height(), (y2 - y1) as u32);
        }
    }

    #[test]
    fn degenerate_or_inverted_regions_are_config_errors() {
        for (x1, y1, x2, y2) in [(0, 0, 0, 10), (0, 0, 10, 0), (10, 0, 5, 5), (0, 10, 5, 5), (3, 3, 3, 3)] {
            let err = Region::new(x1, y1, x2, y2).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config);
        }
    }

    #[test]
    fn point_region_holds_one_pixel() {
        let r = Region::point(0, 0).unwrap();
        assert!(r.contains(Point::new(0, 0)));
        assert!(!r.contains(Point::new(1, 0)));
        assert!(!r.contains(Point::new(0, 1)));
        assert!(!r.contains(Point::new(-1, 0)));
    }

    #[test]
    fn point_region_at_the_coordinate_limit_is_rejected() {
        assert_eq!(Region::point(i32::MAX, 0).unwrap_err().kind(), ErrorKind::Config);
        assert_eq!(Region::point(0, i32::MAX).unwrap_err().kind(), ErrorKind::Config);
        let r = Region::point(i32::MAX - 1, i32::MIN).unwrap();
        assert_eq!((r.width(), r.height()), (1, 1));
    }

    #[test]
    fn corners_are_inside() {
        let r = Region::new(0, 0, 1920, 1080).unwrap();
        for c in r.corners() {
            assert!(r.contains(c), "{c:?}");
        }
        assert_eq!(r.corners()[2], Point::new(1919, 1079));
    }

    #[test]
    fn deserialize_validates() {
        let ok: Region = serde_json::from_str("[1, 2, 3, 4]").unwrap();
        assert_eq!(ok.origin(), Point::new(1, 2));
        assert!(serde_json::from_str::<Region>("[5, 5, 1, 1]").is_err());
    }
}
