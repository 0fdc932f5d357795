use std::time::{Duration, Instant};

use ie::{Color, Engine, ErrorKind, MemorySource, Needle, Point, Region, SearchConfig, Template};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

fn hash(x: u32, y: u32, seed: u32) -> u8 {
    let mut h = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77) ^ seed.wrapping_mul(0xC2B2_AE3D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x2C1B_3C6D);
    h ^= h >> 12;
    (h & 0xff) as u8
}

/// Noisy desktop with a few flat "windows" drawn over it.
fn desktop(width: u32, height: u32) -> RgbImage {
    let mut img = RgbImage::from_fn(width, height, |x, y| Rgb([hash(x, y, 1), hash(x, y, 2), hash(x, y, 3)]));
    draw_filled_rect_mut(&mut img, Rect::at(20, 20).of_size(width / 4, height / 5), Rgb([230, 230, 235]));
    draw_filled_rect_mut(&mut img, Rect::at((width / 2) as i32, 10).of_size(width / 6, height / 8), Rgb([30, 60, 140]));
    img
}

fn crop(img: &RgbImage, x: u32, y: u32, w: u32, h: u32) -> Template {
    Template::new(format!("crop@{x},{y}"), image::imageops::crop_imm(img, x, y, w, h).to_image())
}

/// Checkerboard in colors that never occur as large blocks on the desktop.
fn absent() -> Template {
    let img = RgbImage::from_fn(16, 16, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 { Rgb([255, 0, 255]) } else { Rgb([0, 255, 0]) }
    });
    Template::new("absent", img)
}

#[test]
fn locates_crop_on_full_hd_screen() {
    let screen = desktop(1920, 1080);
    let tpl = crop(&screen, 300, 400, 50, 50);
    let engine = Engine::new(MemorySource::new(screen));
    let config = SearchConfig::default()
        .with_precision(0.8)
        .with_grayscale(false)
        .with_max_search_time(Duration::ZERO);

    let region = Region::new(0, 0, 1920, 1080).unwrap();
    let found = engine.exist(&tpl, Some(region), &config, None).unwrap().expect("template on screen");
    let center = found.target();
    assert!((center.x - 325).abs() <= 1 && (center.y - 425).abs() <= 1, "{center:?}");
    assert!(found.score() >= 0.99, "{}", found.score());
}

#[test]
fn required_pixel_never_satisfied() {
    let screen = desktop(200, 150);
    let tpl = crop(&screen, 90, 70, 20, 20);
    let actual = screen.get_pixel(100, 80).0;
    let source = MemorySource::new(screen);
    let engine = Engine::new(&source);

    let config = SearchConfig::default()
        .with_downscale(1)
        .with_grayscale(false)
        .with_max_search_time(Duration::from_millis(200))
        .with_poll_interval(Duration::from_millis(20))
        .with_required_pixel(Color::new(!actual[0], !actual[1], !actual[2]));

    // Sanity: the image itself is there.
    let hit = engine.exist(&tpl, None, &config, None).unwrap().unwrap();
    assert_eq!(hit.target(), Point::new(100, 80));
    let before = source.captures();

    let start = Instant::now();
    assert!(engine.wait_for(&tpl, None, &config).unwrap().is_none());
    assert!(start.elapsed() >= Duration::from_millis(200));

    let attempts = source.captures() - before;
    assert!(attempts >= 2, "{attempts}");
    assert_eq!(source.pixel_reads(), attempts);
}

#[test]
fn required_pixel_satisfied() {
    let screen = desktop(200, 150);
    let tpl = crop(&screen, 90, 70, 20, 20);
    let actual = screen.get_pixel(100, 80).0;
    let engine = Engine::new(MemorySource::new(screen));
    let config = SearchConfig::default()
        .with_downscale(1)
        .with_grayscale(false)
        .with_required_pixel((actual[0], actual[1], actual[2]));
    assert!(engine.wait_for(&tpl, None, &config).unwrap().is_some());
}

#[test]
fn zero_deadline_means_one_attempt() {
    let source = MemorySource::new(desktop(160, 120));
    let engine = Engine::new(&source);
    let config = SearchConfig::default()
        .with_precision(0.9)
        .with_max_search_time(Duration::ZERO)
        .with_poll_interval(Duration::from_secs(5));

    let start = Instant::now();
    assert!(engine.wait_for(&absent(), None, &config).unwrap().is_none());
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(source.captures(), 1);
}

#[test]
fn deadline_honored_within_one_poll() {
    let source = MemorySource::new(desktop(160, 120));
    let engine = Engine::new(&source);
    let max = Duration::from_millis(150);
    let poll = Duration::from_millis(30);
    let config = SearchConfig::default()
        .with_precision(0.9)
        .with_max_search_time(max)
        .with_poll_interval(poll);

    let start = Instant::now();
    assert!(engine.wait_for(&absent(), None, &config).unwrap().is_none());
    let elapsed = start.elapsed();
    assert!(elapsed >= max, "{elapsed:?}");
    // One poll of tolerance plus slack for a loaded test machine.
    assert!(elapsed < max + poll + Duration::from_millis(500), "{elapsed:?}");
    assert!(source.captures() >= 2);
}

#[test]
fn strict_wait_reports_not_found() {
    let engine = Engine::new(MemorySource::new(desktop(160, 120)));
    let config = SearchConfig::default()
        .with_precision(0.9)
        .with_max_search_time(Duration::from_millis(40))
        .with_poll_interval(Duration::from_millis(10));

    let err = engine.wait(&absent(), None, &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("absent"), "{err}");
    match err {
        ie::Error::NotFound { elapsed, .. } => assert!(elapsed >= Duration::from_millis(40)),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn appears_while_polling() {
    let blank = RgbImage::from_pixel(120, 90, Rgb([40, 40, 40]));
    let screen = desktop(120, 90);
    let tpl = crop(&screen, 30, 30, 24, 24);
    let source = MemorySource::new(blank);
    let engine = Engine::new(&source);
    let config = SearchConfig::default()
        .with_downscale(1)
        .with_max_search_time(Duration::from_secs(5))
        .with_poll_interval(Duration::from_millis(10));

    std::thread::scope(|s| {
        s.spawn(|| {
            std::thread::sleep(Duration::from_millis(60));
            source.replace(screen.clone());
        });
        let found = engine.wait(&tpl, None, &config).unwrap();
        assert_eq!(found.top_left(), Point::new(30, 30));
    });
    assert!(source.captures() >= 2);
}

#[test]
fn template_larger_than_region_is_geometry_error() {
    let screen = desktop(200, 150);
    let tpl = crop(&screen, 0, 0, 60, 20);
    let source = MemorySource::new(screen);
    let engine = Engine::new(&source);
    let region = Region::new(10, 10, 50, 100).unwrap();
    let config = SearchConfig::default().with_max_search_time(Duration::from_secs(1));

    let start = Instant::now();
    let err = engine.wait_for(&tpl, Some(region), &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Geometry);
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
fn missing_template_file_is_resource_error() {
    let engine = Engine::new(MemorySource::new(desktop(50, 50)));
    let err = engine
        .wait_for("/nonexistent/button.png", None, &SearchConfig::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resource);
}

#[test]
fn templates_from_files_and_folders() {
    let screen = desktop(240, 160);
    let dir = tempfile::tempdir().unwrap();
    crop(&screen, 10, 100, 30, 30).frame().save_png(dir.path().join("a_button.png")).unwrap();
    absent().frame().save_png(dir.path().join("b_absent.png")).unwrap();
    crop(&screen, 200, 5, 30, 30).frame().save_png(dir.path().join("c_icon.PNG")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

    let source = MemorySource::new(screen);
    let engine = Engine::new(&source);
    let config = SearchConfig::default().with_downscale(1).with_grayscale(false).with_precision(0.95);

    let path = dir.path().join("a_button.png");
    let hit = engine.exist(&path, None, &config, None).unwrap().unwrap();
    assert_eq!(hit.target(), Point::new(25, 115));

    let before = source.captures();
    let scan = engine.exist_in_folder(dir.path(), None, &config).unwrap();
    assert_eq!(source.captures() - before, 1);
    let names: Vec<_> = scan
        .iter()
        .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["a_button.png", "b_absent.png", "c_icon.PNG"]);
    assert_eq!(scan[0].1, Some(Point::new(25, 115)));
    assert_eq!(scan[1].1, None);
    assert_eq!(scan[2].1, Some(Point::new(215, 20)));
}

#[test]
fn counts_repeated_icons() {
    let mut screen = desktop(200, 120);
    let icon = RgbImage::from_fn(12, 12, |x, y| Rgb([(x * 20) as u8, (y * 20) as u8, ((x + y) * 10) as u8]));
    for (x, y) in [(10, 10), (60, 10), (110, 70), (170, 90)] {
        image::imageops::replace(&mut screen, &icon, x, y);
    }
    let engine = Engine::new(MemorySource::new(screen));
    let tpl = Template::new("icon", icon);
    let config = SearchConfig::default().with_downscale(1).with_grayscale(false).with_precision(0.99);

    assert_eq!(engine.count(&tpl, None, &config).unwrap(), 4);
    let mut at: Vec<_> = engine
        .find_all(&tpl, None, &config)
        .unwrap()
        .iter()
        .map(|m| m.top_left())
        .collect();
    at.sort_by_key(|p| (p.x, p.y));
    assert_eq!(at, [Point::new(10, 10), Point::new(60, 10), Point::new(110, 70), Point::new(170, 90)]);

    let region = Region::new(0, 0, 100, 60).unwrap();
    assert_eq!(engine.count(Needle::from(&tpl), Some(region), &config).unwrap(), 2);
}

#[test]
fn concurrent_loops_are_independent() {
    let screen = desktop(160, 120);
    let present = crop(&screen, 40, 40, 20, 20);
    let engine = Engine::new(MemorySource::new(screen));
    let long = SearchConfig::default()
        .with_precision(0.9)
        .with_max_search_time(Duration::from_millis(200))
        .with_poll_interval(Duration::from_millis(10));
    let quick = SearchConfig::default().with_downscale(1).with_max_search_time(Duration::from_millis(200));

    std::thread::scope(|s| {
        let missing = s.spawn(|| engine.wait_for(&absent(), None, &long).unwrap());
        let start = Instant::now();
        assert!(engine.wait_for(&present, None, &quick).unwrap().is_some());
        assert!(start.elapsed() < Duration::from_millis(200));
        assert!(missing.join().unwrap().is_none());
    });
}
