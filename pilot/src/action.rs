//! Guarded mouse and keyboard actions, optionally aimed by image search.
//!
//! Every input primitive runs the fail-safe check first. Image targets are
//! resolved once, up front, through the strict search loop; an image that
//! never shows up fails the action with [`ie::Error::NotFound`] before
//! anything is pressed.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ie::{Color, Engine, FrameSource, MatchResult, Needle, Point, Region, SearchConfig, Template};

use crate::config::Timing;
use crate::failsafe::{FailSafe, KeyStateObserver};
use crate::input::{HeldKeys, InputDriver, MouseButton, Press};
use crate::{Key, Result};

/// Where an action lands.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Point(Point),
    Path(&'a Path),
    Template(&'a Template),
}

impl From<Point> for Target<'_> {
    fn from(p: Point) -> Self {
        Target::Point(p)
    }
}

impl From<(i32, i32)> for Target<'_> {
    fn from((x, y): (i32, i32)) -> Self {
        Target::Point(Point::new(x, y))
    }
}

impl From<&MatchResult> for Target<'_> {
    fn from(m: &MatchResult) -> Self {
        Target::Point(m.target())
    }
}

impl<'a> From<&'a Path> for Target<'a> {
    fn from(p: &'a Path) -> Self {
        Target::Path(p)
    }
}

impl<'a> From<&'a PathBuf> for Target<'a> {
    fn from(p: &'a PathBuf) -> Self {
        Target::Path(p)
    }
}

impl<'a> From<&'a str> for Target<'a> {
    fn from(p: &'a str) -> Self {
        Target::Path(Path::new(p))
    }
}

impl<'a> From<&'a String> for Target<'a> {
    fn from(p: &'a String) -> Self {
        Target::Path(Path::new(p))
    }
}

impl<'a> From<&'a Template> for Target<'a> {
    fn from(t: &'a Template) -> Self {
        Target::Template(t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Click {
    pub button: MouseButton,
    pub clicks: u32,
    /// Pause between successive clicks.
    pub interval: Duration,
}

impl Default for Click {
    fn default() -> Self {
        Self {
            button: MouseButton::Left,
            clicks: 1,
            interval: Duration::ZERO,
        }
    }
}

impl Click {
    pub fn right() -> Self {
        Self {
            button: MouseButton::Right,
            ..Self::default()
        }
    }

    pub fn double() -> Self {
        Self {
            clicks: 2,
            ..Self::default()
        }
    }
}

// ----------

/// The action layer: a frame source for aiming, an input driver for acting,
/// and the fail-safe that stands between them.
pub struct Pilot<S, D> {
    engine: Engine<S>,
    driver: Mutex<D>,
    held: HeldKeys,
    failsafe: Arc<FailSafe>,
    search: SearchConfig,
    timing: Timing,
}

impl<S: FrameSource, D: InputDriver> Pilot<S, D> {
    pub fn new(source: S, driver: D, failsafe: Arc<FailSafe>) -> Self {
        Self {
            engine: Engine::new(source),
            driver: Mutex::new(driver),
            held: HeldKeys::new(),
            failsafe,
            search: SearchConfig::default(),
            timing: Timing::default(),
        }
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Share an externally fed key tracker (e.g. a global keyboard hook).
    pub fn with_held_keys(mut self, held: HeldKeys) -> Self {
        self.held = held;
        self
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    pub fn failsafe(&self) -> &FailSafe {
        &self.failsafe
    }

    pub fn held_keys(&self) -> &HeldKeys {
        &self.held
    }

    pub fn search_config(&self) -> &SearchConfig {
        &self.search
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Restrict searches and image-targeted actions to `region`.
    pub fn within(&self, region: Region) -> Scope<'_, S, D> {
        Scope { pilot: self, region }
    }

    fn driver(&self) -> MutexGuard<'_, D> {
        match self.driver.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn guard(&self) -> Result<()> {
        self.failsafe.check(self)
    }

    /// Run arbitrary caller code behind the fail-safe.
    pub fn guarded<T>(&self, action: impl FnOnce() -> Result<T>) -> Result<T> {
        self.failsafe.guarded(self, action)
    }

    fn settle(&self) {
        let pause = self.timing.pause();
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
    }

    // ---------- search

    pub fn exist<'a>(&self, needle: impl Into<Needle<'a>>, region: Option<Region>) -> Result<Option<MatchResult>> {
        Ok(self.engine.exist(needle, region, &self.search, None)?)
    }

    /// Poll until found or the configured search time runs out.
    pub fn find<'a>(&self, needle: impl Into<Needle<'a>>, region: Option<Region>) -> Result<Option<MatchResult>> {
        Ok(self.engine.wait_for(needle, region, &self.search)?)
    }

    pub fn has<'a>(&self, needle: impl Into<Needle<'a>>, region: Option<Region>) -> Result<bool> {
        Ok(self.find(needle, region)?.is_some())
    }

    pub fn wait<'a>(&self, needle: impl Into<Needle<'a>>, region: Option<Region>) -> Result<MatchResult> {
        Ok(self.engine.wait(needle, region, &self.search)?)
    }

    pub fn find_any(&self, needles: &[Needle<'_>], region: Option<Region>) -> Result<Vec<Option<MatchResult>>> {
        Ok(self.engine.find_any(needles, region, &self.search)?)
    }

    pub fn pixel(&self, x: i32, y: i32) -> Result<Color> {
        Ok(self.engine.pixel(x, y)?)
    }

    /// Screen coordinates for `target`, searching if it's an image.
    pub fn resolve<'a>(&self, target: impl Into<Target<'a>>, region: Option<Region>) -> Result<Point> {
        let needle = match target.into() {
            Target::Point(p) => return Ok(p),
            Target::Path(p) => Needle::Path(p),
            Target::Template(t) => Needle::Template(t),
        };
        Ok(self.engine.wait(needle, region, &self.search)?.target())
    }

    // ---------- primitives

    fn move_pointer(&self, to: Point) -> Result<()> {
        let duration = self.timing.move_duration();
        let steps = self.timing.mouse_move_steps.max(1);
        if duration.is_zero() || steps == 1 {
            self.guard()?;
            return self.driver().move_to(to);
        }

        let from = self.driver().pointer().unwrap_or(to);
        let pause = duration / steps;
        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            let at = Point::new(
                from.x + ((to.x - from.x) as f64 * t).round() as i32,
                from.y + ((to.y - from.y) as f64 * t).round() as i32,
            );
            self.guard()?;
            self.driver().move_to(at)?;
            if i < steps {
                std::thread::sleep(pause);
            }
        }
        Ok(())
    }

    fn press_button(&self, button: MouseButton, press: Press) -> Result<()> {
        self.guard()?;
        self.driver().button(button, press)
    }

    fn press_key(&self, key: Key, press: Press) -> Result<()> {
        let key = key.checked()?;
        self.guard()?;
        self.driver().key(key, press)?;
        match press {
            Press::Down => self.held.press(key),
            Press::Up => self.held.release(key),
            Press::Click => {}
        }
        Ok(())
    }

    /// Release without consulting the guard, for unwinding a partial chord.
    fn release_unguarded(&self, keys: &[Key]) {
        for &key in keys.iter().rev() {
            if let Err(err) = self.driver().key(key, Press::Up) {
                tracing::warn!(error = %err, %key, "failed to release key");
            }
            self.held.release(key);
        }
    }

    fn release_button_unguarded(&self, button: MouseButton) {
        if let Err(err) = self.driver().button(button, Press::Up) {
            tracing::warn!(error = %err, ?button, "failed to release button");
        }
    }

    // ---------- mouse

    pub fn click<'a>(&self, target: impl Into<Target<'a>>) -> Result<()> {
        self.click_in(target.into(), None, Click::default())
    }

    pub fn right_click<'a>(&self, target: impl Into<Target<'a>>) -> Result<()> {
        self.click_in(target.into(), None, Click::right())
    }

    pub fn double_click<'a>(&self, target: impl Into<Target<'a>>) -> Result<()> {
        self.click_in(target.into(), None, Click::double())
    }

    pub fn click_with<'a>(&self, target: impl Into<Target<'a>>, click: Click) -> Result<()> {
        self.click_in(target.into(), None, click)
    }

    fn click_in(&self, target: Target<'_>, region: Option<Region>, click: Click) -> Result<()> {
        let at = self.resolve(target, region)?;
        tracing::debug!(x = at.x, y = at.y, button = ?click.button, clicks = click.clicks, "click");
        self.move_pointer(at)?;
        let interval = self.timing.interval(click.interval);
        for i in 0..click.clicks {
            if i > 0 {
                std::thread::sleep(interval);
            }
            self.press_button(click.button, Press::Click)?;
        }
        self.settle();
        Ok(())
    }

    /// Press `button`, first moving to `target` if given.
    pub fn mouse_down<'a>(&self, target: Option<Target<'a>>, button: MouseButton) -> Result<()> {
        if let Some(target) = target {
            let at = self.resolve(target, None)?;
            self.move_pointer(at)?;
        }
        tracing::debug!(?button, "mouse down");
        self.press_button(button, Press::Down)?;
        self.settle();
        Ok(())
    }

    pub fn mouse_up<'a>(&self, target: Option<Target<'a>>, button: MouseButton) -> Result<()> {
        if let Some(target) = target {
            let at = self.resolve(target, None)?;
            self.move_pointer(at)?;
        }
        tracing::debug!(?button, "mouse up");
        self.press_button(button, Press::Up)?;
        self.settle();
        Ok(())
    }

    pub fn mouse_move<'a>(&self, target: impl Into<Target<'a>>) -> Result<()> {
        let at = self.resolve(target, None)?;
        tracing::debug!(x = at.x, y = at.y, "mouse move");
        self.move_pointer(at)?;
        self.settle();
        Ok(())
    }

    pub fn mouse_move_relative(&self, dx: i32, dy: i32) -> Result<()> {
        tracing::debug!(dx, dy, "mouse move relative");
        self.guard()?;
        self.driver().move_by(dx, dy)?;
        self.settle();
        Ok(())
    }

    /// Both ends are resolved before the button goes down.
    pub fn drag_drop<'a, 'b>(
        &self,
        from: impl Into<Target<'a>>,
        to: impl Into<Target<'b>>,
        button: MouseButton,
    ) -> Result<()> {
        let from = self.resolve(from, None)?;
        let to = self.resolve(to, None)?;
        tracing::debug!(from = ?from, to = ?to, ?button, "drag");
        self.move_pointer(from)?;
        self.press_button(button, Press::Down)?;
        let dropped = self
            .move_pointer(to)
            .and_then(|()| self.press_button(button, Press::Up));
        if let Err(err) = dropped {
            self.release_button_unguarded(button);
            return Err(err);
        }
        self.settle();
        Ok(())
    }

    /// Scroll `clicks` notches (positive is down), at `target` if given.
    pub fn scroll<'a>(&self, clicks: i32, target: Option<Target<'a>>) -> Result<()> {
        if let Some(target) = target {
            let at = self.resolve(target, None)?;
            self.move_pointer(at)?;
        }
        tracing::debug!(clicks, "scroll");
        self.guard()?;
        self.driver().scroll(clicks)?;
        self.settle();
        Ok(())
    }

    // ---------- keyboard

    /// Press and release `key` `presses` times.
    pub fn tap(&self, key: Key, presses: u32, interval: Duration) -> Result<()> {
        tracing::debug!(%key, presses, "tap");
        let interval = self.timing.interval(interval);
        let step = self.timing.key_time_step();
        for i in 0..presses {
            if i > 0 {
                std::thread::sleep(interval);
            }
            self.press_key(key, Press::Down)?;
            if !step.is_zero() {
                std::thread::sleep(step);
            }
            self.press_key(key, Press::Up)?;
        }
        self.settle();
        Ok(())
    }

    /// Press `keys` in order, then release them in reverse.
    ///
    /// If the guard trips mid-chord, keys already down are released.
    pub fn hotkey(&self, keys: &[Key], interval: Duration) -> Result<()> {
        tracing::debug!(?keys, "hotkey");
        let keys = keys.iter().map(|k| k.checked()).collect::<Result<Vec<_>>>()?;
        let interval = self.timing.interval(interval);
        for (i, &key) in keys.iter().enumerate() {
            if let Err(err) = self.press_key(key, Press::Down) {
                self.release_unguarded(&keys[..i]);
                return Err(err);
            }
            std::thread::sleep(interval);
        }
        for (i, &key) in keys.iter().enumerate().rev() {
            if let Err(err) = self.press_key(key, Press::Up) {
                self.release_unguarded(&keys[..=i]);
                return Err(err);
            }
            std::thread::sleep(interval);
        }
        self.settle();
        Ok(())
    }

    pub fn key_down(&self, key: Key) -> Result<()> {
        tracing::debug!(%key, "key down");
        self.press_key(key, Press::Down)?;
        self.settle();
        Ok(())
    }

    pub fn key_up(&self, key: Key) -> Result<()> {
        tracing::debug!(%key, "key up");
        self.press_key(key, Press::Up)?;
        self.settle();
        Ok(())
    }

    /// Type `text` as-is.
    pub fn write(&self, text: &str) -> Result<()> {
        tracing::debug!(len = text.chars().count(), "write");
        self.guard()?;
        self.driver().text(text)?;
        self.settle();
        Ok(())
    }
}

impl<S: FrameSource, D: InputDriver> KeyStateObserver for Pilot<S, D> {
    fn held_keys(&self) -> std::collections::HashSet<Key> {
        self.held.snapshot()
    }

    fn pointer_position(&self) -> Option<Point> {
        match self.driver().pointer() {
            Ok(p) => Some(p),
            Err(err) => {
                tracing::warn!(error = %err, "pointer position unavailable");
                None
            }
        }
    }
}

// ----------

/// A screen region bound to a [`Pilot`].
pub struct Scope<'p, S, D> {
    pilot: &'p Pilot<S, D>,
    region: Region,
}

impl<S: FrameSource, D: InputDriver> Scope<'_, S, D> {
    pub fn region(&self) -> Region {
        self.region
    }

    pub fn exist<'a>(&self, needle: impl Into<Needle<'a>>) -> Result<Option<MatchResult>> {
        self.pilot.exist(needle, Some(self.region))
    }

    pub fn find<'a>(&self, needle: impl Into<Needle<'a>>) -> Result<Option<MatchResult>> {
        self.pilot.find(needle, Some(self.region))
    }

    pub fn has<'a>(&self, needle: impl Into<Needle<'a>>) -> Result<bool> {
        self.pilot.has(needle, Some(self.region))
    }

    pub fn wait<'a>(&self, needle: impl Into<Needle<'a>>) -> Result<MatchResult> {
        self.pilot.wait(needle, Some(self.region))
    }

    pub fn find_any(&self, needles: &[Needle<'_>]) -> Result<Vec<Option<MatchResult>>> {
        self.pilot.find_any(needles, Some(self.region))
    }

    pub fn count<'a>(&self, needle: impl Into<Needle<'a>>) -> Result<usize> {
        Ok(self.pilot.engine.count(needle, Some(self.region), &self.pilot.search)?)
    }

    pub fn click<'a>(&self, target: impl Into<Target<'a>>) -> Result<()> {
        self.pilot.click_in(target.into(), Some(self.region), Click::default())
    }

    pub fn right_click<'a>(&self, target: impl Into<Target<'a>>) -> Result<()> {
        self.pilot.click_in(target.into(), Some(self.region), Click::right())
    }

    pub fn click_with<'a>(&self, target: impl Into<Target<'a>>, click: Click) -> Result<()> {
        self.pilot.click_in(target.into(), Some(self.region), click)
    }
}
