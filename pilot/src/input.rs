//! Synthetic mouse and keyboard input.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use enigo::{Axis, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use ie::Point;

use crate::{Error, Key, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl FromStr for MouseButton {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "left" | "primary" => Ok(Self::Left),
            "right" | "secondary" => Ok(Self::Right),
            "middle" => Ok(Self::Middle),
            _ => Err(Error::UnknownKey(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Press {
    Down,
    Up,
    Click,
}

impl From<Press> for Direction {
    fn from(p: Press) -> Self {
        match p {
            Press::Down => Direction::Press,
            Press::Up => Direction::Release,
            Press::Click => Direction::Click,
        }
    }
}

/// Low-level input sink. Implementations perform the side effect and nothing else;
/// fail-safe checks happen in the caller.
pub trait InputDriver {
    /// Current pointer position in screen coordinates.
    fn pointer(&self) -> Result<Point>;
    fn move_to(&mut self, to: Point) -> Result<()>;
    fn move_by(&mut self, dx: i32, dy: i32) -> Result<()>;
    fn button(&mut self, button: MouseButton, press: Press) -> Result<()>;
    fn key(&mut self, key: Key, press: Press) -> Result<()>;
    fn text(&mut self, text: &str) -> Result<()>;
    /// Positive scrolls down.
    fn scroll(&mut self, clicks: i32) -> Result<()>;
}

/// The OS input backend.
pub struct EnigoDriver {
    enigo: Enigo,
}

impl EnigoDriver {
    pub fn new() -> Result<Self> {
        Ok(Self {
            enigo: Enigo::new(&Settings::default())?,
        })
    }
}

impl InputDriver for EnigoDriver {
    fn pointer(&self) -> Result<Point> {
        let (x, y) = self.enigo.location()?;
        Ok(Point::new(x, y))
    }

    fn move_to(&mut self, to: Point) -> Result<()> {
        Ok(self.enigo.move_mouse(to.x, to.y, Coordinate::Abs)?)
    }

    fn move_by(&mut self, dx: i32, dy: i32) -> Result<()> {
        Ok(self.enigo.move_mouse(dx, dy, Coordinate::Rel)?)
    }

    fn button(&mut self, button: MouseButton, press: Press) -> Result<()> {
        let button = match button {
            MouseButton::Left => enigo::Button::Left,
            MouseButton::Right => enigo::Button::Right,
            MouseButton::Middle => enigo::Button::Middle,
        };
        Ok(self.enigo.button(button, press.into())?)
    }

    fn key(&mut self, key: Key, press: Press) -> Result<()> {
        Ok(self.enigo.key(key.to_enigo()?, press.into())?)
    }

    fn text(&mut self, text: &str) -> Result<()> {
        Ok(self.enigo.text(text)?)
    }

    fn scroll(&mut self, clicks: i32) -> Result<()> {
        Ok(self.enigo.scroll(clicks, Axis::Vertical)?)
    }
}

/// Live set of keys currently held down, stored in [`Key::normalized`] form.
///
/// Fed by the action layer's own presses and releases, and by any external
/// keyboard hook the embedding program installs. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct HeldKeys(Arc<RwLock<HashSet<Key>>>);

impl HeldKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, key: Key) {
        self.write(|keys| {
            keys.insert(key.normalized());
        });
    }

    pub fn release(&self, key: Key) {
        self.write(|keys| {
            keys.remove(&key.normalized());
        });
    }

    pub fn clear(&self) {
        self.write(HashSet::clear);
    }

    pub fn snapshot(&self) -> HashSet<Key> {
        match self.0.read() {
            Ok(keys) => keys.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_held(&self, key: Key) -> bool {
        match self.0.read() {
            Ok(keys) => keys.contains(&key.normalized()),
            Err(poisoned) => poisoned.into_inner().contains(&key.normalized()),
        }
    }

    fn write(&self, f: impl FnOnce(&mut HashSet<Key>)) {
        match self.0.write() {
            Ok(mut keys) => f(&mut keys),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}
