//! Keyboard key identifiers.
//!
//! Keys are named the way scripts and the config file spell them
//! (`"ctrl"`, `"shift"`, `"f5"`, `"a"`), and map onto `enigo` keys at the
//! injection boundary.

use std::fmt;
use std::str::FromStr;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    Alt,
    Control,
    Shift,
    Meta,
    Return,
    Escape,
    Tab,
    Space,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    CapsLock,
    F(u8),
    Char(char),
}

impl Key {
    /// Characters are case-folded so `'K'` and `'k'` name the same physical key.
    pub fn char(c: char) -> Self {
        Self::Char(c.to_ascii_lowercase())
    }

    /// Case-folded form. `Key::Char('K')` and `Key::char('K')` compare equal after this.
    pub fn normalized(self) -> Self {
        match self {
            Key::Char(c) => Key::char(c),
            key => key,
        }
    }

    /// Normalized key, or [`Error::UnknownKey`] for a function key outside `F1..=F12`.
    pub fn checked(self) -> Result<Self, Error> {
        match self {
            Key::F(n) if !(1..=12).contains(&n) => Err(Error::UnknownKey(self.to_string())),
            key => Ok(key.normalized()),
        }
    }

    pub(crate) fn to_enigo(self) -> Result<enigo::Key, Error> {
        use enigo::Key as E;
        Ok(match self.checked()? {
            Key::Alt => E::Alt,
            Key::Control => E::Control,
            Key::Shift => E::Shift,
            Key::Meta => E::Meta,
            Key::Return => E::Return,
            Key::Escape => E::Escape,
            Key::Tab => E::Tab,
            Key::Space => E::Space,
            Key::Backspace => E::Backspace,
            Key::Delete => E::Delete,
            Key::Up => E::UpArrow,
            Key::Down => E::DownArrow,
            Key::Left => E::LeftArrow,
            Key::Right => E::RightArrow,
            Key::Home => E::Home,
            Key::End => E::End,
            Key::PageUp => E::PageUp,
            Key::PageDown => E::PageDown,
            Key::CapsLock => E::CapsLock,
            Key::F(n) => match n {
                1 => E::F1,
                2 => E::F2,
                3 => E::F3,
                4 => E::F4,
                5 => E::F5,
                6 => E::F6,
                7 => E::F7,
                8 => E::F8,
                9 => E::F9,
                10 => E::F10,
                11 => E::F11,
                _ => E::F12,
            },
            Key::Char(c) => E::Unicode(c),
        })
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let key = match lower.as_str() {
            "alt" | "option" => Key::Alt,
            "ctrl" | "control" => Key::Control,
            "shift" => Key::Shift,
            "meta" | "win" | "cmd" | "command" | "super" => Key::Meta,
            "enter" | "return" => Key::Return,
            "esc" | "escape" => Key::Escape,
            "tab" => Key::Tab,
            "space" => Key::Space,
            "backspace" => Key::Backspace,
            "del" | "delete" => Key::Delete,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" | "pgup" => Key::PageUp,
            "pagedown" | "pgdn" => Key::PageDown,
            "capslock" => Key::CapsLock,
            f if f.len() > 1 && f.starts_with('f') => match f[1..].parse::<u8>() {
                Ok(n @ 1..=12) => Key::F(n),
                _ => return Err(Error::UnknownKey(s.to_string())),
            },
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::char(c),
                    _ if s == " " => Key::Space,
                    _ => return Err(Error::UnknownKey(s.to_string())),
                }
            }
        };
        Ok(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Key::Alt => "alt",
            Key::Control => "ctrl",
            Key::Shift => "shift",
            Key::Meta => "meta",
            Key::Return => "enter",
            Key::Escape => "esc",
            Key::Tab => "tab",
            Key::Space => "space",
            Key::Backspace => "backspace",
            Key::Delete => "delete",
            Key::Up => "up",
            Key::Down => "down",
            Key::Left => "left",
            Key::Right => "right",
            Key::Home => "home",
            Key::End => "end",
            Key::PageUp => "pageup",
            Key::PageDown => "pagedown",
            Key::CapsLock => "capslock",
            Key::F(n) => return write!(f, "f{n}"),
            Key::Char(c) => return write!(f, "{c}"),
        };
        f.write_str(name)
    }
}

impl TryFrom<String> for Key {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

impl From<char> for Key {
    fn from(c: char) -> Self {
        Key::char(c)
    }
}

/// Parse a combination such as `"ctrl+alt+k"`.
pub fn parse_combo(s: &str) -> Result<Vec<Key>, Error> {
    s.split('+').map(str::parse).collect()
}
