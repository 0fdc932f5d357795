//! Fail-safe guard: abort automation when the user slams the pointer into a
//! screen corner or holds the panic hotkey.
//!
//! The guard is an owned [`FailSafe`] handed to whatever performs input.
//! [`global`] exists for the outermost composition layer only.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use ie::{Point, Region};

use crate::{Error, Key, Result};

/// Why the fail-safe fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Pointer(Point),
    Hotkey(Vec<Key>),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Pointer(p) => write!(f, "pointer moved to trigger point ({}, {})", p.x, p.y),
            Trigger::Hotkey(keys) => {
                let names: Vec<String> = keys.iter().map(Key::to_string).collect();
                write!(f, "hotkey {} held", names.join("+"))
            }
        }
    }
}

/// Default panic hotkey for the running platform.
pub fn default_hotkey() -> Vec<Key> {
    if cfg!(target_os = "macos") {
        vec![Key::Alt, Key::Shift, Key::Char('c')]
    } else {
        vec![Key::Control, Key::Alt, Key::Char('k')]
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct FailSafeState {
    pub enabled: bool,
    /// Normally 1x1 regions; the pointer anywhere inside one trips the guard.
    pub trigger_points: Vec<Region>,
    /// Every member must be held at once. Empty disables the hotkey condition.
    pub hotkey: Vec<Key>,
}

impl Default for FailSafeState {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_points: Vec::new(),
            hotkey: default_hotkey(),
        }
    }
}

impl FailSafeState {
    /// Armed, with the four corners of `display` as trigger points.
    pub fn for_display(display: Region) -> ie::Result<Self> {
        let trigger_points = display
            .corners()
            .into_iter()
            .map(|p| Region::point(p.x, p.y))
            .collect::<ie::Result<_>>()?;
        Ok(Self {
            trigger_points,
            ..Self::default()
        })
    }

    pub fn disarmed() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Evaluate both trip conditions against one observation.
    pub fn check(&self, pointer: Option<Point>, held: &HashSet<Key>) -> Result<(), Trigger> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(p) = pointer.filter(|p| self.trigger_points.iter().any(|r| r.contains(*p))) {
            return Err(Trigger::Pointer(p));
        }
        if !self.hotkey.is_empty() && self.hotkey.iter().all(|k| held.contains(&k.normalized())) {
            return Err(Trigger::Hotkey(self.hotkey.clone()));
        }
        Ok(())
    }
}

/// Live view of the user's input devices.
pub trait KeyStateObserver {
    fn held_keys(&self) -> HashSet<Key>;
    /// `None` when the position can't be read; the pointer condition is then skipped.
    fn pointer_position(&self) -> Option<Point>;
}

/// Shared, reconfigurable guard.
///
/// Checks read the current state under a read lock. Reconfiguration may race
/// with in-flight checks; a check sees either the old or the new state.
#[derive(Debug, Default)]
pub struct FailSafe {
    state: RwLock<FailSafeState>,
}

impl FailSafe {
    pub fn new(state: FailSafeState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn state(&self) -> FailSafeState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn configure(&self, state: FailSafeState) {
        tracing::info!(enabled = state.enabled, points = state.trigger_points.len(), "fail-safe configured");
        match self.state.write() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state();
        state.enabled = enabled;
        self.configure(state);
    }

    pub fn is_enabled(&self) -> bool {
        match self.state.read() {
            Ok(state) => state.enabled,
            Err(poisoned) => poisoned.into_inner().enabled,
        }
    }

    /// Fail with [`Error::Interrupt`] if the guard is armed and a condition holds.
    pub fn check(&self, observer: &dyn KeyStateObserver) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let pointer = observer.pointer_position();
        let held = observer.held_keys();
        let verdict = match self.state.read() {
            Ok(state) => state.check(pointer, &held),
            Err(poisoned) => poisoned.into_inner().check(pointer, &held),
        };
        verdict.map_err(|trigger| {
            tracing::error!(%trigger, "fail-safe triggered");
            Error::Interrupt(trigger)
        })
    }

    /// Run `action` only if the guard does not trip first.
    pub fn guarded<T>(&self, observer: &dyn KeyStateObserver, action: impl FnOnce() -> Result<T>) -> Result<T> {
        self.check(observer)?;
        action()
    }

    /// Wrap `action` so every call is preceded by a guard check.
    pub fn wrap<'a, A, T>(
        &'a self,
        observer: &'a dyn KeyStateObserver,
        action: impl Fn(A) -> Result<T> + 'a,
    ) -> impl Fn(A) -> Result<T> + 'a {
        move |arg| {
            self.check(observer)?;
            action(arg)
        }
    }
}

/// Process-wide guard. Armed with the default hotkey; callers that know the
/// display should [`FailSafe::configure`] corner trigger points.
pub fn global() -> Arc<FailSafe> {
    static GLOBAL: OnceLock<Arc<FailSafe>> = OnceLock::new();
    GLOBAL.get_or_init(|| Arc::new(FailSafe::default())).clone()
}
