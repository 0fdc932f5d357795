//! Desktop automation on top of [`ie`]: find things on screen, then click and
//! type at them, with a fail-safe the user can always pull.

mod action;
pub use action::*;
mod capture;
pub use capture::*;
mod config;
pub use config::*;
mod error;
pub use error::*;
mod keys;
pub use keys::*;

pub mod failsafe;
pub use failsafe::{FailSafe, FailSafeState, KeyStateObserver, Trigger};
pub mod input;
pub use input::{EnigoDriver, HeldKeys, InputDriver, MouseButton};

use ie::FrameSource;

/// Install the `RUST_LOG`-driven tracing subscriber.
pub fn init_logging() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.try_init();
}

/// A [`Pilot`] driving the real screen, mouse and keyboard.
///
/// Configures the process-wide fail-safe: `config.failsafe` if set, otherwise
/// the primary display's corners plus the platform hotkey.
pub fn connect(config: &Config) -> Result<Pilot<ScreenSource, EnigoDriver>> {
	let source = ScreenSource::new();
	let state = match &config.failsafe {
		Some(state) => state.clone(),
		None => FailSafeState::for_display(source.display()?)?,
	};
	let guard = failsafe::global();
	guard.configure(state);

	Ok(Pilot::new(source, EnigoDriver::new()?, guard)
		.with_search(config.search.clone())
		.with_timing(config.timing.clone()))
}
