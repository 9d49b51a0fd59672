//! Task spawning primitives shared across tether crates.
//!
//! Every background task (scope watchers, deadline timers, blocking driver
//! calls) is routed through [`spawn`] or [`spawn_blocking`] so that it is
//! tagged with a [`TaskClass`] and lands on a live tokio runtime even when the
//! caller is not running inside one.

mod class;
mod panic;
mod spawn;

pub use class::TaskClass;
pub use panic::join_error_panic_message;
pub use spawn::{spawn, spawn_blocking};
