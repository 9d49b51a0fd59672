//! Runtime selection for spawned work.
//!
//! Scopes are often built from synchronous code (RPC handlers, resource CRUD
//! callbacks) that has no tokio context. Their watchers and deadline timers
//! still need somewhere to run, so work spawned outside a runtime lands on one
//! small process-wide runtime that is built on first use and never shut down.

use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::TaskClass;

/// Single worker thread: it only hosts watchers and timers, which park almost
/// all of the time, plus the blocking pool for driver calls.
fn fallback_runtime() -> &'static Runtime {
	static FALLBACK: OnceLock<Runtime> = OnceLock::new();
	FALLBACK.get_or_init(|| {
		Builder::new_multi_thread()
			.enable_all()
			.worker_threads(1)
			.thread_name("tether-worker")
			.build()
			.expect("failed to build tether-worker fallback runtime")
	})
}

fn target(class: TaskClass, kind: &'static str) -> Handle {
	match Handle::try_current() {
		Ok(handle) => {
			tracing::trace!(worker_class = class.as_str(), runtime = "ambient", "{kind}");
			handle
		}
		Err(_) => {
			tracing::trace!(worker_class = class.as_str(), runtime = "fallback", "{kind}");
			fallback_runtime().handle().clone()
		}
	}
}

/// Spawns an async task tagged with `class`.
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	target(class, "worker.spawn").spawn(fut)
}

/// Runs `f` on the blocking pool, tagged with `class`.
pub fn spawn_blocking<F, R>(class: TaskClass, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	target(class, "worker.spawn_blocking").spawn_blocking(f)
}
