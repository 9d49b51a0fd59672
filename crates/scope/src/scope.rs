use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::{Completion, ScopeError};

/// Value carried by a scope under a string key.
pub type ScopeValue = Arc<dyn Any + Send + Sync>;

/// Capability contract of a cancellable scope.
///
/// A scope has a one-shot completion signal, a terminal cause that appears
/// once the signal fires, an optional deadline and a set of keyed values.
/// Blocking work bounded by a scope should select on [`Scope::completion`]
/// and report [`Scope::cause`] when it aborts.
pub trait Scope: Send + Sync {
	/// Observer of the completion signal.
	fn completion(&self) -> Completion;

	/// Terminal cause; `None` until the completion signal has fired.
	fn cause(&self) -> Option<ScopeError>;

	/// Point in time by which the scope is expected to complete.
	fn deadline(&self) -> Option<Instant>;

	/// Value stored under `key`.
	fn lookup(&self, key: &str) -> Option<ScopeValue>;
}

impl<T: Scope + ?Sized> Scope for Arc<T> {
	fn completion(&self) -> Completion {
		(**self).completion()
	}

	fn cause(&self) -> Option<ScopeError> {
		(**self).cause()
	}

	fn deadline(&self) -> Option<Instant> {
		(**self).deadline()
	}

	fn lookup(&self, key: &str) -> Option<ScopeValue> {
		(**self).lookup(key)
	}
}

/// Convenience accessors available on every [`Scope`].
pub trait ScopeExt: Scope {
	/// Returns true once the completion signal has fired.
	fn is_completed(&self) -> bool {
		self.completion().is_fired()
	}

	/// Typed lookup; `None` when the key is missing or holds another type.
	fn value<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
		self.lookup(key)?.downcast::<T>().ok()
	}

	/// Time left until the deadline, saturating at zero.
	fn remaining(&self) -> Option<Duration> {
		self.deadline().map(|at| at.saturating_duration_since(Instant::now()))
	}

	/// Waits for completion and returns the recorded cause.
	fn terminated(&self) -> impl Future<Output = ScopeError> + Send + '_ {
		let completion = self.completion();
		async move {
			completion.fired().await;
			self.cause().unwrap_or(ScopeError::Cancelled)
		}
	}
}

impl<S: Scope + ?Sized> ScopeExt for S {}
