use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tether_worker::TaskClass;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Completion, Scope, ScopeError, ScopeValue, Terminal};

/// Builder for a [`CancelScope`].
#[derive(Default)]
pub struct ScopeSpec {
	deadline: Option<Instant>,
	values: HashMap<String, ScopeValue>,
	class: TaskClass,
}

impl ScopeSpec {
	/// Creates a spec with no deadline and no values.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the deadline. The earlier deadline wins when called repeatedly.
	#[must_use]
	pub fn deadline(mut self, at: Instant) -> Self {
		self.deadline = Some(self.deadline.map_or(at, |current| current.min(at)));
		self
	}

	/// Sets the deadline relative to now. A timeout too large to represent
	/// leaves the scope without a deadline.
	#[must_use]
	pub fn timeout(self, timeout: Duration) -> Self {
		match Instant::now().checked_add(timeout) {
			Some(at) => self.deadline(at),
			None => self,
		}
	}

	/// Stores `value` under `key`, replacing any earlier value for that key.
	#[must_use]
	pub fn value(mut self, key: impl Into<String>, value: impl Any + Send + Sync) -> Self {
		self.values.insert(key.into(), Arc::new(value));
		self
	}

	/// Task class of the deadline timer.
	#[must_use]
	pub fn class(mut self, class: TaskClass) -> Self {
		self.class = class;
		self
	}

	/// Builds the scope, arming the deadline timer when a deadline is set.
	pub fn build(self) -> CancelScope {
		let inner = Arc::new(CancelInner {
			terminal: Terminal::new(),
			deadline: self.deadline,
			values: self.values,
			timer: CancellationToken::new(),
		});

		if let Some(at) = self.deadline {
			if at <= Instant::now() {
				inner.terminal.complete(ScopeError::DeadlineExceeded);
			} else {
				tether_worker::spawn(
					self.class,
					expire_at(at, Arc::downgrade(&inner), inner.terminal.completion(), inner.timer.clone()),
				);
			}
		}

		CancelScope { inner }
	}
}

struct CancelInner {
	terminal: Terminal,
	deadline: Option<Instant>,
	values: HashMap<String, ScopeValue>,
	/// Retires the deadline timer once the last handle is gone.
	timer: CancellationToken,
}

impl Drop for CancelInner {
	fn drop(&mut self) {
		self.timer.cancel();
	}
}

async fn expire_at(at: Instant, inner: Weak<CancelInner>, completion: Completion, dropped: CancellationToken) {
	tokio::select! {
		_ = completion.fired() => {}
		_ = dropped.cancelled() => {}
		_ = tokio::time::sleep_until(at) => {
			if let Some(inner) = inner.upgrade()
				&& inner.terminal.complete(ScopeError::DeadlineExceeded)
			{
				tracing::debug!("scope.deadline.elapsed");
			}
		}
	}
}

/// Cancellable scope owned by the code that creates it.
///
/// Completes when [`CancelScope::cancel`] or [`CancelScope::cancel_with`] is
/// called, or when its deadline elapses. Clones share the same scope.
#[derive(Clone)]
pub struct CancelScope {
	inner: Arc<CancelInner>,
}

impl Default for CancelScope {
	fn default() -> Self {
		Self::new()
	}
}

impl CancelScope {
	/// Creates a scope with no deadline and no values.
	pub fn new() -> Self {
		ScopeSpec::new().build()
	}

	/// Creates a scope that completes with [`ScopeError::DeadlineExceeded`] at `at`.
	pub fn with_deadline(at: Instant) -> Self {
		ScopeSpec::new().deadline(at).build()
	}

	/// Creates a scope that completes with [`ScopeError::DeadlineExceeded`] after `timeout`.
	pub fn with_timeout(timeout: Duration) -> Self {
		ScopeSpec::new().timeout(timeout).build()
	}

	/// Completes the scope with [`ScopeError::Cancelled`].
	///
	/// Returns `false` if the scope had already completed.
	pub fn cancel(&self) -> bool {
		self.cancel_with(ScopeError::Cancelled)
	}

	/// Completes the scope with `cause`.
	///
	/// Returns `false` if the scope had already completed.
	pub fn cancel_with(&self, cause: ScopeError) -> bool {
		let completed = self.inner.terminal.complete(cause);
		if completed {
			tracing::debug!(cause = %self.inner.terminal.cause().unwrap_or(ScopeError::Cancelled), "scope.cancel");
		}
		completed
	}
}

impl Scope for CancelScope {
	fn completion(&self) -> Completion {
		self.inner.terminal.completion()
	}

	fn cause(&self) -> Option<ScopeError> {
		self.inner.terminal.cause()
	}

	fn deadline(&self) -> Option<Instant> {
		self.inner.deadline
	}

	fn lookup(&self, key: &str) -> Option<ScopeValue> {
		self.inner.values.get(key).cloned()
	}
}

impl fmt::Debug for CancelScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut keys: Vec<_> = self.inner.values.keys().collect();
		keys.sort();
		f.debug_struct("CancelScope")
			.field("deadline", &self.inner.deadline)
			.field("cause", &self.inner.terminal.cause())
			.field("keys", &keys)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::ScopeExt;

	#[tokio::test]
	async fn cancel_is_first_writer_wins() {
		let scope = CancelScope::new();
		assert_eq!(scope.cause(), None);
		assert!(scope.cancel());
		assert!(!scope.cancel_with(ScopeError::Detached));
		assert_eq!(scope.cause(), Some(ScopeError::Cancelled));
	}

	#[tokio::test(start_paused = true)]
	async fn deadline_fires_with_deadline_exceeded() {
		let start = Instant::now();
		let scope = CancelScope::with_timeout(Duration::from_secs(3));
		assert_eq!(scope.deadline(), Some(start + Duration::from_secs(3)));

		let cause = scope.terminated().await;
		assert_eq!(cause, ScopeError::DeadlineExceeded);
		assert!(start.elapsed() >= Duration::from_secs(3));
	}

	#[tokio::test]
	async fn past_deadline_completes_at_build() {
		let scope = CancelScope::with_deadline(Instant::now());
		assert!(scope.is_completed());
		assert_eq!(scope.cause(), Some(ScopeError::DeadlineExceeded));
	}

	#[tokio::test(start_paused = true)]
	async fn cancel_before_deadline_keeps_cancel_cause() {
		let scope = CancelScope::with_timeout(Duration::from_secs(1));
		scope.cancel();
		tokio::time::sleep(Duration::from_secs(2)).await;
		assert_eq!(scope.cause(), Some(ScopeError::Cancelled));
	}

	#[tokio::test(start_paused = true)]
	async fn remaining_counts_down_and_saturates() {
		let scope = CancelScope::with_timeout(Duration::from_secs(10));
		tokio::time::sleep(Duration::from_secs(4)).await;
		let left = scope.remaining().expect("scope has a deadline");
		assert!(left <= Duration::from_secs(6) && left > Duration::from_millis(5900), "remaining {left:?}");

		tokio::time::sleep(Duration::from_secs(20)).await;
		assert_eq!(scope.remaining(), Some(Duration::ZERO));
		assert!(CancelScope::new().remaining().is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn dropped_scopes_retire_their_timers() {
		let metrics = tokio::runtime::Handle::current().metrics();
		let before = metrics.num_alive_tasks();

		let scopes: Vec<_> = (0..1000).map(|_| CancelScope::with_timeout(Duration::from_secs(3600))).collect();
		tokio::task::yield_now().await;
		assert_eq!(metrics.num_alive_tasks(), before + 1000);

		let survivor = scopes[0].clone();
		drop(scopes);
		tokio::time::sleep(Duration::from_millis(100)).await;

		assert_eq!(metrics.num_alive_tasks(), before + 1, "only the surviving scope keeps a timer");
		assert!(!survivor.is_completed());
		drop(survivor);
		tokio::time::sleep(Duration::from_millis(100)).await;
		assert_eq!(metrics.num_alive_tasks(), before);
	}

	#[tokio::test]
	async fn unrepresentable_timeout_means_no_deadline() {
		let scope = CancelScope::with_timeout(Duration::MAX);
		assert_eq!(scope.deadline(), None);
		assert!(!scope.is_completed());
	}

	#[tokio::test]
	async fn earlier_deadline_wins_in_spec() {
		let now = Instant::now();
		let scope = ScopeSpec::new()
			.deadline(now + Duration::from_secs(10))
			.deadline(now + Duration::from_secs(4))
			.deadline(now + Duration::from_secs(7))
			.build();
		assert_eq!(scope.deadline(), Some(now + Duration::from_secs(4)));
	}

	#[tokio::test]
	async fn values_are_typed_and_keyed() {
		let scope = ScopeSpec::new().value("request_id", 42u64).value("tenant", String::from("acme")).build();

		assert_eq!(scope.value::<u64>("request_id").as_deref(), Some(&42));
		assert_eq!(scope.value::<String>("tenant").as_deref().map(String::as_str), Some("acme"));
		assert!(scope.value::<u32>("request_id").is_none());
		assert!(scope.lookup("missing").is_none());
	}
}
