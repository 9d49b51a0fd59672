//! Merging two independently owned scopes into one.
//!
//! A [`MergedScope`] completes as soon as either parent completes, records
//! the cause of whichever parent fired first and reports the earlier of the
//! two deadlines. Values come from the secondary parent only: the primary is
//! a lifetime source, never a value source. Callers typically merge a
//! per-request scope (primary) with a provider-owned shutdown or timeout
//! scope (secondary) and hand the result to a blocking driver call.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use tether_worker::TaskClass;
use tokio::time::Instant;

use crate::{Completion, Scope, ScopeError, ScopeValue, Terminal};

/// Watcher configuration for [`merge_with`].
#[derive(Debug, Clone)]
pub struct MergeSpec {
	pub(crate) label: Cow<'static, str>,
	pub(crate) class: TaskClass,
}

impl MergeSpec {
	/// Creates a spec whose traces carry `label`.
	pub fn new(label: impl Into<Cow<'static, str>>) -> Self {
		Self {
			label: label.into(),
			class: TaskClass::Background,
		}
	}

	/// Sets the watcher task class.
	#[must_use]
	pub fn class(mut self, class: TaskClass) -> Self {
		self.class = class;
		self
	}
}

impl Default for MergeSpec {
	fn default() -> Self {
		Self::new("merged")
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
	Primary,
	Secondary,
}

impl Parent {
	const fn as_str(self) -> &'static str {
		match self {
			Self::Primary => "primary",
			Self::Secondary => "secondary",
		}
	}
}

/// Detaches the merged scope once the last handle is gone, retiring the watcher.
struct DetachGuard {
	label: Cow<'static, str>,
	terminal: Arc<Terminal>,
}

impl Drop for DetachGuard {
	fn drop(&mut self) {
		if self.terminal.complete(ScopeError::Detached) {
			tracing::debug!(scope = %self.label, "scope.merge.detached");
		}
	}
}

/// Scope derived from a primary and a secondary parent.
///
/// Cloning shares the scope. When every clone has been dropped the scope is
/// detached, which completes it with [`ScopeError::Detached`] without
/// touching either parent.
pub struct MergedScope<P, S> {
	primary: Arc<P>,
	secondary: Arc<S>,
	terminal: Arc<Terminal>,
	guard: Arc<DetachGuard>,
}

impl<P, S> Clone for MergedScope<P, S> {
	fn clone(&self) -> Self {
		Self {
			primary: Arc::clone(&self.primary),
			secondary: Arc::clone(&self.secondary),
			terminal: Arc::clone(&self.terminal),
			guard: Arc::clone(&self.guard),
		}
	}
}

impl<P, S> MergedScope<P, S> {
	/// Trace label given at construction.
	pub fn label(&self) -> &str {
		&self.guard.label
	}

	/// The lifetime-only parent.
	pub fn primary(&self) -> &P {
		&self.primary
	}

	/// The parent that also supplies values.
	pub fn secondary(&self) -> &S {
		&self.secondary
	}

	/// Completes this scope with [`ScopeError::Detached`] and retires its watcher.
	///
	/// Returns `false` if the scope had already completed.
	pub fn detach(&self) -> bool {
		let detached = self.terminal.complete(ScopeError::Detached);
		if detached {
			tracing::debug!(scope = %self.label(), "scope.merge.detached");
		}
		detached
	}

	/// Completes this scope with a caller-supplied cause, independently of
	/// either parent.
	///
	/// Returns `false` if the scope had already completed.
	pub fn complete_with(&self, cause: ScopeError) -> bool {
		let completed = self.terminal.complete(cause);
		if completed {
			tracing::debug!(scope = %self.label(), "scope.merge.forced");
		}
		completed
	}
}

impl<P: Scope, S: Scope> Scope for MergedScope<P, S> {
	fn completion(&self) -> Completion {
		self.terminal.completion()
	}

	fn cause(&self) -> Option<ScopeError> {
		self.terminal.cause()
	}

	fn deadline(&self) -> Option<Instant> {
		earliest(self.primary.deadline(), self.secondary.deadline())
	}

	fn lookup(&self, key: &str) -> Option<ScopeValue> {
		self.secondary.lookup(key)
	}
}

impl<P, S> fmt::Debug for MergedScope<P, S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MergedScope")
			.field("label", &self.guard.label)
			.field("cause", &self.terminal.cause())
			.finish_non_exhaustive()
	}
}

pub(crate) fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
	match (a, b) {
		(None, None) => None,
		(Some(at), None) | (None, Some(at)) => Some(at),
		(Some(a), Some(b)) => Some(a.min(b)),
	}
}

/// Merges two scopes with the default [`MergeSpec`].
pub fn merge<P, S>(primary: P, secondary: S) -> MergedScope<P, S>
where
	P: Scope + 'static,
	S: Scope + 'static,
{
	merge_with(MergeSpec::default(), primary, secondary)
}

/// Merges two scopes.
///
/// Returns immediately. If a parent has already completed, the merged scope
/// is settled before returning (primary checked first); otherwise one
/// watcher task is spawned to wait for whichever parent fires first.
pub fn merge_with<P, S>(spec: MergeSpec, primary: P, secondary: S) -> MergedScope<P, S>
where
	P: Scope + 'static,
	S: Scope + 'static,
{
	let terminal = Arc::new(Terminal::new());
	let scope = MergedScope {
		primary: Arc::new(primary),
		secondary: Arc::new(secondary),
		terminal: Arc::clone(&terminal),
		guard: Arc::new(DetachGuard {
			label: spec.label.clone(),
			terminal: Arc::clone(&terminal),
		}),
	};

	let settled = if scope.primary.completion().is_fired() {
		Some((Parent::Primary, scope.primary.cause()))
	} else if scope.secondary.completion().is_fired() {
		Some((Parent::Secondary, scope.secondary.cause()))
	} else {
		None
	};
	if let Some((parent, cause)) = settled {
		settle(&terminal, &spec.label, parent, cause);
		return scope;
	}

	tracing::trace!(scope = %spec.label, worker_class = spec.class.as_str(), "scope.merge.spawn_watcher");
	tether_worker::spawn(
		spec.class,
		watch(Arc::clone(&scope.primary), Arc::clone(&scope.secondary), terminal, spec.label),
	);
	scope
}

/// Waits for the first of: primary fired, secondary fired, or the merged
/// scope itself completed by another path.
async fn watch<P, S>(primary: Arc<P>, secondary: Arc<S>, terminal: Arc<Terminal>, label: Cow<'static, str>)
where
	P: Scope,
	S: Scope,
{
	let own = terminal.completion();
	let primary_done = primary.completion();
	let secondary_done = secondary.completion();

	let (parent, cause) = tokio::select! {
		_ = own.fired() => {
			tracing::trace!(scope = %label, "scope.merge.watcher_exit");
			return;
		}
		_ = primary_done.fired() => (Parent::Primary, primary.cause()),
		_ = secondary_done.fired() => (Parent::Secondary, secondary.cause()),
	};
	settle(&terminal, &label, parent, cause);
}

fn settle(terminal: &Terminal, label: &str, parent: Parent, cause: Option<ScopeError>) {
	// A parent that fired without recording a cause is reported as cancelled.
	let cause = cause.unwrap_or(ScopeError::Cancelled);
	let shown = cause.to_string();
	if terminal.complete(cause) {
		tracing::debug!(scope = %label, parent = parent.as_str(), cause = %shown, "scope.merge.settled");
	}
}
