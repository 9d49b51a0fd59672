use std::future::Future;

use tether_worker::{TaskClass, join_error_panic_message};

use crate::{BoundError, Scope, ScopeError};

fn terminal_cause<S: Scope + ?Sized>(scope: &S) -> ScopeError {
	scope.cause().unwrap_or(ScopeError::Cancelled)
}

/// Runs `fut` until it finishes or `scope` completes, whichever is first.
///
/// When both are ready the scope wins. A scope that has already completed
/// returns its cause without polling `fut`.
pub async fn bound<S, F>(scope: &S, fut: F) -> Result<F::Output, ScopeError>
where
	S: Scope + ?Sized,
	F: Future,
{
	let completion = scope.completion();
	if completion.is_fired() {
		return Err(terminal_cause(scope));
	}

	tokio::select! {
		biased;
		_ = completion.fired() => {
			let cause = terminal_cause(scope);
			tracing::trace!(cause = %cause, "scope.bound.aborted");
			Err(cause)
		}
		out = fut => Ok(out),
	}
}

/// Runs a synchronous call (typically a driver round trip) on the blocking
/// pool, bounded by `scope`.
///
/// The closure cannot be interrupted: when the scope wins, the closure keeps
/// running detached and its result is dropped.
pub async fn bound_blocking<S, F, R>(scope: &S, class: TaskClass, f: F) -> Result<R, BoundError>
where
	S: Scope + ?Sized,
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	if scope.completion().is_fired() {
		return Err(BoundError::Terminated(terminal_cause(scope)));
	}

	let handle = tether_worker::spawn_blocking(class, f);
	match bound(scope, handle).await? {
		Ok(out) => Ok(out),
		Err(err) if err.is_panic() => Err(BoundError::Panicked(join_error_panic_message(err).unwrap_or_default())),
		Err(err) => Err(BoundError::JoinFailed(err.to_string())),
	}
}
