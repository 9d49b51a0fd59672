use parking_lot::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::ScopeError;

/// One-shot broadcast signal marking the end of a scope.
///
/// Clones observe the same signal. Once fired it stays fired, and waiting on
/// it returns immediately. Only the owning [`Terminal`] can fire it.
#[derive(Debug, Clone, Default)]
pub struct Completion {
	token: CancellationToken,
}

impl Completion {
	/// Returns true once the signal has fired.
	pub fn is_fired(&self) -> bool {
		self.token.is_cancelled()
	}

	/// Waits until the signal fires.
	pub async fn fired(&self) {
		self.token.cancelled().await;
	}

	/// Owned variant of [`Self::fired`] for storing in structs or `select!` loops.
	pub fn into_fired(self) -> WaitForCancellationFutureOwned {
		self.token.cancelled_owned()
	}

	fn fire(&self) {
		self.token.cancel();
	}
}

/// Write-once terminal state backing a scope: the cause slot and its signal.
///
/// Implementors of [`crate::Scope`] embed one of these and forward
/// `completion`/`cause` to it.
#[derive(Debug, Default)]
pub struct Terminal {
	cause: Mutex<Option<ScopeError>>,
	completion: Completion,
}

impl Terminal {
	/// Creates a pending terminal state.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns an observer of the completion signal.
	pub fn completion(&self) -> Completion {
		self.completion.clone()
	}

	/// Returns true once [`Self::complete`] has succeeded.
	pub fn is_completed(&self) -> bool {
		self.completion.is_fired()
	}

	/// Returns the recorded cause, or `None` while pending.
	pub fn cause(&self) -> Option<ScopeError> {
		if !self.completion.is_fired() {
			return None;
		}
		self.cause.lock().clone()
	}

	/// Records `cause` and fires the completion signal.
	///
	/// The first caller wins; later calls leave the state untouched and
	/// return `false`. The signal is fired while the slot is held, so a
	/// `false` return implies the signal is already observable as fired.
	pub fn complete(&self, cause: ScopeError) -> bool {
		let mut slot = self.cause.lock();
		if slot.is_some() {
			return false;
		}
		*slot = Some(cause);
		self.completion.fire();
		true
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	use super::*;

	#[test]
	fn pending_terminal_reports_no_cause() {
		let terminal = Terminal::new();
		assert!(!terminal.is_completed());
		assert_eq!(terminal.cause(), None);
	}

	#[test]
	fn first_cause_wins() {
		let terminal = Terminal::new();
		assert!(terminal.complete(ScopeError::DeadlineExceeded));
		assert!(!terminal.complete(ScopeError::Cancelled));
		assert_eq!(terminal.cause(), Some(ScopeError::DeadlineExceeded));
		assert!(terminal.completion().is_fired());
	}

	#[test]
	fn racing_completers_settle_exactly_once() {
		let terminal = Arc::new(Terminal::new());
		let winners = Arc::new(AtomicUsize::new(0));

		let threads: Vec<_> = (0..8)
			.map(|i| {
				let terminal = Arc::clone(&terminal);
				let winners = Arc::clone(&winners);
				std::thread::spawn(move || {
					let cause = if i % 2 == 0 { ScopeError::Cancelled } else { ScopeError::DeadlineExceeded };
					if terminal.complete(cause) {
						winners.fetch_add(1, Ordering::SeqCst);
					}
				})
			})
			.collect();
		for thread in threads {
			thread.join().expect("completer thread panicked");
		}

		assert_eq!(winners.load(Ordering::SeqCst), 1);
		let settled = terminal.cause().expect("terminal should be completed");
		for _ in 0..16 {
			assert_eq!(terminal.cause().as_ref(), Some(&settled));
		}
	}

	#[tokio::test]
	async fn clones_observe_the_same_signal() {
		let terminal = Terminal::new();
		let observer = terminal.completion();
		let owned = terminal.completion().into_fired();

		terminal.complete(ScopeError::Cancelled);

		tokio::time::timeout(Duration::from_secs(1), observer.fired()).await.expect("observer should wake");
		tokio::time::timeout(Duration::from_secs(1), owned).await.expect("owned waiter should wake");
		assert!(observer.is_fired());
	}
}
