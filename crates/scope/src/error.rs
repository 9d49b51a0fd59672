//! Terminal causes recorded when a scope completes.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Why a scope ended.
///
/// Causes are copied verbatim when they cross a merge: an [`ScopeError::Other`]
/// observed on a merged scope shares its allocation with the parent that
/// recorded it.
#[derive(Debug, Clone, Error)]
pub enum ScopeError {
	/// The scope was cancelled by its owner.
	#[error("scope cancelled")]
	Cancelled,
	/// The scope's deadline elapsed.
	#[error("deadline exceeded")]
	DeadlineExceeded,
	/// A merged scope was torn down independently of its parents.
	#[error("scope detached")]
	Detached,
	/// Caller-supplied cause.
	#[error("{0}")]
	Other(Arc<dyn StdError + Send + Sync>),
}

impl ScopeError {
	/// Wraps an arbitrary error as a caller-supplied cause.
	pub fn other(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
		Self::Other(Arc::from(err.into()))
	}

	/// Returns true for [`ScopeError::DeadlineExceeded`].
	pub fn is_deadline_exceeded(&self) -> bool {
		matches!(self, Self::DeadlineExceeded)
	}
}

/// `Other` causes compare by identity, every other variant by kind.
impl PartialEq for ScopeError {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Cancelled, Self::Cancelled) | (Self::DeadlineExceeded, Self::DeadlineExceeded) | (Self::Detached, Self::Detached) => true,
			(Self::Other(a), Self::Other(b)) => Arc::ptr_eq(a, b),
			_ => false,
		}
	}
}

impl Eq for ScopeError {}

/// Failure of an operation run under [`crate::bound`] or [`crate::bound_blocking`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundError {
	/// The scope completed before the operation did.
	#[error("operation aborted: {0}")]
	Terminated(#[from] ScopeError),
	/// The blocking operation panicked on its worker thread.
	#[error("operation panicked: {0}")]
	Panicked(String),
	/// The blocking operation was dropped by its runtime before finishing.
	#[error("operation join failed: {0}")]
	JoinFailed(String),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn other_causes_compare_by_identity() {
		let cause = ScopeError::other("connection reset");
		let same = cause.clone();
		let lookalike = ScopeError::other("connection reset");

		assert_eq!(cause, same);
		assert_ne!(cause, lookalike);
		assert_eq!(cause.to_string(), "connection reset");
	}

	#[test]
	fn display_matches_kind() {
		assert_eq!(ScopeError::DeadlineExceeded.to_string(), "deadline exceeded");
		assert_eq!(ScopeError::Detached.to_string(), "scope detached");
		assert_eq!(BoundError::from(ScopeError::Cancelled).to_string(), "operation aborted: scope cancelled");
	}
}
