//! Cancellable scopes and the two-parent merge primitive.
//!
//! * [`Scope`]: capability contract (completion signal, cause, deadline, values)
//! * [`CancelScope`]: owner-cancelled scope with optional deadline and values
//! * [`merge`]: derives a scope that ends when either of two parents ends
//! * [`bound`] / [`bound_blocking`]: run an operation under a scope

#![warn(missing_docs)]

mod bound;
mod cancel;
mod completion;
mod error;
pub mod merge;
mod scope;

pub use bound::{bound, bound_blocking};
pub use cancel::{CancelScope, ScopeSpec};
pub use completion::{Completion, Terminal};
pub use error::{BoundError, ScopeError};
pub use merge::{MergeSpec, MergedScope, merge, merge_with};
pub use scope::{Scope, ScopeExt, ScopeValue};
pub use tether_worker::TaskClass;

#[cfg(test)]
use tracing_subscriber as _;
