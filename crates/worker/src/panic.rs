use std::any::Any;

use tokio::task::JoinError;

/// Extracts the panic message from a failed join.
///
/// Returns `None` when the task was cancelled rather than panicking.
pub fn join_error_panic_message(err: JoinError) -> Option<String> {
	if !err.is_panic() {
		return None;
	}
	Some(payload_message(err.into_panic()))
}

fn payload_message(payload: Box<dyn Any + Send>) -> String {
	match payload.downcast::<&'static str>() {
		Ok(msg) => (*msg).to_owned(),
		Err(payload) => match payload.downcast::<String>() {
			Ok(msg) => *msg,
			Err(_) => "non-string panic payload".to_owned(),
		},
	}
}

#[cfg(test)]
#[path = "panic_tests.rs"]
mod tests;
