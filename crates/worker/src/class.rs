/// Execution classes used to tag spawned work in traces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Work on the request path, such as a deadline timer owned by a caller.
	Interactive,
	/// Housekeeping that nobody awaits directly, such as a merge watcher.
	#[default]
	Background,
	/// Synchronous I/O (driver round trips) run on the blocking pool.
	IoBlocking,
}

impl TaskClass {
	/// Stable name used as the `worker_class` trace field.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
			Self::IoBlocking => "io_blocking",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_class_is_background() {
		assert_eq!(TaskClass::default(), TaskClass::Background);
		assert_eq!(TaskClass::default().as_str(), "background");
	}
}
