use std::fmt;
use std::path::{Path, PathBuf};

use crate::kind::EventKind;

/// Context attached to a watch event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventContext {
	/// Path of the affected entry, relative to the watchable.
	Path(PathBuf),
	/// Provider-defined value.
	Opaque(String),
}

impl EventContext {
	/// Returns the path if this is a `Path` context.
	pub fn as_path(&self) -> Option<&Path> {
		match self {
			Self::Path(path) => Some(path),
			Self::Opaque(_) => None,
		}
	}
}

impl From<PathBuf> for EventContext {
	fn from(path: PathBuf) -> Self {
		Self::Path(path)
	}
}

impl From<&Path> for EventContext {
	fn from(path: &Path) -> Self {
		Self::Path(path.to_path_buf())
	}
}

impl From<&str> for EventContext {
	fn from(path: &str) -> Self {
		Self::Path(PathBuf::from(path))
	}
}

impl fmt::Display for EventContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Path(path) => write!(f, "{}", path.display()),
			Self::Opaque(value) => f.write_str(value),
		}
	}
}

/// One event, or a run of identical adjacent events, retrieved from a key.
///
/// A `count` above 1 means the same kind and context were observed that many
/// times in a row before the key was drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
	kind: EventKind,
	context: Option<EventContext>,
	count: u32,
}

impl WatchEvent {
	pub(crate) fn new(kind: EventKind, context: Option<EventContext>) -> Self {
		Self { kind, context, count: 1 }
	}

	pub fn kind(&self) -> &EventKind {
		&self.kind
	}

	pub fn context(&self) -> Option<&EventContext> {
		self.context.as_ref()
	}

	/// Returns the context as a path, for the entry kinds.
	pub fn path(&self) -> Option<&Path> {
		self.context.as_ref().and_then(EventContext::as_path)
	}

	pub fn count(&self) -> u32 {
		self.count
	}

	pub(crate) fn is_repeat_of(&self, kind: &EventKind, context: Option<&EventContext>) -> bool {
		self.kind == *kind && self.context.as_ref() == context
	}

	pub(crate) fn increment(&mut self) {
		self.count = self.count.saturating_add(1);
	}
}
