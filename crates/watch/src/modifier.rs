use std::fmt;
use std::sync::Arc;

/// Qualifier on how a watchable is registered.
///
/// No modifiers are standard; each event source decides which names it
/// understands through [`EventSource::modifier_support`](crate::EventSource::modifier_support).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Modifier {
	name: Arc<str>,
}

impl Modifier {
	pub fn new(name: impl AsRef<str>) -> Self {
		Self { name: Arc::from(name.as_ref()) }
	}

	pub fn name(&self) -> &str {
		&self.name
	}
}

impl fmt::Debug for Modifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Modifier({})", self.name)
	}
}

/// How an event source treats one modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierSupport {
	/// Understood and applied. Kept on the key.
	Supported,
	/// Not understood, but declared safe to ignore.
	Optional,
	/// Not understood. Registration fails.
	Unsupported,
}
