//! Event kinds.
//!
//! The four standard kinds are unit variants of [`EventKind`]. Event sources
//! may define more at runtime through a [`KindRegistry`]; those are data
//! ([`ProviderKind`]) rather than new types, and compare by identity.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, WatchError};
use crate::event::EventContext;

/// Shape of the context carried by events of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextType {
	/// A path relative to the watchable. Always present.
	Path,
	/// Provider-defined value. May be absent.
	Opaque,
}

impl ContextType {
	/// Returns true if `context` is acceptable for this context type.
	pub fn accepts(self, context: Option<&EventContext>) -> bool {
		match self {
			Self::Path => matches!(context, Some(EventContext::Path(_))),
			Self::Opaque => true,
		}
	}
}

/// Category of a watch event.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
	/// An entry was created in the watched directory.
	Create,
	/// An entry was deleted from the watched directory.
	Delete,
	/// An entry was modified.
	Modify,
	/// Events were lost or discarded.
	Overflow,
	/// A kind defined by an event source.
	Provider(ProviderKind),
}

/// Entry creation, context is the relative path of the entry.
pub const ENTRY_CREATE: EventKind = EventKind::Create;
/// Entry deletion, context is the relative path of the entry.
pub const ENTRY_DELETE: EventKind = EventKind::Delete;
/// Entry modification, context is the relative path of the entry.
pub const ENTRY_MODIFY: EventKind = EventKind::Modify;
/// Lost or discarded events. Context is provider-defined and usually absent.
pub const OVERFLOW: EventKind = EventKind::Overflow;

/// Standard kinds in declaration order.
pub static STANDARD_KINDS: [EventKind; 4] = [ENTRY_CREATE, ENTRY_DELETE, ENTRY_MODIFY, OVERFLOW];

impl EventKind {
	/// Returns the kind name, e.g. `ENTRY_CREATE`.
	pub fn name(&self) -> &str {
		match self {
			Self::Create => "ENTRY_CREATE",
			Self::Delete => "ENTRY_DELETE",
			Self::Modify => "ENTRY_MODIFY",
			Self::Overflow => "OVERFLOW",
			Self::Provider(kind) => kind.name(),
		}
	}

	/// Returns the shape of context this kind carries.
	pub fn context_type(&self) -> ContextType {
		match self {
			Self::Create | Self::Delete | Self::Modify => ContextType::Path,
			Self::Overflow => ContextType::Opaque,
			Self::Provider(kind) => kind.context_type(),
		}
	}

	/// Returns true for the four standard kinds.
	pub fn is_standard(&self) -> bool {
		!matches!(self, Self::Provider(_))
	}

	/// Returns true for [`OVERFLOW`].
	pub fn is_overflow(&self) -> bool {
		matches!(self, Self::Overflow)
	}
}

impl fmt::Debug for EventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl fmt::Display for EventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

#[derive(Debug)]
struct KindMeta {
	name: String,
	context: ContextType,
}

/// Runtime-defined event kind.
///
/// Two provider kinds are equal only if they come from the same
/// [`KindRegistry::register`] call, even when their names match.
#[derive(Clone)]
pub struct ProviderKind {
	meta: Arc<KindMeta>,
}

impl ProviderKind {
	pub fn name(&self) -> &str {
		&self.meta.name
	}

	pub fn context_type(&self) -> ContextType {
		self.meta.context
	}
}

impl PartialEq for ProviderKind {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.meta, &other.meta)
	}
}

impl Eq for ProviderKind {}

impl Hash for ProviderKind {
	fn hash<H: Hasher>(&self, state: &mut H) {
		std::ptr::hash(Arc::as_ptr(&self.meta), state);
	}
}

impl fmt::Debug for ProviderKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProviderKind")
			.field("name", &self.meta.name)
			.field("context", &self.meta.context)
			.finish()
	}
}

/// Name to kind mapping for one event source.
///
/// Standard kind names are reserved and always resolve.
#[derive(Debug, Default)]
pub struct KindRegistry {
	kinds: RwLock<HashMap<String, EventKind>>,
}

impl KindRegistry {
	/// Creates a registry holding only the standard kinds.
	pub fn new() -> Self {
		Self::default()
	}

	/// Defines a new provider kind.
	pub fn register(&self, name: impl Into<String>, context: ContextType) -> Result<EventKind> {
		let name = name.into();
		if name.is_empty() {
			return Err(WatchError::InvalidArgument("event kind name must not be empty".to_string()));
		}
		if STANDARD_KINDS.iter().any(|k| k.name() == name) {
			return Err(WatchError::InvalidArgument(format!("event kind name '{name}' is reserved")));
		}

		let mut kinds = self.kinds.write();
		if kinds.contains_key(&name) {
			return Err(WatchError::InvalidArgument(format!("event kind '{name}' is already registered")));
		}
		let kind = EventKind::Provider(ProviderKind {
			meta: Arc::new(KindMeta { name: name.clone(), context }),
		});
		kinds.insert(name, kind.clone());
		tracing::debug!(kind = kind.name(), ?context, "watch.kind.register");
		Ok(kind)
	}

	/// Resolves a standard or registered kind by name.
	pub fn lookup(&self, name: &str) -> Option<EventKind> {
		if let Some(kind) = STANDARD_KINDS.iter().find(|k| k.name() == name) {
			return Some(kind.clone());
		}
		self.kinds.read().get(name).cloned()
	}

	/// Returns true if `kind` is standard or was defined by this registry.
	pub fn contains(&self, kind: &EventKind) -> bool {
		match kind {
			EventKind::Provider(provider) => self.kinds.read().get(provider.name()) == Some(kind),
			_ => true,
		}
	}

	/// Returns provider kinds sorted by name.
	pub fn provider_kinds(&self) -> Vec<EventKind> {
		let mut kinds: Vec<_> = self.kinds.read().values().cloned().collect();
		kinds.sort_by(|a, b| a.name().cmp(b.name()));
		kinds
	}
}
