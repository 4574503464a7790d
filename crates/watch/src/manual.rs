//! In-process event source.
//!
//! [`ManualSource`] has no platform backend: events enter through
//! [`ManualSource::emit`]. It is what embedders use to feed changes they
//! detect themselves, and what the test suite drives the service with.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

use crate::error::SourceError;
use crate::event::EventContext;
use crate::id::{KeyId, WatchableId};
use crate::key::SignalOutcome;
use crate::kind::{EventKind, KindRegistry};
use crate::modifier::{Modifier, ModifierSupport};
use crate::source::{EventSource, KeySink};
use crate::watchable::{Watchable, WatchableKind};

/// Event source driven by explicit calls.
#[derive(Debug, Default)]
pub struct ManualSource {
	kinds: KindRegistry,
	modifiers: RwLock<HashMap<String, ModifierSupport>>,
	denied: Mutex<HashMap<WatchableId, String>>,
	sinks: Mutex<HashMap<WatchableId, Vec<KeySink>>>,
}

impl ManualSource {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registry of provider kinds this source accepts in addition to the
	/// standard ones.
	pub fn kinds(&self) -> &KindRegistry {
		&self.kinds
	}

	/// Declares how registrations carrying `name` are treated.
	pub fn declare_modifier(&self, name: impl Into<String>, support: ModifierSupport) {
		self.modifiers.write().insert(name.into(), support);
	}

	/// Makes registrations of `target` fail until [`allow`](Self::allow) is called.
	pub fn deny(&self, target: &Watchable, reason: impl Into<String>) {
		self.denied.lock().insert(target.id(), reason.into());
	}

	pub fn allow(&self, target: &Watchable) {
		self.denied.lock().remove(&target.id());
	}

	/// Delivers one event to every key watching `target`.
	///
	/// Returns one outcome per sink, in subscription order.
	pub fn emit(&self, target: &Watchable, kind: &EventKind, context: Option<EventContext>) -> Vec<SignalOutcome> {
		let sinks = self.sinks_for(target);
		tracing::trace!(path = %target.path().display(), %kind, sinks = sinks.len(), "watch.manual.emit");
		sinks.iter().map(|sink| sink.deliver(kind, context.clone())).collect()
	}

	/// Signals overflow to every key watching `target`.
	pub fn overflow(&self, target: &Watchable) -> Vec<SignalOutcome> {
		self.sinks_for(target).iter().map(KeySink::overflow).collect()
	}

	/// Treats `target` as gone: every key watching it is cancelled.
	///
	/// Returns the number of keys invalidated.
	pub fn remove(&self, target: &Watchable) -> usize {
		let sinks = self.sinks.lock().remove(&target.id()).unwrap_or_default();
		tracing::debug!(path = %target.path().display(), keys = sinks.len(), "watch.manual.remove");
		for sink in &sinks {
			sink.invalidate();
		}
		sinks.len()
	}

	/// Number of live keys subscribed to `target`.
	pub fn watching(&self, target: &Watchable) -> usize {
		self.sinks_for(target).iter().filter(|sink| sink.is_live()).count()
	}

	/// Clones the sink list so deliveries run without this source's lock held.
	fn sinks_for(&self, target: &Watchable) -> Vec<KeySink> {
		self.sinks.lock().get(&target.id()).cloned().unwrap_or_default()
	}
}

impl EventSource for ManualSource {
	fn supports(&self, target: &Watchable, kind: &EventKind) -> bool {
		match kind {
			EventKind::Create => target.kind() == WatchableKind::Directory,
			EventKind::Delete | EventKind::Modify | EventKind::Overflow => true,
			EventKind::Provider(_) => self.kinds.contains(kind),
		}
	}

	fn modifier_support(&self, modifier: &Modifier) -> ModifierSupport {
		self.modifiers
			.read()
			.get(modifier.name())
			.copied()
			.unwrap_or(ModifierSupport::Unsupported)
	}

	fn watch(&self, target: &Watchable, sink: KeySink) -> Result<(), SourceError> {
		if let Some(reason) = self.denied.lock().get(&target.id()) {
			return Err(SourceError::Unavailable {
				path: target.path().to_path_buf(),
				reason: reason.clone(),
			});
		}

		let mut sinks = self.sinks.lock();
		let entry = sinks.entry(target.id()).or_default();
		match entry.iter_mut().find(|existing| existing.key_id() == sink.key_id()) {
			Some(existing) => *existing = sink,
			None => entry.push(sink),
		}
		Ok(())
	}

	fn unwatch(&self, target: &Watchable, key: KeyId) {
		let mut sinks = self.sinks.lock();
		if let Some(entry) = sinks.get_mut(&target.id()) {
			entry.retain(|sink| sink.key_id() != key);
			if entry.is_empty() {
				sinks.remove(&target.id());
			}
		}
	}
}
