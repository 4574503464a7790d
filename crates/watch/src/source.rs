//! Event source contract.
//!
//! An [`EventSource`] turns platform notifications into deliveries on
//! [`KeySink`]s. The service calls [`EventSource::watch`] when a key is
//! registered or re-registered and [`EventSource::unwatch`] exactly once
//! when it is cancelled or the service closes. Sinks only hold weak
//! references, so a source never keeps a key alive and deliveries to a
//! cancelled key are no-ops.

use std::fmt;
use std::sync::Weak;

use crate::error::SourceError;
use crate::event::EventContext;
use crate::id::KeyId;
use crate::key::{KeyInner, SignalOutcome, WatchKey};
use crate::kind::{EventKind, OVERFLOW};
use crate::modifier::{Modifier, ModifierSupport};
use crate::watchable::Watchable;

/// Producer side of a [`WatchService`](crate::WatchService).
pub trait EventSource: Send + Sync {
	/// Returns true if this source can deliver `kind` for `target`.
	///
	/// The default accepts the standard kinds only.
	fn supports(&self, target: &Watchable, kind: &EventKind) -> bool {
		let _ = target;
		kind.is_standard()
	}

	/// Classifies a registration modifier. The default understands none.
	fn modifier_support(&self, modifier: &Modifier) -> ModifierSupport {
		let _ = modifier;
		ModifierSupport::Unsupported
	}

	/// Starts (or refreshes) delivery for one key. Must be idempotent per
	/// [`KeySink::key_id`].
	///
	/// Called with no service or watchable lock held. A source that finds the
	/// target gone may call [`KeySink::invalidate`] before returning; the
	/// registration then fails with [`SourceError::Unavailable`].
	fn watch(&self, target: &Watchable, sink: KeySink) -> Result<(), SourceError>;

	/// Stops delivery for one key.
	fn unwatch(&self, target: &Watchable, key: KeyId);
}

/// Weak delivery handle to one key.
#[derive(Clone)]
pub struct KeySink {
	id: KeyId,
	key: Weak<KeyInner>,
}

impl KeySink {
	pub(crate) fn new(key: &WatchKey) -> Self {
		Self {
			id: key.id(),
			key: key.downgrade(),
		}
	}

	pub fn key_id(&self) -> KeyId {
		self.id
	}

	/// Returns true while the key exists and is not cancelled.
	pub fn is_live(&self) -> bool {
		WatchKey::upgrade(&self.key).is_some_and(|key| key.is_valid())
	}

	/// Delivers one event to the key.
	pub fn deliver(&self, kind: &EventKind, context: Option<EventContext>) -> SignalOutcome {
		match self.key.upgrade() {
			Some(key) => key.signal(kind, context),
			None => SignalOutcome::Cancelled,
		}
	}

	/// Reports that the source lost events for this key.
	pub fn overflow(&self) -> SignalOutcome {
		self.deliver(&OVERFLOW, None)
	}

	/// Cancels the key, e.g. because the watchable no longer exists.
	pub fn invalidate(&self) {
		if let Some(key) = WatchKey::upgrade(&self.key) {
			tracing::debug!(key = %self.id, "watch.sink.invalidate");
			key.cancel();
		}
	}
}

impl fmt::Debug for KeySink {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("KeySink").field("id", &self.id).field("live", &self.is_live()).finish()
	}
}
