//! Registration keys.
//!
//! A [`WatchKey`] moves between three states:
//!
//! ```text
//!   Ready --signal--> Signalled --reset (no pending)--> Ready
//!                        |  ^
//!                        +--+ reset (pending): re-queued
//!   any --cancel / service close--> Cancelled (terminal)
//! ```
//!
//! The `Ready -> Signalled` transition happens under the key's own lock and
//! is the only place a key enters the service queue from a signal, so a key
//! is never queued twice for one signalling episode.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::event::{EventContext, WatchEvent};
use crate::id::{KeyId, ServiceId};
use crate::kind::{EventKind, OVERFLOW};
use crate::modifier::Modifier;
use crate::service::ServiceInner;
use crate::watchable::Watchable;

/// Lifecycle state of a [`WatchKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
	/// No undrained events; the key is not queued.
	Ready,
	/// Events arrived; the key is queued or held by a consumer.
	Signalled,
	/// Cancelled directly or by service closure. Terminal.
	Cancelled,
}

impl KeyState {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Ready => "ready",
			Self::Signalled => "signalled",
			Self::Cancelled => "cancelled",
		}
	}
}

/// Outcome of delivering one event to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
	/// The key went from ready to signalled and was queued.
	Queued,
	/// A new record was appended to an already signalled key.
	Appended,
	/// The event repeated the last record and bumped its count.
	Coalesced,
	/// The key was at capacity; the event was folded into an overflow record.
	Overflowed,
	/// The key is not interested in this kind, or the context has the wrong shape.
	Ignored,
	/// The key is cancelled or gone.
	Cancelled,
}

struct KeyData {
	state: KeyState,
	kinds: HashSet<EventKind>,
	modifiers: Vec<Modifier>,
	pending: Vec<WatchEvent>,
}

impl KeyData {
	/// Appends or coalesces one event, folding into `OVERFLOW` at capacity.
	fn push(&mut self, kind: &EventKind, context: Option<EventContext>, capacity: usize) -> SignalOutcome {
		if let Some(last) = self.pending.last_mut()
			&& last.is_repeat_of(kind, context.as_ref())
		{
			last.increment();
			return SignalOutcome::Coalesced;
		}

		if self.pending.len() >= capacity {
			match self.pending.last_mut() {
				Some(last) if last.is_repeat_of(&OVERFLOW, None) => last.increment(),
				_ => self.pending.push(WatchEvent::new(OVERFLOW, None)),
			}
			return SignalOutcome::Overflowed;
		}

		self.pending.push(WatchEvent::new(kind.clone(), context));
		SignalOutcome::Appended
	}
}

pub(crate) struct KeyInner {
	id: KeyId,
	target: Watchable,
	service_id: ServiceId,
	service: Weak<ServiceInner>,
	capacity: usize,
	data: Mutex<KeyData>,
}

impl KeyInner {
	/// Moves the key to `Cancelled`. Returns false if it already was.
	pub(crate) fn mark_cancelled(&self) -> bool {
		let mut data = self.data.lock();
		if data.state == KeyState::Cancelled {
			return false;
		}
		data.state = KeyState::Cancelled;
		true
	}

	/// Delivers one event. Called by event sources through a [`KeySink`](crate::KeySink).
	pub(crate) fn signal(self: &Arc<Self>, kind: &EventKind, context: Option<EventContext>) -> SignalOutcome {
		// Upgraded before locking: if this turns out to be the last service
		// handle, its drop closes the service, which needs this key's lock.
		let service = self.service.upgrade();
		let mut data = self.data.lock();
		if data.state == KeyState::Cancelled {
			return SignalOutcome::Cancelled;
		}
		if !kind.is_overflow() && !data.kinds.contains(kind) {
			return SignalOutcome::Ignored;
		}
		if !kind.context_type().accepts(context.as_ref()) {
			tracing::warn!(key = %self.id, %kind, ?context, "watch.signal.bad_context");
			return SignalOutcome::Ignored;
		}

		// A ready key only takes the event if it can enter the queue. The key
		// lock is held throughout, so no consumer sees it before the push.
		let first = data.state == KeyState::Ready;
		if first {
			let queued = service
				.as_ref()
				.is_some_and(|service| service.enqueue(WatchKey { inner: Arc::clone(self) }));
			if !queued {
				data.state = KeyState::Cancelled;
				tracing::debug!(key = %self.id, %kind, "watch.signal.closed");
				return SignalOutcome::Cancelled;
			}
			data.state = KeyState::Signalled;
		}

		tracing::trace!(key = %self.id, %kind, ?context, "watch.signal");
		let outcome = data.push(kind, context, self.capacity);
		if outcome == SignalOutcome::Overflowed {
			tracing::warn!(key = %self.id, capacity = self.capacity, "watch.overflow");
		}
		if first { SignalOutcome::Queued } else { outcome }
	}
}

/// Handle to one registration of a [`Watchable`] with a [`WatchService`](crate::WatchService).
///
/// Clones refer to the same key. Equality is by key id.
#[derive(Clone)]
pub struct WatchKey {
	inner: Arc<KeyInner>,
}

impl WatchKey {
	pub(crate) fn new(
		target: Watchable,
		service: Weak<ServiceInner>,
		service_id: ServiceId,
		kinds: HashSet<EventKind>,
		modifiers: Vec<Modifier>,
		capacity: usize,
	) -> Self {
		Self {
			inner: Arc::new(KeyInner {
				id: KeyId::next(),
				target,
				service_id,
				service,
				capacity,
				data: Mutex::new(KeyData {
					state: KeyState::Ready,
					kinds,
					modifiers,
					pending: Vec::new(),
				}),
			}),
		}
	}

	pub(crate) fn upgrade(weak: &Weak<KeyInner>) -> Option<Self> {
		weak.upgrade().map(|inner| Self { inner })
	}

	pub(crate) fn downgrade(&self) -> Weak<KeyInner> {
		Arc::downgrade(&self.inner)
	}

	pub(crate) fn inner(&self) -> &Arc<KeyInner> {
		&self.inner
	}

	pub fn id(&self) -> KeyId {
		self.inner.id
	}

	/// Returns the registration target. Still available after cancellation.
	pub fn watchable(&self) -> &Watchable {
		&self.inner.target
	}

	pub fn state(&self) -> KeyState {
		self.inner.data.lock().state
	}

	/// Returns true unless the key is cancelled.
	pub fn is_valid(&self) -> bool {
		self.state() != KeyState::Cancelled
	}

	/// Returns the kinds this key is interested in, sorted by name.
	pub fn kinds(&self) -> Vec<EventKind> {
		let mut kinds: Vec<_> = self.inner.data.lock().kinds.iter().cloned().collect();
		kinds.sort_by(|a, b| a.name().cmp(b.name()));
		kinds
	}

	/// Returns the modifiers the event source applied to this key.
	pub fn modifiers(&self) -> Vec<Modifier> {
		self.inner.data.lock().modifiers.clone()
	}

	/// Detaches and returns all pending events.
	///
	/// Never blocks and never changes the key state. Works on cancelled keys,
	/// returning whatever accumulated before cancellation.
	pub fn poll_events(&self) -> Vec<WatchEvent> {
		mem::take(&mut self.inner.data.lock().pending)
	}

	/// Returns a signalled key to the ready state, or re-queues it if events
	/// arrived since the last [`poll_events`](Self::poll_events).
	///
	/// Returns false if the key is cancelled or its service is closed.
	pub fn reset(&self) -> bool {
		let service = self.inner.service.upgrade();
		let mut data = self.inner.data.lock();
		match data.state {
			KeyState::Cancelled => false,
			KeyState::Ready => true,
			KeyState::Signalled if data.pending.is_empty() => {
				data.state = KeyState::Ready;
				tracing::trace!(key = %self.inner.id, "watch.reset.ready");
				true
			}
			KeyState::Signalled => {
				let Some(service) = &service else {
					return false;
				};
				tracing::trace!(key = %self.inner.id, pending = data.pending.len(), "watch.reset.requeue");
				service.enqueue(self.clone())
			}
		}
	}

	/// Cancels the registration. Idempotent.
	///
	/// A key already in the service queue stays there; consumers that dequeue
	/// it can still drain its pending events.
	pub fn cancel(&self) {
		if !self.inner.mark_cancelled() {
			return;
		}
		tracing::debug!(key = %self.inner.id, path = %self.inner.target.path().display(), "watch.cancel");
		self.inner.target.detach(self.inner.service_id, self.inner.id);
		if let Some(service) = self.inner.service.upgrade() {
			service.forget(self);
		}
	}

	/// Replaces the interest set and modifiers. Returns false if cancelled.
	pub(crate) fn update_interest(&self, kinds: HashSet<EventKind>, modifiers: Vec<Modifier>) -> bool {
		let mut data = self.inner.data.lock();
		if data.state == KeyState::Cancelled {
			return false;
		}
		data.kinds = kinds;
		data.modifiers = modifiers;
		true
	}

	pub(crate) fn snapshot(&self) -> KeySnapshot {
		let data = self.inner.data.lock();
		let mut kinds: Vec<_> = data.kinds.iter().map(|k| k.name().to_string()).collect();
		kinds.sort();
		KeySnapshot {
			id: self.inner.id,
			path: self.inner.target.path().to_path_buf(),
			state: data.state,
			pending: data.pending.len(),
			kinds,
		}
	}
}

impl PartialEq for WatchKey {
	fn eq(&self, other: &Self) -> bool {
		self.inner.id == other.inner.id
	}
}

impl Eq for WatchKey {}

impl Hash for WatchKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.inner.id.hash(state);
	}
}

impl fmt::Debug for WatchKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WatchKey")
			.field("id", &self.inner.id)
			.field("path", &self.inner.target.path())
			.field("state", &self.state().as_str())
			.finish()
	}
}

/// Point-in-time view of one key, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySnapshot {
	pub id: KeyId,
	pub path: PathBuf,
	pub state: KeyState,
	pub pending: usize,
	pub kinds: Vec<String>,
}
