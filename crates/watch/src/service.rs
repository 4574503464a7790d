//! The watch service: registration table, signalled-key queue and close
//! lifecycle.
//!
//! Consumers retrieve signalled keys with [`WatchService::poll`],
//! [`WatchService::poll_timeout`], [`WatchService::take`] or the async
//! [`WatchService::recv`]. Blocking callers park on a condition variable and
//! async callers on a [`Notify`]; both are woken on every enqueue and all of
//! them on close.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::WatchConfig;
use crate::error::{Result, SourceError, WatchError};
use crate::id::{KeyId, ServiceId};
use crate::key::{KeySnapshot, WatchKey};
use crate::kind::EventKind;
use crate::modifier::{Modifier, ModifierSupport};
use crate::source::{EventSource, KeySink};
use crate::watchable::{Registrations, Watchable};

struct QueueState {
	signalled: VecDeque<WatchKey>,
	/// Ids of keys currently in `signalled`.
	queued: HashSet<KeyId>,
	closed: bool,
}

impl QueueState {
	fn pop(&mut self) -> Option<WatchKey> {
		let key = self.signalled.pop_front()?;
		self.queued.remove(&key.id());
		Some(key)
	}
}

pub(crate) struct ServiceInner {
	id: ServiceId,
	config: WatchConfig,
	source: Arc<dyn EventSource>,
	queue: Mutex<QueueState>,
	ready: Condvar,
	notify: Notify,
	/// Registration table. The service owns its keys.
	keys: Mutex<HashMap<KeyId, WatchKey>>,
}

impl ServiceInner {
	/// Adds `key` to the tail of the signalled queue unless it is already
	/// there. Returns false once the service is closed.
	pub(crate) fn enqueue(&self, key: WatchKey) -> bool {
		let mut queue = self.queue.lock();
		if queue.closed {
			return false;
		}
		if queue.queued.insert(key.id()) {
			tracing::trace!(service = %self.config.name, key = %key.id(), depth = queue.signalled.len() + 1, "watch.enqueue");
			queue.signalled.push_back(key);
			drop(queue);
			self.ready.notify_one();
			self.notify.notify_one();
		}
		true
	}

	/// Drops a cancelled key from the registration table and unsubscribes it.
	pub(crate) fn forget(&self, key: &WatchKey) {
		let removed = self.keys.lock().remove(&key.id());
		if removed.is_some() {
			self.source.unwatch(key.watchable(), key.id());
		}
	}

	fn is_closed(&self) -> bool {
		self.queue.lock().closed
	}

	fn try_take(&self) -> Result<Option<WatchKey>> {
		let mut queue = self.queue.lock();
		if queue.closed {
			return Err(WatchError::ClosedService);
		}
		Ok(queue.pop())
	}

	/// Passes an unused async wakeup on to the next waiter.
	fn forward_wakeup(&self) {
		if !self.queue.lock().signalled.is_empty() {
			self.notify.notify_one();
		}
	}

	fn close(&self) {
		{
			let mut queue = self.queue.lock();
			if queue.closed {
				return;
			}
			queue.closed = true;
		}
		self.ready.notify_all();
		self.notify.notify_waiters();

		let keys: Vec<WatchKey> = self.keys.lock().drain().map(|(_, key)| key).collect();
		for key in &keys {
			// A delivery racing close may have cancelled the key already.
			key.inner().mark_cancelled();
			key.watchable().detach(self.id, key.id());
			self.source.unwatch(key.watchable(), key.id());
		}
		tracing::debug!(service = %self.config.name, cancelled = keys.len(), "watch.close");
	}
}

impl Drop for ServiceInner {
	fn drop(&mut self) {
		self.close();
	}
}

/// Change-notification service.
///
/// Cloning yields another handle to the same service. Dropping the last
/// handle closes it.
#[derive(Clone)]
pub struct WatchService {
	inner: Arc<ServiceInner>,
}

impl WatchService {
	/// Creates a service fed by `source` with the default config.
	pub fn new(source: Arc<dyn EventSource>) -> Self {
		Self::build(source, WatchConfig::default())
	}

	/// Creates a service with an explicit config.
	pub fn with_config(source: Arc<dyn EventSource>, config: WatchConfig) -> Result<Self> {
		config.validate()?;
		Ok(Self::build(source, config))
	}

	fn build(source: Arc<dyn EventSource>, config: WatchConfig) -> Self {
		let id = ServiceId::next();
		tracing::debug!(service = %config.name, %id, max_pending = config.max_pending_events, "watch.open");
		Self {
			inner: Arc::new(ServiceInner {
				id,
				config,
				source,
				queue: Mutex::new(QueueState {
					signalled: VecDeque::new(),
					queued: HashSet::new(),
					closed: false,
				}),
				ready: Condvar::new(),
				notify: Notify::new(),
				keys: Mutex::new(HashMap::new()),
			}),
		}
	}

	pub fn id(&self) -> ServiceId {
		self.inner.id
	}

	pub fn config(&self) -> &WatchConfig {
		&self.inner.config
	}

	/// Registers `target` for `kinds`.
	///
	/// Registering a watchable that already has a valid key with this service
	/// updates that key's interest set and modifiers in place and returns it.
	///
	/// # Errors
	///
	/// - [`WatchError::ClosedService`] once the service is closed.
	/// - [`WatchError::InvalidArgument`] for an empty kind set, a kind the
	///   source cannot deliver for this watchable, or an unsupported modifier.
	/// - [`WatchError::Source`] if the source refuses the watchable.
	pub fn register(&self, target: &Watchable, kinds: &[EventKind], modifiers: &[Modifier]) -> Result<WatchKey> {
		if self.inner.is_closed() {
			return Err(WatchError::ClosedService);
		}
		if kinds.is_empty() {
			return Err(WatchError::InvalidArgument("no event kinds to register".to_string()));
		}

		let source = &self.inner.source;
		if let Some(kind) = kinds.iter().find(|kind| !source.supports(target, kind)) {
			return Err(WatchError::InvalidArgument(format!(
				"{kind} is not supported for {:?} {}",
				target.kind(),
				target.path().display()
			)));
		}

		let mut applied = Vec::new();
		for modifier in modifiers {
			match source.modifier_support(modifier) {
				ModifierSupport::Supported => applied.push(modifier.clone()),
				ModifierSupport::Optional => {
					tracing::trace!(modifier = modifier.name(), "watch.register.ignored_modifier");
				}
				ModifierSupport::Unsupported => {
					return Err(WatchError::InvalidArgument(format!("unsupported modifier '{}'", modifier.name())));
				}
			}
		}
		let kinds: HashSet<EventKind> = kinds.iter().cloned().collect();

		// The source is called without the registration lock held, so it may
		// invalidate sinks from inside `watch`.
		if let Some(key) = self.registered(target) {
			source.watch(target, KeySink::new(&key))?;
			if key.update_interest(kinds.clone(), applied.clone()) {
				tracing::debug!(service = %self.inner.config.name, key = %key.id(), path = %target.path().display(), "watch.register.update");
				return Ok(key);
			}
		}

		let key = WatchKey::new(
			target.clone(),
			Arc::downgrade(&self.inner),
			self.inner.id,
			kinds.clone(),
			applied.clone(),
			self.inner.config.max_pending_events,
		);
		source.watch(target, KeySink::new(&key))?;

		target.with_registrations(|registrations| -> Result<WatchKey> {
			if let Some(winner) = live_key(registrations, self.inner.id) {
				// A concurrent register for the same watchable got there first.
				key.inner().mark_cancelled();
				source.unwatch(target, key.id());
				winner.update_interest(kinds, applied);
				return Ok(winner);
			}
			if !key.is_valid() {
				source.unwatch(target, key.id());
				return Err(SourceError::Unavailable {
					path: target.path().to_path_buf(),
					reason: "invalidated during registration".to_string(),
				}
				.into());
			}

			{
				// Checked under the table lock so close() either sees this key or
				// this call sees the closed flag.
				let mut table = self.inner.keys.lock();
				if self.inner.is_closed() {
					drop(table);
					key.inner().mark_cancelled();
					source.unwatch(target, key.id());
					return Err(WatchError::ClosedService);
				}
				table.insert(key.id(), key.clone());
			}
			registrations.insert(self.inner.id, key.downgrade());
			tracing::debug!(service = %self.inner.config.name, key = %key.id(), path = %target.path().display(), "watch.register");
			Ok(key)
		})
	}

	/// Returns this service's valid key for `target`, if any.
	fn registered(&self, target: &Watchable) -> Option<WatchKey> {
		target.with_registrations(|registrations| live_key(registrations, self.inner.id))
	}

	/// Removes and returns the next signalled key without blocking.
	///
	/// Keys still queued when the service closes remain retrievable here so
	/// their events can be drained.
	pub fn poll(&self) -> Option<WatchKey> {
		self.inner.queue.lock().pop()
	}

	/// Waits up to `timeout` for a signalled key.
	///
	/// Returns `None` on timeout, or when the service is closed with nothing
	/// left in the queue.
	pub fn poll_timeout(&self, timeout: Duration) -> Option<WatchKey> {
		let deadline = Instant::now().checked_add(timeout);
		let mut queue = self.inner.queue.lock();
		loop {
			if let Some(key) = queue.pop() {
				return Some(key);
			}
			if queue.closed {
				return None;
			}
			match deadline {
				Some(deadline) => {
					if self.inner.ready.wait_until(&mut queue, deadline).timed_out() {
						return queue.pop();
					}
				}
				None => self.inner.ready.wait(&mut queue),
			}
		}
	}

	/// Blocks until a key is signalled.
	///
	/// # Errors
	///
	/// [`WatchError::ClosedService`] if the service is or becomes closed.
	pub fn take(&self) -> Result<WatchKey> {
		let mut queue = self.inner.queue.lock();
		loop {
			if queue.closed {
				return Err(WatchError::ClosedService);
			}
			if let Some(key) = queue.pop() {
				tracing::trace!(service = %self.inner.config.name, key = %key.id(), "watch.take");
				return Ok(key);
			}
			self.inner.ready.wait(&mut queue);
		}
	}

	/// Async form of [`take`](Self::take).
	pub async fn recv(&self) -> Result<WatchKey> {
		loop {
			let mut notified = pin!(self.inner.notify.notified());
			notified.as_mut().enable();
			if let Some(key) = self.inner.try_take()? {
				return Ok(key);
			}
			notified.await;
		}
	}

	/// Like [`recv`](Self::recv), but gives up when `cancel` fires.
	///
	/// # Errors
	///
	/// [`WatchError::InterruptedWait`] when cancelled; the queue is untouched.
	pub async fn recv_until(&self, cancel: &CancellationToken) -> Result<WatchKey> {
		loop {
			let mut notified = pin!(self.inner.notify.notified());
			notified.as_mut().enable();
			if let Some(key) = self.inner.try_take()? {
				return Ok(key);
			}
			tokio::select! {
				() = notified.as_mut() => {}
				() = cancel.cancelled() => {
					self.inner.forward_wakeup();
					return Err(WatchError::InterruptedWait);
				}
			}
		}
	}

	/// Closes the service. Idempotent.
	///
	/// Every key is cancelled (pending events stay drainable) and every
	/// blocked retrieval wakes up.
	pub fn close(&self) {
		self.inner.close();
	}

	pub fn is_closed(&self) -> bool {
		self.inner.is_closed()
	}

	/// Number of keys waiting in the signalled queue.
	pub fn queued(&self) -> usize {
		self.inner.queue.lock().signalled.len()
	}

	/// Returns snapshots of all registered keys sorted by id.
	pub fn snapshots(&self) -> Vec<KeySnapshot> {
		let keys: Vec<WatchKey> = self.inner.keys.lock().values().cloned().collect();
		let mut snapshots: Vec<_> = keys.iter().map(WatchKey::snapshot).collect();
		snapshots.sort_by_key(|s| s.id);
		snapshots
	}
}

fn live_key(registrations: &Registrations, service: ServiceId) -> Option<WatchKey> {
	registrations.get(&service).and_then(WatchKey::upgrade).filter(WatchKey::is_valid)
}

impl fmt::Debug for WatchService {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WatchService")
			.field("id", &self.inner.id)
			.field("name", &self.config().name)
			.field("closed", &self.is_closed())
			.finish()
	}
}
