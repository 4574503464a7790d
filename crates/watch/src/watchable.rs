use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::id::{KeyId, ServiceId, WatchableId};
use crate::key::{KeyInner, WatchKey};

/// What a watchable refers to. Event sources use this to decide which kinds
/// they can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchableKind {
	Directory,
	File,
}

/// Keys registered against one watchable, at most one per service.
///
/// Entries are weak; the service owns its keys.
pub(crate) type Registrations = HashMap<ServiceId, Weak<KeyInner>>;

struct WatchableInner {
	id: WatchableId,
	path: PathBuf,
	kind: WatchableKind,
	registrations: Mutex<Registrations>,
}

/// An object that can be registered with a [`WatchService`](crate::WatchService).
///
/// Cloning yields another handle to the same watchable. Two watchables built
/// from the same path are distinct.
#[derive(Clone)]
pub struct Watchable {
	inner: Arc<WatchableInner>,
}

impl Watchable {
	/// Creates a directory watchable.
	pub fn directory(path: impl Into<PathBuf>) -> Self {
		Self::new(path.into(), WatchableKind::Directory)
	}

	/// Creates a single-file watchable.
	pub fn file(path: impl Into<PathBuf>) -> Self {
		Self::new(path.into(), WatchableKind::File)
	}

	fn new(path: PathBuf, kind: WatchableKind) -> Self {
		Self {
			inner: Arc::new(WatchableInner {
				id: WatchableId::next(),
				path,
				kind,
				registrations: Mutex::new(HashMap::new()),
			}),
		}
	}

	pub fn id(&self) -> WatchableId {
		self.inner.id
	}

	pub fn path(&self) -> &Path {
		&self.inner.path
	}

	pub fn kind(&self) -> WatchableKind {
		self.inner.kind
	}

	/// Returns the valid keys currently registered against this watchable.
	pub fn registrations(&self) -> Vec<WatchKey> {
		let registrations = self.inner.registrations.lock();
		let mut keys: Vec<_> = registrations
			.values()
			.filter_map(WatchKey::upgrade)
			.filter(WatchKey::is_valid)
			.collect();
		keys.sort_by_key(WatchKey::id);
		keys
	}

	/// Runs `f` with the registration set locked.
	///
	/// Holding the lock serializes registration of this watchable, which keeps
	/// one key per service.
	pub(crate) fn with_registrations<R>(&self, f: impl FnOnce(&mut Registrations) -> R) -> R {
		let mut registrations = self.inner.registrations.lock();
		registrations.retain(|_, key| key.strong_count() > 0);
		f(&mut registrations)
	}

	/// Removes the registration for `service` if it still points at `key`.
	pub(crate) fn detach(&self, service: ServiceId, key: KeyId) {
		let mut registrations = self.inner.registrations.lock();
		let matches = registrations
			.get(&service)
			.and_then(WatchKey::upgrade)
			.is_none_or(|registered| registered.id() == key);
		if matches {
			registrations.remove(&service);
		}
	}
}

impl PartialEq for Watchable {
	fn eq(&self, other: &Self) -> bool {
		self.inner.id == other.inner.id
	}
}

impl Eq for Watchable {}

impl Hash for Watchable {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.inner.id.hash(state);
	}
}

impl fmt::Debug for Watchable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Watchable")
			.field("id", &self.inner.id)
			.field("path", &self.inner.path)
			.field("kind", &self.inner.kind)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn handles_share_identity() {
		let dir = Watchable::directory("/tmp/a");
		let clone = dir.clone();
		let other = Watchable::directory("/tmp/a");

		assert_eq!(dir, clone);
		assert_ne!(dir, other);
		assert_eq!(dir.path(), Path::new("/tmp/a"));
		assert_eq!(dir.kind(), WatchableKind::Directory);
		assert_eq!(Watchable::file("/tmp/a/f").kind(), WatchableKind::File);
	}

	#[test]
	fn fresh_watchable_has_no_registrations() {
		let dir = Watchable::directory("/tmp/b");
		assert!(dir.registrations().is_empty());
		dir.detach(ServiceId::next(), KeyId::next());
		assert!(dir.registrations().is_empty());
	}
}
